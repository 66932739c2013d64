//! Background queue watcher: raises a desktop notification for every new
//! waiting request and keeps the badge at the number of waiting requests.

use centro_virtual::client::ApiClient;
use centro_virtual::polling::extension::{LogNotifier, QueueWatcher};
use centro_virtual::polling::spawn_poller;
use centro_virtual::polling::storage::JsonFileStorage;
use centro_virtual::{Config, init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_tracing(&config.logging.level, config.logging.json_format);

    let client = ApiClient::new(&config.notifier.api_url)?;
    info!(queue_url = %client.queue_url(), every = ?config.polling.extension_poll(), "queue watcher started");

    let storage = JsonFileStorage::new(&config.notifier.storage_path);
    let watcher = QueueWatcher::new(client, LogNotifier, storage);
    let _handle = spawn_poller(watcher, config.polling.extension_poll());

    tokio::signal::ctrl_c().await?;
    info!("queue watcher stopped");
    Ok(())
}
