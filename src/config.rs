use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE_PATH: &str = "/api";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    pub api: ApiConfig,
    pub rate_limit: RateLimitConfig,
    pub polling: PollingConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,
    pub acquire_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json_format: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_path: String,
    pub additional_base_paths: Vec<String>,
    pub enable_swagger: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    pub read_limit: u32,
    pub mutation_limit: u32,
    pub auth_limit: u32,
    pub window_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub require_client_ip: bool,
}

/// Timer settings for the client-side pollers.
///
/// The message poll must stay faster than the queue poll, which must stay
/// faster than the extension poll.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PollingConfig {
    pub wait_poll_ms: u64,
    pub wait_timeout_secs: u64,
    pub message_poll_ms: u64,
    pub queue_poll_ms: u64,
    /// Number of queue ticks between two survey history refreshes.
    pub history_every: u32,
    pub extension_poll_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifierConfig {
    pub api_url: String,
    pub storage_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/centro_virtual".to_string(),
            max_connections: 16,
            min_connections: 4,
            connection_timeout: 5,
            acquire_timeout: 5,
            run_migrations: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            address: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_credentials: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_API_BASE_PATH.to_string(),
            additional_base_paths: Vec::new(),
            enable_swagger: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // A volunteer dashboard polls several endpoints every few seconds.
        Self {
            read_limit: 600,
            mutation_limit: 120,
            auth_limit: 10,
            window_seconds: 60,
            cleanup_interval_seconds: 300,
            require_client_ip: false,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            wait_poll_ms: 3_000,
            wait_timeout_secs: 5 * 60,
            message_poll_ms: 2_000,
            queue_poll_ms: 3_000,
            history_every: 10,
            extension_poll_secs: 30,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000/api".to_string(),
            storage_path: "notifier-state.json".to_string(),
        }
    }
}

impl PollingConfig {
    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms.max(1))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn message_poll(&self) -> Duration {
        Duration::from_millis(self.message_poll_ms.max(1))
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms.max(1))
    }

    pub fn extension_poll(&self) -> Duration {
        Duration::from_secs(self.extension_poll_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.wait_timeout_secs == 0 {
            return Err("polling.wait_timeout_secs must be greater than zero".to_string());
        }
        if self.history_every == 0 {
            return Err("polling.history_every must be greater than zero".to_string());
        }
        if self.message_poll() >= self.queue_poll() {
            return Err("polling.message_poll_ms must be lower than polling.queue_poll_ms".to_string());
        }
        if self.queue_poll() >= self.extension_poll() {
            return Err("polling.queue_poll_ms must be lower than polling.extension_poll_secs".to_string());
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from multiple sources in priority order:
    /// 1. Built-in defaults
    /// 2. CentroVirtual.toml (if present)
    /// 3. Environment variables (prefixed with CENTRO_, e.g. CENTRO_POLLING__QUEUE_POLL_MS)
    /// 4. DATABASE_URL environment variable
    pub fn load() -> Result<Self, figment::Error> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("CentroVirtual.toml"))
            .merge(Env::prefixed("CENTRO_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
            .extract()?;

        config.polling.validate().map_err(figment::Error::from)?;

        Ok(config)
    }
}
