//! Client-side pollers. Each mounted view owns its timers through a
//! [`PollHandle`]; dropping the handle stops the timers.

pub mod call;
pub mod chat;
pub mod dashboard;
pub mod extension;
pub mod recovery;
pub mod storage;
pub mod waiting_room;

use crate::error::app_error::AppError;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// A spawned polling task, aborted when the handle is dropped.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { task: tokio::spawn(future) }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One unit of periodic work.
#[async_trait::async_trait]
pub trait Poller: Send + 'static {
    fn name(&self) -> &'static str;
    async fn poll(&mut self) -> Result<(), AppError>;
}

/// Polls every `period`, starting immediately. A failed tick is logged and
/// the next tick runs as scheduled.
pub fn spawn_poller<P: Poller>(mut poller: P, period: Duration) -> PollHandle {
    PollHandle::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(err) = poller.poll().await {
                warn!(poller = poller.name(), error = %err, transient = err.is_transient(), "poll tick failed");
            }
        }
    })
}
