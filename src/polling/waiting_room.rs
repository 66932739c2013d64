use crate::config::PollingConfig;
use crate::database::HelpDeskRepository;
use crate::error::app_error::AppError;
use crate::models::session::{AbandonReason, Session, SessionStatus};
use crate::polling::PollHandle;
use crate::service::session::SessionService;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A volunteer claimed the session; continue to chat or call.
    Attended(Session),
    /// The session reached a terminal state elsewhere.
    Closed(Session),
    /// Nobody claimed it in time; the session is now abandoned.
    TimedOut(Session),
}

/// Requester side of the queue: polls its own session until claimed,
/// closed or timed out.
pub struct WaitingRoom<R> {
    service: SessionService<R>,
    session_id: Uuid,
    poll: Duration,
    timeout: Duration,
}

impl<R: HelpDeskRepository> WaitingRoom<R> {
    pub fn new(service: SessionService<R>, session_id: Uuid, polling: &PollingConfig) -> Self {
        Self {
            service,
            session_id,
            poll: polling.wait_poll(),
            timeout: polling.wait_timeout(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Runs until the wait resolves. Transient fetch failures are retried on
    /// the next tick; anything else ends the wait with an error.
    pub async fn wait(&self) -> Result<WaitOutcome, AppError> {
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut interval = tokio::time::interval(self.poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut deadline => return self.time_out().await,
                _ = interval.tick() => {
                    match self.service.get(&self.session_id).await {
                        Ok(session) => {
                            if let Some(outcome) = Self::resolve(session) {
                                return Ok(outcome);
                            }
                        }
                        Err(err) if err.is_transient() => {
                            warn!(session_id = %self.session_id, error = %err, "waiting room poll failed");
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Requester gave up while waiting.
    pub async fn cancel(&self) -> Result<Session, AppError> {
        self.service.abandon(&self.session_id, AbandonReason::Cancelled).await
    }

    /// Runs the wait in the background. Dropping the handle stops the poll
    /// and the timeout together.
    pub fn mount(self) -> (PollHandle, oneshot::Receiver<Result<WaitOutcome, AppError>>) {
        let (tx, rx) = oneshot::channel();
        let handle = PollHandle::spawn(async move {
            let _ = tx.send(self.wait().await);
        });
        (handle, rx)
    }

    fn resolve(session: Session) -> Option<WaitOutcome> {
        match session.status() {
            SessionStatus::Waiting => None,
            SessionStatus::InAttendance => Some(WaitOutcome::Attended(session)),
            _ => Some(WaitOutcome::Closed(session)),
        }
    }

    /// Abandons the session. A claim that lands first wins and the
    /// requester proceeds to the conversation instead.
    async fn time_out(&self) -> Result<WaitOutcome, AppError> {
        loop {
            match self.service.abandon(&self.session_id, AbandonReason::WaitTimeout).await {
                Ok(session) => {
                    info!(session_id = %self.session_id, "wait timed out");
                    return Ok(WaitOutcome::TimedOut(session));
                }
                Err(AppError::SessionConflict { current, .. }) => {
                    debug!(session_id = %self.session_id, current = %current, "timeout lost to another transition");
                    match self.service.get(&self.session_id).await {
                        Ok(session) => {
                            if let Some(outcome) = Self::resolve(session) {
                                return Ok(outcome);
                            }
                        }
                        Err(err) if err.is_transient() => {
                            warn!(session_id = %self.session_id, error = %err, "fetch after timeout conflict failed, retrying");
                            tokio::time::sleep(self.poll).await;
                        }
                        Err(err) => return Err(err),
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!(session_id = %self.session_id, error = %err, "timeout abandon failed, retrying");
                    tokio::time::sleep(self.poll).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
