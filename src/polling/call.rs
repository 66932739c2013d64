use crate::database::HelpDeskRepository;
use crate::error::app_error::AppError;
use crate::models::session::Session;
use crate::service::session::{Participant, SessionService};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

/// Bridges the conferencing client's hang-up callback to the session.
///
/// The callback may fire several times (both sides hanging up, reconnect
/// loops); only the first one acts.
pub struct CallSession<R> {
    service: SessionService<R>,
    session_id: Uuid,
    participant: Participant,
    handled: AtomicBool,
}

impl<R: HelpDeskRepository> CallSession<R> {
    pub fn new(service: SessionService<R>, session_id: Uuid, participant: Participant) -> Self {
        Self {
            service,
            session_id,
            participant,
            handled: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Ends the session on the first disconnect. Returns `None` when the
    /// callback was already handled or the other side ended it first. A
    /// transient failure re-arms the callback so the next one retries.
    pub async fn on_disconnect(&self) -> Result<Option<Session>, AppError> {
        if self.handled.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        let result = match self.service.close(&self.session_id, &self.participant).await {
            Err(AppError::NotSessionOwner(_)) => match &self.participant {
                Participant::Volunteer { id, nombre } => self.service.leave(&self.session_id, id, nombre).await,
                Participant::Requester => Err(AppError::NotSessionOwner(self.session_id)),
            },
            other => other,
        };

        match result {
            Ok(session) => Ok(Some(session)),
            Err(AppError::SessionConflict { current, .. }) => {
                debug!(session_id = %self.session_id, current = %current, "call already ended");
                Ok(None)
            }
            Err(err) if err.is_transient() => {
                warn!(session_id = %self.session_id, error = %err, "ending call failed, will retry on next disconnect");
                self.handled.store(false, Ordering::SeqCst);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}
