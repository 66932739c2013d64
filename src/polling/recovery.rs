use crate::database::HelpDeskRepository;
use crate::error::app_error::AppError;
use crate::models::session::{Channel, Session, SessionStatus};
use crate::polling::storage::{ClientStorage, RequesterPrefill};
use crate::service::session::SessionService;
use tracing::{debug, info};

/// View a returning requester is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeView {
    Waiting,
    Chat,
    Call,
}

impl ResumeView {
    pub fn for_session(session: &Session) -> Option<Self> {
        match session.status() {
            SessionStatus::Waiting => Some(ResumeView::Waiting),
            SessionStatus::InAttendance => Some(match session.channel {
                Channel::Chat => ResumeView::Chat,
                Channel::Video => ResumeView::Call,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resume {
    pub view: ResumeView,
    pub session: Session,
}

/// Keeps the requester's active session across page loads.
pub struct SessionRecovery<R, C> {
    service: SessionService<R>,
    storage: C,
}

impl<R: HelpDeskRepository, C: ClientStorage> SessionRecovery<R, C> {
    pub fn new(service: SessionService<R>, storage: C) -> Self {
        Self { service, storage }
    }

    pub fn storage(&self) -> &C {
        &self.storage
    }

    /// Stores the session reference and the form values for next time.
    pub fn remember(&self, session: &Session) -> Result<(), AppError> {
        self.storage.update(|state| {
            state.active_session = Some(session.id);
            state.prefill = Some(RequesterPrefill::from(session));
            if let Some(language) = &session.requester.language {
                state.language = Some(language.clone());
            }
        })?;
        Ok(())
    }

    pub fn forget(&self) -> Result<(), AppError> {
        self.storage.update(|state| state.active_session = None)?;
        Ok(())
    }

    /// Re-fetches the stored session. A terminal or vanished session drops
    /// the reference; a failed fetch keeps it for the next attempt.
    pub async fn recover(&self) -> Result<Option<Resume>, AppError> {
        let Some(id) = self.storage.load()?.active_session else {
            return Ok(None);
        };

        let session = match self.service.get(&id).await {
            Ok(session) => session,
            Err(AppError::NotFound(_)) => {
                debug!(session_id = %id, "stored session no longer exists");
                self.forget()?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        match ResumeView::for_session(&session) {
            Some(view) => {
                info!(session_id = %id, view = ?view, "resuming session");
                Ok(Some(Resume { view, session }))
            }
            None => {
                debug!(session_id = %id, status = %session.status(), "stored session already ended");
                self.forget()?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{AbandonReason, SessionRequest};
    use crate::polling::storage::MemoryStorage;
    use crate::test_utils::{MockRepository, sample_session_request};
    use uuid::Uuid;

    fn recovery() -> SessionRecovery<MockRepository, MemoryStorage> {
        SessionRecovery::new(SessionService::new(MockRepository::new()), MemoryStorage::default())
    }

    #[tokio::test]
    async fn nothing_stored_resumes_nothing() {
        assert_eq!(recovery().recover().await.unwrap(), None);
    }

    #[tokio::test]
    async fn waiting_session_resumes_the_waiting_room() {
        let recovery = recovery();
        let session = recovery.service.submit(&sample_session_request()).await.unwrap().session;
        recovery.remember(&session).unwrap();

        let resume = recovery.recover().await.unwrap().unwrap();
        assert_eq!(resume.view, ResumeView::Waiting);
        assert_eq!(resume.session.id, session.id);

        let stored = recovery.storage().load().unwrap();
        assert_eq!(stored.prefill.unwrap().nombre, "Ana");
    }

    #[tokio::test]
    async fn attended_session_resumes_by_channel() {
        let recovery = recovery();
        let request = SessionRequest {
            channel: Channel::Video,
            ..sample_session_request()
        };
        let session = recovery.service.submit(&request).await.unwrap().session;
        recovery.service.claim(&session.id, &Uuid::new_v4()).await.unwrap();
        recovery.remember(&session).unwrap();

        assert_eq!(recovery.recover().await.unwrap().unwrap().view, ResumeView::Call);
    }

    #[tokio::test]
    async fn ended_session_is_discarded() {
        let recovery = recovery();
        let session = recovery.service.submit(&sample_session_request()).await.unwrap().session;
        recovery.remember(&session).unwrap();
        recovery.service.abandon(&session.id, AbandonReason::Cancelled).await.unwrap();

        assert_eq!(recovery.recover().await.unwrap(), None);
        assert_eq!(recovery.storage().load().unwrap().active_session, None);
    }

    #[tokio::test]
    async fn missing_session_is_discarded() {
        let recovery = recovery();
        recovery.storage().update(|state| state.active_session = Some(Uuid::new_v4())).unwrap();

        assert_eq!(recovery.recover().await.unwrap(), None);
        assert_eq!(recovery.storage().load().unwrap().active_session, None);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_the_reference() {
        let recovery = recovery();
        let session = recovery.service.submit(&sample_session_request()).await.unwrap().session;
        recovery.remember(&session).unwrap();

        recovery.service.repository().fail_next(1);
        assert!(recovery.recover().await.is_err());
        assert_eq!(recovery.storage().load().unwrap().active_session, Some(session.id));
        assert!(recovery.recover().await.unwrap().is_some());
    }
}
