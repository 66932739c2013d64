use crate::database::HelpDeskRepository;
use crate::error::app_error::AppError;
use crate::models::message::{Cursor, Message, NewMessage};
use crate::models::session::{AbandonReason, Session, SessionEvent, SessionRequest, SessionStatus, room_id_for};
use crate::models::survey::{Survey, SurveyRequest};
use crate::models::volunteer::VolunteerStatus;
use rand::distr::{Alphanumeric, SampleString};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

const ROOM_SUFFIX_LENGTH: usize = 8;

/// Who is acting on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participant {
    Requester,
    Volunteer { id: Uuid, nombre: String },
}

/// A stored session plus the plain requester token, which is never stored.
#[derive(Debug, Clone)]
pub struct Submission {
    pub session: Session,
    pub requester_token: String,
}

/// Returns `(plain_token, token_hash)`.
pub fn generate_requester_token() -> (String, String) {
    let token_bytes: [u8; 32] = rand::random();
    let token = hex::encode(token_bytes);
    let token_hash = hash_requester_token(&token);
    (token, token_hash)
}

pub fn hash_requester_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct SessionService<R> {
    repository: R,
}

impl<R: HelpDeskRepository> SessionService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn submit(&self, request: &SessionRequest) -> Result<Submission, AppError> {
        request.validate()?;

        let suffix = Alphanumeric.sample_string(&mut rand::rng(), ROOM_SUFFIX_LENGTH).to_lowercase();
        let room_id = room_id_for(&request.nombre, &suffix);
        let (requester_token, token_hash) = generate_requester_token();
        let session = self.repository.create_session(request, &room_id, &token_hash).await?;

        info!(session_id = %session.id, channel = ?session.channel, tema = %session.topic, "session submitted");
        Ok(Submission { session, requester_token })
    }

    /// Checks the token handed out by [`SessionService::submit`].
    pub async fn authorize_requester(&self, id: &Uuid, token: Option<&str>) -> Result<(), AppError> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Err(AppError::Unauthorized);
        };

        if self.repository.requester_token_matches(id, &hash_requester_token(token)).await? {
            return Ok(());
        }

        self.get(id).await?;
        warn!(session_id = %id, "requester token rejected");
        Err(AppError::Forbidden(format!("Not the requester of session {}", id)))
    }

    pub async fn get(&self, id: &Uuid) -> Result<Session, AppError> {
        self.repository
            .get_session(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
    }

    pub async fn list(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, AppError> {
        self.repository.list_sessions(statuses).await
    }

    /// Waiting sessions, oldest first.
    pub async fn queue(&self) -> Result<Vec<Session>, AppError> {
        self.repository.list_sessions(&[SessionStatus::Waiting]).await
    }

    /// Conditional transition. A failed precondition is reported as a
    /// conflict carrying the state that won.
    async fn transition(&self, id: &Uuid, event: SessionEvent, owner: Option<&Uuid>) -> Result<Session, AppError> {
        if let Some(session) = self.repository.transition_session(id, event, owner).await? {
            return Ok(session);
        }

        let current = self.get(id).await?;
        if let (Some(owner), Some(stored)) = (owner, current.volunteer_id())
            && stored != *owner
        {
            return Err(AppError::NotSessionOwner(*id));
        }
        Err(AppError::SessionConflict {
            id: *id,
            current: current.status(),
        })
    }

    pub async fn claim(&self, id: &Uuid, volunteer_id: &Uuid) -> Result<Session, AppError> {
        match self.transition(id, SessionEvent::Claim(*volunteer_id), None).await {
            Ok(session) => {
                info!(session_id = %id, volunteer_id = %volunteer_id, "session claimed");
                self.update_presence(volunteer_id, VolunteerStatus::Busy).await;
                Ok(session)
            }
            Err(err @ AppError::SessionConflict { .. }) => {
                debug!(session_id = %id, volunteer_id = %volunteer_id, error = %err, "claim lost");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Ends an attended session. Only the requester or the owning volunteer may
    /// do so; ownership is part of the conditional update.
    pub async fn close(&self, id: &Uuid, by: &Participant) -> Result<Session, AppError> {
        let owner = match by {
            Participant::Requester => None,
            Participant::Volunteer { id: volunteer_id, .. } => Some(volunteer_id),
        };

        let session = self.transition(id, SessionEvent::End, owner).await?;
        info!(session_id = %id, by = ?by, "session finished");

        let narration = match by {
            Participant::Requester => "El usuario finalizó la sesión.".to_string(),
            Participant::Volunteer { nombre, .. } => format!("{} finalizó la sesión.", nombre),
        };
        self.narrate(id, narration).await;

        if let Some(owner) = session.volunteer_id() {
            self.update_presence(&owner, VolunteerStatus::Online).await;
        }

        Ok(session)
    }

    pub async fn abandon(&self, id: &Uuid, reason: AbandonReason) -> Result<Session, AppError> {
        let session = self.transition(id, reason.into(), None).await?;
        info!(session_id = %id, reason = ?reason, "session abandoned");
        Ok(session)
    }

    /// A co-assisting volunteer leaves the conversation. The session is untouched.
    pub async fn leave(&self, id: &Uuid, volunteer_id: &Uuid, nombre: &str) -> Result<Session, AppError> {
        let session = self.get(id).await?;
        if session.is_owned_by(volunteer_id) {
            return Err(AppError::BadRequest("The owning volunteer must finish the session".to_string()));
        }
        if session.status() != SessionStatus::InAttendance {
            return Err(AppError::SessionConflict {
                id: *id,
                current: session.status(),
            });
        }

        self.narrate(id, format!("{} salió de la conversación.", nombre)).await;
        Ok(session)
    }

    pub async fn messages(&self, id: &Uuid, cursor: Cursor) -> Result<Vec<Message>, AppError> {
        self.get(id).await?;
        self.repository.list_messages(id, cursor).await
    }

    pub async fn send(&self, message: NewMessage) -> Result<Message, AppError> {
        let session = self.get(&message.session_id).await?;
        if session.is_terminal() {
            return Err(AppError::SessionConflict {
                id: session.id,
                current: session.status(),
            });
        }

        self.repository.append_message(&message).await
    }

    pub async fn record_survey(&self, request: &SurveyRequest) -> Result<Survey, AppError> {
        request.validate()?;

        let session = self.get(&request.session_id).await?;
        if session.status() != SessionStatus::Finished {
            return Err(AppError::BadRequest(format!(
                "Session {} is {}, surveys are only accepted for finished sessions",
                session.id,
                session.status()
            )));
        }

        let survey = self
            .repository
            .create_survey(request)
            .await?
            .ok_or(AppError::SurveyAlreadySubmitted(request.session_id))?;

        info!(session_id = %survey.session_id, calificacion = survey.calificacion, "survey recorded");
        Ok(survey)
    }

    pub async fn recent_surveys(&self, limit: i64) -> Result<Vec<Survey>, AppError> {
        self.repository.list_surveys(limit).await
    }

    async fn narrate(&self, id: &Uuid, text: String) {
        if let Err(err) = self.repository.append_message(&NewMessage::system(*id, text)).await {
            warn!(session_id = %id, error = %err, "failed to record system message");
        }
    }

    /// Presence follows claims and closes on a best-effort basis.
    async fn update_presence(&self, volunteer_id: &Uuid, status: VolunteerStatus) {
        match self.repository.set_volunteer_status(volunteer_id, status).await {
            Ok(Some(_)) => debug!(volunteer_id = %volunteer_id, status = %status, "presence updated"),
            Ok(None) => warn!(volunteer_id = %volunteer_id, "presence update for unknown volunteer"),
            Err(err) => warn!(volunteer_id = %volunteer_id, error = %err, "presence update failed"),
        }
    }
}
