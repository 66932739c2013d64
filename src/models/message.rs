use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Volunteer,
    System,
}

/// One line of a session's conversation. Messages are never edited.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub volunteer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Deserialize, Serialize, Debug, Clone, Validate, JsonSchema)]
pub struct MessageRequest {
    #[validate(length(max = 4000), custom(function = "validate_not_blank"))]
    pub text: String,
}

/// A message about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub volunteer_id: Option<Uuid>,
}

impl NewMessage {
    pub fn user(session_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            session_id,
            sender: Sender::User,
            text: text.into(),
            volunteer_id: None,
        }
    }

    pub fn volunteer(session_id: Uuid, volunteer_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            session_id,
            sender: Sender::Volunteer,
            text: text.into(),
            volunteer_id: Some(volunteer_id),
        }
    }

    pub fn system(session_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            session_id,
            sender: Sender::System,
            text: text.into(),
            volunteer_id: None,
        }
    }
}

/// Watermark for incremental fetches: the newest `created_at` already held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor(Option<DateTime<Utc>>);

impl Cursor {
    pub fn start() -> Self {
        Self(None)
    }

    pub fn after(timestamp: DateTime<Utc>) -> Self {
        Self(Some(timestamp))
    }

    pub fn position(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Moves the watermark to the newest message in `batch`. Never moves back.
    pub fn advance(&mut self, batch: &[Message]) {
        if let Some(newest) = batch.iter().map(|m| m.created_at).max() {
            self.0 = Some(self.0.map_or(newest, |current| current.max(newest)));
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Self, chrono::ParseError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Ok(Self::after(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))),
            None => Ok(Self::start()),
        }
    }
}
