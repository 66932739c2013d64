use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, JsonSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VolunteerStatus {
    Online,
    Busy,
    Offline,
}

impl std::fmt::Display for VolunteerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolunteerStatus::Online => write!(f, "online"),
            VolunteerStatus::Busy => write!(f, "busy"),
            VolunteerStatus::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Volunteer {
    pub id: Uuid,
    pub email: String,
    pub nombre: String,
    pub password_hash: String,
    pub role_id: Option<Uuid>,
    pub status: VolunteerStatus,
    pub last_status_change: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct VolunteerResponse {
    pub id: Uuid,
    pub email: String,
    pub nombre: String,
    pub role_id: Option<Uuid>,
    pub status: VolunteerStatus,
    pub last_status_change: DateTime<Utc>,
}

impl From<&Volunteer> for VolunteerResponse {
    fn from(volunteer: &Volunteer) -> Self {
        Self {
            id: volunteer.id,
            email: volunteer.email.clone(),
            nombre: volunteer.nombre.clone(),
            role_id: volunteer.role_id,
            status: volunteer.status,
            last_status_change: volunteer.last_status_change,
        }
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct VolunteerRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 2, max = 120))]
    pub nombre: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub role_id: Option<Uuid>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Deserialize, Serialize, Debug, JsonSchema)]
pub struct StatusUpdateRequest {
    pub status: VolunteerStatus,
}

/// Volunteer whose role is flagged for escalation alerts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema, sqlx::FromRow)]
pub struct Leader {
    pub id: Uuid,
    pub email: String,
    pub nombre: String,
    pub role_name: String,
    pub status: VolunteerStatus,
}

/// Administrative role metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_leader: bool,
}

/// Cookie-backed login session of a volunteer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VolunteerSession {
    pub id: Uuid,
    pub volunteer_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionVolunteer {
    pub id: Uuid,
    pub email: String,
    pub nombre: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volunteer_request_validates_email_and_password() {
        let request = VolunteerRequest {
            email: "not-an-email".to_string(),
            nombre: "Juan".to_string(),
            password: "short".to_string(),
            role_id: None,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn status_round_trips_lowercase() {
        let parsed: StatusUpdateRequest = serde_json::from_str(r#"{"status":"busy"}"#).unwrap();
        assert_eq!(parsed.status, VolunteerStatus::Busy);
        assert_eq!(VolunteerStatus::Offline.to_string(), "offline");
    }
}
