use crate::models::session::SessionStatus;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal server error")]
    PasswordHash { message: String },
    #[error("Volunteer {0} already exists")]
    VolunteerAlreadyExists(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Session {id} is already {current}")]
    SessionConflict { id: Uuid, current: SessionStatus },
    #[error("Only the owning volunteer can finish session {0}")]
    NotSessionOwner(Uuid),
    #[error("A survey was already submitted for session {0}")]
    SurveyAlreadySubmitted(Uuid),
    #[error("Internal server error")]
    InvalidSessionRow { id: Uuid, reason: String },
    #[error("Internal server error")]
    UuidError {
        message: String,
        #[source]
        source: uuid::Error,
    },
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Upstream request failed: {message}")]
    Http {
        message: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Client storage failed: {message}")]
    Storage {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Internal server error")]
    ConfigurationError {
        message: String,
        #[source]
        source: figment::Error,
    },
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn uuid(message: impl Into<String>, source: uuid::Error) -> Self {
        Self::UuidError {
            message: message.into(),
            source,
        }
    }

    pub fn password_hash(message: impl Into<String>, source: password_hash::Error) -> Self {
        Self::PasswordHash {
            message: format!("{}: {}", message.into(), source),
        }
    }

    pub fn invalid_session_row(id: Uuid, reason: impl Into<String>) -> Self {
        Self::InvalidSessionRow { id, reason: reason.into() }
    }

    pub fn http(message: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            message: message.into(),
            source,
        }
    }

    pub fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            message: message.into(),
            source,
        }
    }

    /// Errors a poller should log and retry on its next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Db { .. } | AppError::Http { .. })
    }
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        AppError::password_hash("Password hashing failed", e)
    }
}

impl From<uuid::Error> for AppError {
    fn from(e: uuid::Error) -> Self {
        AppError::uuid("Invalid UUID", e)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::http("HTTP request failed", e)
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Db { .. } => Status::InternalServerError,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::InvalidCredentials => Status::Forbidden,
            AppError::Forbidden(_) => Status::Forbidden,
            AppError::PasswordHash { .. } => Status::InternalServerError,
            AppError::VolunteerAlreadyExists(_) => Status::Conflict,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::SessionConflict { .. } => Status::Conflict,
            AppError::NotSessionOwner(_) => Status::Forbidden,
            AppError::SurveyAlreadySubmitted(_) => Status::Conflict,
            AppError::InvalidSessionRow { .. } => Status::InternalServerError,
            AppError::UuidError { .. } => Status::BadRequest,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::Http { .. } => Status::BadGateway,
            AppError::Storage { .. } => Status::InternalServerError,
            AppError::ConfigurationError { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let volunteer_id = req
            .local_cache(|| None::<crate::auth::CurrentVolunteer>)
            .as_ref()
            .map(|v| v.id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        let status = Status::from(&self);

        // Lost claim races are an expected outcome, not a failure.
        if matches!(self, AppError::SessionConflict { .. }) {
            tracing::debug!(
                error = %self,
                request_id = %request_id,
                volunteer_id = %volunteer_id,
                method = %method,
                uri = %uri,
                "request conflicted"
            );
        } else {
            error!(
                error = ?self,
                request_id = %request_id,
                volunteer_id = %volunteer_id,
                method = %method,
                uri = %uri,
                "request failed"
            );
        }

        let body = self.to_string();

        Response::build().status(status).sized_body(body.len(), Cursor::new(body)).ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not Found"),
            ("409", "Conflict"),
            ("500", "Internal Server Error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::ConfigurationError {
            message: "Failed to read configuration".to_string(),
            source: e,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}
