use crate::auth::{MaybeVolunteer, RequesterToken};
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::message::{Cursor, Message, MessageRequest, NewMessage};
use crate::routes::session::{parse_session_id, service};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use validator::Validate;

/// Conversation of a session, for a logged-in volunteer or the requester holding the token.
/// With `after` (RFC 3339) only strictly newer messages are returned
#[openapi(tag = "Messages")]
#[get("/<id>/messages?<after>")]
pub async fn get_messages(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    volunteer: MaybeVolunteer,
    token: RequesterToken,
    id: &str,
    after: Option<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    let cursor = Cursor::parse(after.as_deref()).map_err(|e| AppError::BadRequest(format!("Invalid cursor: {}", e)))?;
    let session_id = parse_session_id(id)?;
    let service = service(pool);
    if volunteer.0.is_none() {
        service.authorize_requester(&session_id, token.0.as_deref()).await?;
    }
    let messages = service.messages(&session_id, cursor).await?;
    Ok(Json(messages))
}

/// Send a message. The sender is the logged-in volunteer if any, otherwise the requester
#[openapi(tag = "Messages")]
#[post("/<id>/messages", data = "<payload>")]
pub async fn post_message(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    volunteer: MaybeVolunteer,
    token: RequesterToken,
    id: &str,
    payload: Json<MessageRequest>,
) -> Result<(Status, Json<Message>), AppError> {
    payload.validate()?;

    let session_id = parse_session_id(id)?;
    let service = service(pool);
    let text = payload.text.trim();
    let message = match volunteer.0 {
        Some(volunteer) => NewMessage::volunteer(session_id, volunteer.id, text),
        None => {
            service.authorize_requester(&session_id, token.0.as_deref()).await?;
            NewMessage::user(session_id, text)
        }
    };

    let stored = service.send(message).await?;
    Ok((Status::Created, Json(stored)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_messages, post_message]
}
