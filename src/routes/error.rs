use crate::middleware::rate_limit::RateLimitRetryAfter;
use rocket::http::Header;
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, Responder, catch};

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

impl Error {
    fn new(message: &str) -> Json<Self> {
        Json(Error { message: message.to_string() })
    }
}

#[derive(Responder)]
#[response(status = 429)]
pub struct TooManyRequests {
    body: Json<Error>,
    retry_after: Header<'static>,
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    Error::new("Not found")
}

#[catch(409)]
pub fn conflict(_: &Request) -> Json<Error> {
    Error::new("Conflict")
}

#[catch(429)]
pub fn too_many_requests(req: &Request) -> TooManyRequests {
    let secs = req
        .local_cache(|| None::<RateLimitRetryAfter>)
        .as_ref()
        .map(|retry| retry.0)
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

    TooManyRequests {
        body: Error::new("Too many requests, slow down polling"),
        retry_after: Header::new("Retry-After", secs.to_string()),
    }
}
