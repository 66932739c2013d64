pub mod rate_limit;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::{Data, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Correlates log lines of one request. A well-formed incoming
/// `X-Request-Id` is kept so the notifier and the API share ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }

    fn from_header(value: Option<&str>) -> Self {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 64 && v.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
            .map(|v| RequestId(v.to_string()))
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

fn cached_request_id(request: &Request<'_>) -> Option<RequestId> {
    request.local_cache(|| None::<RequestId>).clone()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestId {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(cached_request_id(request).unwrap_or_default())
    }
}

/// Assigns request ids and logs each request and its outcome.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let request_id = RequestId::from_header(request.headers().get_one(REQUEST_ID_HEADER));
        request.local_cache(|| Some(request_id.clone()));

        // Status polls arrive every few seconds per client.
        debug!(request_id = %request_id.0, method = %request.method(), uri = %request.uri(), "incoming request");
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let request_id = cached_request_id(request).map(|r| r.0).unwrap_or_else(|| "unknown".to_string());
        let status = response.status();

        response.set_header(Header::new(REQUEST_ID_HEADER, request_id.clone()));
        response.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        response.set_header(Header::new("Cache-Control", "no-store"));

        if status.class().is_server_error() || status.class().is_client_error() {
            warn!(request_id = %request_id, method = %request.method(), uri = %request.uri(), status = status.code, "request failed");
        } else {
            info!(request_id = %request_id, method = %request.method(), uri = %request.uri(), status = status.code, "request completed");
        }
    }
}

/// Client address, recorded on logins and presence audits.
pub struct ClientIp(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, ()> {
        Outcome::Success(ClientIp(req.client_ip().map(|ip| ip.to_string())))
    }
}

impl<'a> OpenApiFromRequest<'a> for ClientIp {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl ClientIp {
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::local::asynchronous::Client;
    use rocket::{get, routes};

    #[get("/echo")]
    fn echo(request_id: RequestId) -> String {
        request_id.0
    }

    #[test]
    fn request_ids_are_unique_uuids() {
        let first = RequestId::new();
        assert!(Uuid::parse_str(&first.0).is_ok());
        assert_ne!(first, RequestId::new());
    }

    #[test]
    fn incoming_header_is_kept_when_well_formed() {
        assert_eq!(RequestId::from_header(Some("notifier-42")).0, "notifier-42");
        assert_ne!(RequestId::from_header(Some("bad id\n")).0, "bad id\n");
        assert!(Uuid::parse_str(&RequestId::from_header(None).0).is_ok());
    }

    #[rocket::async_test]
    async fn response_carries_the_request_id() {
        let rocket = rocket::build().attach(RequestLogger).mount("/", routes![echo]);
        let client = Client::tracked(rocket).await.expect("valid rocket instance");

        let response = client.get("/echo").header(Header::new(REQUEST_ID_HEADER, "abc-123")).dispatch().await;

        assert_eq!(response.headers().get_one(REQUEST_ID_HEADER), Some("abc-123"));
        assert_eq!(response.into_string().await.as_deref(), Some("abc-123"));
    }
}
