use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{VOLUNTEER_COOKIE, parse_volunteer_cookie_value};
use crate::config::RateLimitConfig;
use rocket::http::{Method, Status};
use rocket::request::{FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    /// Status, queue and message polls.
    Read,
    Write,
    Login,
}

impl Bucket {
    fn for_method(method: Method) -> Self {
        if matches!(method, Method::Get | Method::Head | Method::Options) {
            Bucket::Read
        } else {
            Bucket::Write
        }
    }
}

/// Who is being counted. A logged-in volunteer is counted both by address
/// and by id, so switching networks does not reset the window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Caller {
    Address(String),
    Volunteer(Uuid),
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    hits: u32,
}

impl Window {
    fn open(now: Instant) -> Self {
        Self { opened: now, hits: 0 }
    }

    fn remaining(&self, now: Instant, length: Duration) -> Duration {
        length.saturating_sub(now.duration_since(self.opened))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

/// Fixed-window request counter shared through Rocket state.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    config: RateLimitConfig,
    length: Duration,
    windows: Mutex<HashMap<(Caller, Bucket), Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            length: Duration::from_secs(config.window_seconds.max(1)),
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Drops expired windows periodically so idle callers do not accumulate.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let every = Duration::from_secs(self.config.cleanup_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut windows = self.windows.lock().await;
                let before = windows.len();
                windows.retain(|_, window| now.duration_since(window.opened) < self.length);
                debug!(dropped = before - windows.len(), "rate limit windows swept");
            }
        })
    }

    fn limit(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Read => self.config.read_limit,
            Bucket::Write => self.config.mutation_limit,
            Bucket::Login => self.config.auth_limit,
        }
    }

    /// Counts one request against every caller identity, or none of them
    /// if any identity is already over the limit.
    async fn admit(&self, callers: &[Caller], bucket: Bucket) -> Admission {
        let limit = self.limit(bucket);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        let mut wait = Duration::ZERO;
        for caller in callers {
            let window = windows.entry((caller.clone(), bucket)).or_insert_with(|| Window::open(now));
            if window.remaining(now, self.length).is_zero() {
                *window = Window::open(now);
            }
            if window.hits >= limit {
                wait = wait.max(window.remaining(now, self.length));
            }
        }
        if !wait.is_zero() {
            return Admission::Rejected { retry_after: wait };
        }

        for caller in callers {
            if let Some(window) = windows.get_mut(&(caller.clone(), bucket)) {
                window.hits += 1;
            }
        }
        Admission::Admitted
    }
}

/// Seconds until the caller may retry, left for the 429 catcher.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetryAfter(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RateLimitError {
    TooManyRequests,
    MissingClientIp,
}

/// Guard for ordinary endpoints; the bucket follows the HTTP method.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimit;

/// Stricter guard for login and registration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AuthRateLimit;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        guard(request, Bucket::for_method(request.method())).await.map(|_| RateLimit)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthRateLimit {
    type Error = RateLimitError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        guard(request, Bucket::Login).await.map(|_| AuthRateLimit)
    }
}

impl<'a> OpenApiFromRequest<'a> for RateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(too_many_requests_response())
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthRateLimit {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(too_many_requests_response())
    }
}

fn callers(request: &Request<'_>) -> Vec<Caller> {
    let mut callers = Vec::with_capacity(2);
    if let Some(ip) = request.client_ip() {
        callers.push(Caller::Address(ip.to_string()));
    }
    if let Some((_, volunteer_id)) = request
        .cookies()
        .get_private(VOLUNTEER_COOKIE)
        .and_then(|cookie| parse_volunteer_cookie_value(cookie.value()))
    {
        callers.push(Caller::Volunteer(volunteer_id));
    }
    callers
}

async fn guard(request: &Request<'_>, bucket: Bucket) -> Outcome<(), RateLimitError> {
    let Some(limiter) = request.rocket().state::<Arc<RateLimiter>>() else {
        return Outcome::Success(());
    };

    let request_id = request
        .local_cache(|| None::<crate::middleware::RequestId>)
        .as_ref()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let mut callers = callers(request);
    if callers.is_empty() {
        warn!(request_id = %request_id, uri = %request.uri(), "client ip unavailable for rate limiting");
        if limiter.config.require_client_ip {
            return Outcome::Error((Status::BadRequest, RateLimitError::MissingClientIp));
        }
        callers.push(Caller::Address("unknown".to_string()));
    }

    match limiter.admit(&callers, bucket).await {
        Admission::Admitted => Outcome::Success(()),
        Admission::Rejected { retry_after } => {
            let secs = retry_after.as_secs().max(1);
            request.local_cache(|| Some(RateLimitRetryAfter(secs)));
            warn!(request_id = %request_id, uri = %request.uri(), bucket = ?bucket, retry_after_secs = secs, "rate limit exceeded");
            Outcome::Error((Status::TooManyRequests, RateLimitError::TooManyRequests))
        }
    }
}

fn too_many_requests_response() -> Responses {
    let mut responses = Responses::default();
    responses.responses.insert(
        "429".to_string(),
        RefOr::Object(OpenApiResponse {
            description: "Too Many Requests".to_string(),
            ..Default::default()
        }),
    );
    responses
}
