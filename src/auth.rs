use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

pub const VOLUNTEER_COOKIE: &str = "volunteer";

/// Logged-in volunteer, resolved from the private login cookie.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentVolunteer {
    pub id: Uuid,
    pub email: String,
    pub nombre: String,
}

/// Splits `<login session id>:<volunteer id>`.
pub(crate) fn parse_volunteer_cookie_value(value: &str) -> Option<(Uuid, Uuid)> {
    let (session_id_str, volunteer_id_str) = value.split_once(':')?;
    let session_id = Uuid::parse_str(session_id_str).ok()?;
    let volunteer_id = Uuid::parse_str(volunteer_id_str).ok()?;
    Some((session_id, volunteer_id))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentVolunteer {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let cookies = req.cookies();
        if let Some(cookie) = cookies.get_private(VOLUNTEER_COOKIE)
            && let Some((session_id, volunteer_id)) = parse_volunteer_cookie_value(cookie.value())
        {
            let pool = match req.rocket().state::<PgPool>() {
                Some(pool) => pool,
                None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
            };

            let repo = PostgresRepository { pool: pool.clone() };

            match repo.get_active_session_volunteer(&session_id, &volunteer_id).await {
                Ok(Some(volunteer)) => {
                    let current = CurrentVolunteer {
                        id: volunteer.id,
                        email: volunteer.email,
                        nombre: volunteer.nombre,
                    };
                    req.local_cache(|| Some(current.clone()));
                    return Outcome::Success(current);
                }
                Ok(None) => {
                    let _ = repo.delete_volunteer_session_if_expired(&session_id).await;
                    return Outcome::Error((Status::Unauthorized, AppError::Unauthorized));
                }
                Err(err) => return Outcome::Error((Status::InternalServerError, err)),
            }
        }

        Outcome::Error((Status::Unauthorized, AppError::Unauthorized))
    }
}

fn cookie_security_scheme() -> SecurityScheme {
    SecurityScheme {
        description: Some("Cookie-based authentication. Log in via POST /api/volunteers/login to obtain the volunteer cookie.".to_string()),
        data: SecuritySchemeData::ApiKey {
            name: VOLUNTEER_COOKIE.to_string(),
            location: "cookie".to_string(),
        },
        extensions: Object::default(),
    }
}

impl<'a> OpenApiFromRequest<'a> for CurrentVolunteer {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let mut security_req = SecurityRequirement::new();
        security_req.insert("cookieAuth".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("cookieAuth".to_string(), cookie_security_scheme(), security_req))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response};
        let mut responses = Responses::default();
        responses.responses.insert(
            "401".to_string(),
            RefOr::Object(Response {
                description: "Unauthorized - Volunteer login required".to_string(),
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}

/// A volunteer if the request carries a valid login cookie. Requesters are
/// anonymous, so routes shared by both sides use this instead of failing.
#[derive(Debug, Clone)]
pub struct MaybeVolunteer(pub Option<CurrentVolunteer>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for MaybeVolunteer {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        if req.cookies().get_private(VOLUNTEER_COOKIE).is_none() {
            return Outcome::Success(MaybeVolunteer(None));
        }

        match CurrentVolunteer::from_request(req).await {
            Outcome::Success(volunteer) => Outcome::Success(MaybeVolunteer(Some(volunteer))),
            Outcome::Error((status, _)) if status == Status::Unauthorized => Outcome::Success(MaybeVolunteer(None)),
            Outcome::Error(err) => Outcome::Error(err),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for MaybeVolunteer {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

pub const REQUESTER_TOKEN_HEADER: &str = "X-Requester-Token";

/// Token handed to the requester when the session is created. Routes decide
/// whether it is required; checking it against a session is the service's job.
#[derive(Debug, Clone)]
pub struct RequesterToken(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequesterToken {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let token = req
            .headers()
            .get_one(REQUESTER_TOKEN_HEADER)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Outcome::Success(RequesterToken(token))
    }
}

fn requester_token_security_scheme() -> SecurityScheme {
    SecurityScheme {
        description: Some("Token returned once by POST /api/sessions; identifies the requester of that session.".to_string()),
        data: SecuritySchemeData::ApiKey {
            name: REQUESTER_TOKEN_HEADER.to_string(),
            location: "header".to_string(),
        },
        extensions: Object::default(),
    }
}

impl<'a> OpenApiFromRequest<'a> for RequesterToken {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let mut security_req = SecurityRequirement::new();
        security_req.insert("requesterToken".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security(
            "requesterToken".to_string(),
            requester_token_security_scheme(),
            security_req,
        ))
    }
}
