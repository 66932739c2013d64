use crate::auth::CurrentVolunteer;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::survey::{Survey, SurveyRequest};
use crate::routes::session::service;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Rate a finished session (once per session)
#[openapi(tag = "Surveys")]
#[post("/", data = "<payload>")]
pub async fn create_survey(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    payload: Json<SurveyRequest>,
) -> Result<(Status, Json<Survey>), AppError> {
    let survey = service(pool).record_survey(&payload).await?;
    Ok((Status::Created, Json(survey)))
}

/// Most recent surveys first
#[openapi(tag = "Surveys")]
#[get("/?<limit>")]
pub async fn list_surveys(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    _current_volunteer: CurrentVolunteer,
    limit: Option<i64>,
) -> Result<Json<Vec<Survey>>, AppError> {
    Ok(Json(service(pool).recent_surveys(clamp_limit(limit)).await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![create_survey, list_surveys]
}
