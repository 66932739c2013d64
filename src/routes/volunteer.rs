use crate::auth::{CurrentVolunteer, VOLUNTEER_COOKIE, parse_volunteer_cookie_value};
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::ClientIp;
use crate::middleware::rate_limit::{AuthRateLimit, RateLimit};
use crate::models::volunteer::{Leader, LoginRequest, StatusUpdateRequest, VolunteerRequest, VolunteerResponse, VolunteerStatus};
use crate::service::volunteer::VolunteerService;
use chrono::{Duration, Utc};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::serde::json::Json;
use rocket::{State, get, post, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// A volunteer shift rarely runs longer than this.
const LOGIN_TTL_HOURS: i64 = 12;

fn repository(pool: &State<PgPool>) -> PostgresRepository {
    PostgresRepository::new(pool.inner().clone())
}

/// Register a volunteer profile (one per email)
#[openapi(tag = "Volunteers")]
#[post("/", data = "<payload>")]
pub async fn register(
    pool: &State<PgPool>,
    _rate_limit: AuthRateLimit,
    payload: Json<VolunteerRequest>,
) -> Result<(Status, Json<VolunteerResponse>), AppError> {
    let repo = repository(pool);
    let volunteer = VolunteerService::new(&repo).register(&payload).await?;
    Ok((Status::Created, Json(VolunteerResponse::from(&volunteer))))
}

/// Log in; sets the volunteer cookie and goes online
#[openapi(tag = "Volunteers")]
#[post("/login", data = "<payload>")]
pub async fn login(
    pool: &State<PgPool>,
    _rate_limit: AuthRateLimit,
    cookies: &CookieJar<'_>,
    client_ip: ClientIp,
    payload: Json<LoginRequest>,
) -> Result<Json<VolunteerResponse>, AppError> {
    let repo = repository(pool);
    let volunteer = VolunteerService::new(&repo).authenticate(&payload).await?;

    let login = repo
        .create_volunteer_session(&volunteer.id, Utc::now() + Duration::hours(LOGIN_TTL_HOURS))
        .await?;
    let cookie = Cookie::build((VOLUNTEER_COOKIE, format!("{}:{}", login.id, volunteer.id)))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    cookies.add_private(cookie);

    info!(volunteer_id = %volunteer.id, ip = client_ip.as_str(), "volunteer logged in");
    Ok(Json(VolunteerResponse::from(&volunteer)))
}

/// Log out; goes offline and drops the login session
#[openapi(tag = "Volunteers")]
#[post("/logout")]
pub async fn logout(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    cookies: &CookieJar<'_>,
    current_volunteer: CurrentVolunteer,
) -> Result<Status, AppError> {
    let repo = repository(pool);
    VolunteerService::new(&repo).set_status(&current_volunteer.id, VolunteerStatus::Offline).await?;

    if let Some((login_id, _)) = cookies
        .get_private(VOLUNTEER_COOKIE)
        .and_then(|cookie| parse_volunteer_cookie_value(cookie.value()))
    {
        repo.delete_volunteer_session(&login_id).await?;
    }
    cookies.remove_private(Cookie::build(VOLUNTEER_COOKIE).path("/").build());

    Ok(Status::Ok)
}

/// The logged-in volunteer
#[openapi(tag = "Volunteers")]
#[get("/me")]
pub async fn get_me(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_volunteer: CurrentVolunteer,
) -> Result<Json<VolunteerResponse>, AppError> {
    let repo = repository(pool);
    let volunteer = VolunteerService::new(&repo).get(&current_volunteer.id).await?;
    Ok(Json(VolunteerResponse::from(&volunteer)))
}

/// Manual presence toggle, also used by the tab-close beacon
#[openapi(tag = "Volunteers")]
#[put("/me/status", data = "<payload>")]
pub async fn put_my_status(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_volunteer: CurrentVolunteer,
    payload: Json<StatusUpdateRequest>,
) -> Result<Json<VolunteerResponse>, AppError> {
    let repo = repository(pool);
    let volunteer = VolunteerService::new(&repo).set_status(&current_volunteer.id, payload.status).await?;
    Ok(Json(VolunteerResponse::from(&volunteer)))
}

/// Volunteers currently online or busy
#[openapi(tag = "Volunteers")]
#[get("/roster")]
pub async fn get_roster(pool: &State<PgPool>, _rate_limit: RateLimit) -> Result<Json<Vec<VolunteerResponse>>, AppError> {
    let repo = repository(pool);
    let roster = VolunteerService::new(&repo).roster().await?;
    Ok(Json(roster.iter().map(VolunteerResponse::from).collect()))
}

/// Volunteers alerted when requests wait and nobody is online
#[openapi(tag = "Volunteers")]
#[get("/leaders")]
pub async fn get_leaders(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    _current_volunteer: CurrentVolunteer,
) -> Result<Json<Vec<Leader>>, AppError> {
    let repo = repository(pool);
    Ok(Json(VolunteerService::new(&repo).leaders().await?))
}

/// Force another volunteer offline (leaders only, audited)
#[openapi(tag = "Volunteers")]
#[put("/<id>/force-offline")]
pub async fn force_offline(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_volunteer: CurrentVolunteer,
    client_ip: ClientIp,
    id: &str,
) -> Result<Json<VolunteerResponse>, AppError> {
    let target = Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid volunteer id", e))?;

    let repo = repository(pool);
    let volunteer = VolunteerService::new(&repo).force_offline(&current_volunteer.id, &target).await?;

    info!(target: "audit", actor_id = %current_volunteer.id, volunteer_id = %target, ip = client_ip.as_str(), "force-offline requested");
    Ok(Json(VolunteerResponse::from(&volunteer)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        register,
        login,
        logout,
        get_me,
        put_my_status,
        get_roster,
        get_leaders,
        force_offline
    ]
}
