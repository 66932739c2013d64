use crate::auth::{CurrentVolunteer, RequesterToken};
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::session::{AbandonRequest, SessionCreatedResponse, SessionRequest, SessionResponse, SessionStatus};
use crate::service::session::{Participant, SessionService};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) fn service(pool: &State<PgPool>) -> SessionService<PostgresRepository> {
    SessionService::new(PostgresRepository::new(pool.inner().clone()))
}

pub(crate) fn parse_session_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid session id", e))
}

fn responses(sessions: &[crate::models::session::Session]) -> Json<Vec<SessionResponse>> {
    Json(sessions.iter().map(SessionResponse::from).collect())
}

/// Submit a help request; the session starts waiting in the queue.
/// The requester token is only ever returned here.
#[openapi(tag = "Sessions")]
#[post("/", data = "<payload>")]
pub async fn create_session(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    payload: Json<SessionRequest>,
) -> Result<(Status, Json<SessionCreatedResponse>), AppError> {
    let submission = service(pool).submit(&payload).await?;
    Ok((
        Status::Created,
        Json(SessionCreatedResponse {
            session: SessionResponse::from(&submission.session),
            requester_token: submission.requester_token,
        }),
    ))
}

/// List sessions by status, oldest first
#[openapi(tag = "Sessions")]
#[get("/?<estado>")]
pub async fn list_sessions(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    _current_volunteer: CurrentVolunteer,
    estado: Option<Vec<SessionStatus>>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let statuses = estado.filter(|s| !s.is_empty()).unwrap_or_else(|| SessionStatus::DASHBOARD.to_vec());
    let sessions = service(pool).list(&statuses).await?;
    Ok(responses(&sessions))
}

/// Waiting sessions, oldest first
#[openapi(tag = "Sessions")]
#[get("/queue")]
pub async fn get_queue(pool: &State<PgPool>, _rate_limit: RateLimit) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = service(pool).queue().await?;
    Ok(Json(sessions.iter().map(|s| SessionResponse::from(s).redacted()).collect()))
}

/// Single session, polled by the requester while waiting
#[openapi(tag = "Sessions")]
#[get("/<id>")]
pub async fn get_session(pool: &State<PgPool>, _rate_limit: RateLimit, id: &str) -> Result<Json<SessionResponse>, AppError> {
    let session = service(pool).get(&parse_session_id(id)?).await?;
    Ok(Json(SessionResponse::from(&session).redacted()))
}

/// Claim a waiting session. Another volunteer getting there first is a 409
#[openapi(tag = "Sessions")]
#[post("/<id>/claim")]
pub async fn claim_session(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_volunteer: CurrentVolunteer,
    id: &str,
) -> Result<Json<SessionResponse>, AppError> {
    let session = service(pool).claim(&parse_session_id(id)?, &current_volunteer.id).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Finish an attended session as its owning volunteer
#[openapi(tag = "Sessions")]
#[post("/<id>/finish")]
pub async fn finish_session(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_volunteer: CurrentVolunteer,
    id: &str,
) -> Result<Json<SessionResponse>, AppError> {
    let by = Participant::Volunteer {
        id: current_volunteer.id,
        nombre: current_volunteer.nombre,
    };
    let session = service(pool).close(&parse_session_id(id)?, &by).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Requester ends the conversation
#[openapi(tag = "Sessions")]
#[post("/<id>/end")]
pub async fn end_session(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    token: RequesterToken,
    id: &str,
) -> Result<Json<SessionResponse>, AppError> {
    let id = parse_session_id(id)?;
    let service = service(pool);
    service.authorize_requester(&id, token.0.as_deref()).await?;
    let session = service.close(&id, &Participant::Requester).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Requester gives up waiting, or the waiting room timed out
#[openapi(tag = "Sessions")]
#[post("/<id>/abandon", data = "<payload>")]
pub async fn abandon_session(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    token: RequesterToken,
    id: &str,
    payload: Json<AbandonRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let id = parse_session_id(id)?;
    let service = service(pool);
    service.authorize_requester(&id, token.0.as_deref()).await?;
    let session = service.abandon(&id, payload.reason).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// A co-assisting volunteer leaves; the session stays in attendance
#[openapi(tag = "Sessions")]
#[post("/<id>/leave")]
pub async fn leave_session(
    pool: &State<PgPool>,
    _rate_limit: RateLimit,
    current_volunteer: CurrentVolunteer,
    id: &str,
) -> Result<Json<SessionResponse>, AppError> {
    let session = service(pool)
        .leave(&parse_session_id(id)?, &current_volunteer.id, &current_volunteer.nombre)
        .await?;
    Ok(Json(SessionResponse::from(&session)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        create_session,
        list_sessions,
        get_queue,
        get_session,
        claim_session,
        finish_session,
        end_session,
        abandon_session,
        leave_session
    ]
}

#[cfg(test)]
mod tests {
    use crate::auth::REQUESTER_TOKEN_HEADER;
    use crate::test_utils::{login, test_client};
    use rocket::http::{ContentType, Header, Status};
    use serde_json::{Value, json};

    fn request_body() -> String {
        json!({
            "nombre": "Ana",
            "apellido": "Benítez",
            "pais": "Paraguay",
            "idioma": "es",
            "tema": "X",
            "type": "chat",
            "terms": true
        })
        .to_string()
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn submit_then_claim_then_finish() {
        let client = test_client().await;
        let created = client.post("/api/sessions").header(ContentType::JSON).body(request_body()).dispatch().await;
        assert_eq!(created.status(), Status::Created);
        let session: Value = created.into_json().await.unwrap();
        assert_eq!(session["estado"], "esperando");
        let id = session["id"].as_str().unwrap().to_string();

        let volunteer = login(&client).await;
        let claimed = client.post(format!("/api/sessions/{}/claim", id)).dispatch().await;
        assert_eq!(claimed.status(), Status::Ok);
        let claimed: Value = claimed.into_json().await.unwrap();
        assert_eq!(claimed["estado"], "en_atencion");
        assert_eq!(claimed["voluntario_id"], volunteer);

        let again = client.post(format!("/api/sessions/{}/claim", id)).dispatch().await;
        assert_eq!(again.status(), Status::Conflict);

        let finished = client.post(format!("/api/sessions/{}/finish", id)).dispatch().await;
        assert_eq!(finished.status(), Status::Ok);
        let finished: Value = finished.into_json().await.unwrap();
        assert_eq!(finished["estado"], "finalizado");
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn terms_must_be_accepted() {
        let client = test_client().await;
        let mut body: Value = serde_json::from_str(&request_body()).unwrap();
        body["terms"] = json!(false);

        let response = client.post("/api/sessions").header(ContentType::JSON).body(body.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn claim_requires_login() {
        let client = test_client().await;
        let created = client.post("/api/sessions").header(ContentType::JSON).body(request_body()).dispatch().await;
        let session: Value = created.into_json().await.unwrap();

        let response = client
            .post(format!("/api/sessions/{}/claim", session["id"].as_str().unwrap()))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn malformed_id_is_bad_request() {
        let client = test_client().await;
        let response = client.get("/api/sessions/not-a-uuid").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn requester_actions_need_the_session_token() {
        let client = test_client().await;
        let created: Value = client
            .post("/api/sessions")
            .header(ContentType::JSON)
            .body(request_body())
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let token = created["requester_token"].as_str().unwrap().to_string();

        let queue: Vec<Value> = client.get("/api/sessions/queue").dispatch().await.into_json().await.unwrap();
        let listed = queue.iter().find(|s| s["id"] == id.as_str()).unwrap();
        assert!(listed["email"].is_null());
        assert!(listed.get("requester_token").is_none());

        let abandon = json!({ "reason": "cancelled" }).to_string();
        let anonymous = client
            .post(format!("/api/sessions/{}/abandon", id))
            .header(ContentType::JSON)
            .body(abandon.clone())
            .dispatch()
            .await;
        assert_eq!(anonymous.status(), Status::Unauthorized);

        let forged = client
            .post(format!("/api/sessions/{}/end", id))
            .header(Header::new(REQUESTER_TOKEN_HEADER, "0".repeat(64)))
            .dispatch()
            .await;
        assert_eq!(forged.status(), Status::Forbidden);

        let still: Value = client.get(format!("/api/sessions/{}", id)).dispatch().await.into_json().await.unwrap();
        assert_eq!(still["estado"], "esperando");

        let abandoned = client
            .post(format!("/api/sessions/{}/abandon", id))
            .header(ContentType::JSON)
            .header(Header::new(REQUESTER_TOKEN_HEADER, token))
            .body(abandon)
            .dispatch()
            .await;
        assert_eq!(abandoned.status(), Status::Ok);
    }
}
