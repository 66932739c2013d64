use crate::database::postgres_repository::PostgresRepository;
use crate::database::topic::TopicRepository;
use crate::error::app_error::AppError;
use crate::middleware::rate_limit::RateLimit;
use crate::models::topic::Topic;
use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_okapi::openapi;
use sqlx::PgPool;

/// Active topics offered in a country, including the global ones
#[openapi(tag = "Topics")]
#[get("/?<pais>")]
pub async fn list_topics(pool: &State<PgPool>, _rate_limit: RateLimit, pais: Option<&str>) -> Result<Json<Vec<Topic>>, AppError> {
    let repo = PostgresRepository::new(pool.inner().clone());
    let pais = pais.map(str::trim).filter(|p| !p.is_empty());
    Ok(Json(repo.list_topics(pais).await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![list_topics]
}
