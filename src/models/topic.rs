use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;

/// Country value for topics offered everywhere.
pub const GLOBAL_COUNTRY: &str = "Todos";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema, sqlx::FromRow)]
pub struct Topic {
    pub id: Uuid,
    pub pais: String,
    pub titulo: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
