use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema, sqlx::FromRow)]
pub struct Survey {
    pub id: Uuid,
    pub session_id: Uuid,
    pub calificacion: i16,
    pub comentarios: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Validate, JsonSchema)]
pub struct SurveyRequest {
    pub session_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub calificacion: i16,
    #[validate(length(max = 2000))]
    pub comentarios: Option<String>,
}

impl SurveyRequest {
    pub fn comentarios(&self) -> Option<&str> {
        self.comentarios.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}
