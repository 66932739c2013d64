use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::survey::{Survey, SurveyRequest};

#[async_trait::async_trait]
pub trait SurveyRepository: Send + Sync {
    /// Returns `None` when the session already has a survey.
    async fn create_survey(&self, request: &SurveyRequest) -> Result<Option<Survey>, AppError>;
    /// Most recent surveys first.
    async fn list_surveys(&self, limit: i64) -> Result<Vec<Survey>, AppError>;
}

#[async_trait::async_trait]
impl SurveyRepository for PostgresRepository {
    async fn create_survey(&self, request: &SurveyRequest) -> Result<Option<Survey>, AppError> {
        let survey = sqlx::query_as::<_, Survey>(
            r#"
            INSERT INTO surveys (session_id, calificacion, comentarios)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id) DO NOTHING
            RETURNING id, session_id, calificacion, comentarios, created_at
            "#,
        )
        .bind(request.session_id)
        .bind(request.calificacion)
        .bind(request.comentarios())
        .fetch_optional(&self.pool)
        .await?;

        Ok(survey)
    }

    async fn list_surveys(&self, limit: i64) -> Result<Vec<Survey>, AppError> {
        let surveys = sqlx::query_as::<_, Survey>(
            r#"
            SELECT id, session_id, calificacion, comentarios, created_at
            FROM surveys
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(surveys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockRepository;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_mock_survey_is_recorded_once() {
        let repo = MockRepository::new();
        let request = SurveyRequest {
            session_id: Uuid::new_v4(),
            calificacion: 5,
            comentarios: Some("  muy amable ".to_string()),
        };

        let created = repo.create_survey(&request).await.unwrap().unwrap();
        assert_eq!(created.comentarios.as_deref(), Some("muy amable"));
        assert!(repo.create_survey(&request).await.unwrap().is_none());
        assert_eq!(repo.list_surveys(10).await.unwrap().len(), 1);
    }
}
