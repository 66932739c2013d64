use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::volunteer::{SessionVolunteer, VolunteerSession};
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl PostgresRepository {
    pub async fn create_volunteer_session(&self, volunteer_id: &Uuid, expires_at: DateTime<Utc>) -> Result<VolunteerSession, AppError> {
        self.delete_expired_sessions_for_volunteer(volunteer_id).await?;

        let session = sqlx::query_as::<_, VolunteerSession>(
            r#"
            INSERT INTO volunteer_sessions (volunteer_id, expires_at)
            VALUES ($1, $2)
            RETURNING id, volunteer_id, created_at, expires_at
            "#,
        )
        .bind(volunteer_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn get_active_session_volunteer(&self, session_id: &Uuid, volunteer_id: &Uuid) -> Result<Option<SessionVolunteer>, AppError> {
        let volunteer = sqlx::query_as::<_, SessionVolunteer>(
            r#"
            SELECT v.id, v.email, v.nombre
            FROM volunteer_sessions s
            JOIN volunteers v ON v.id = s.volunteer_id
            WHERE s.id = $1
              AND s.volunteer_id = $2
              AND s.expires_at > now()
            "#,
        )
        .bind(session_id)
        .bind(volunteer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(volunteer)
    }

    pub async fn delete_volunteer_session_if_expired(&self, session_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM volunteer_sessions WHERE id = $1 AND expires_at <= now()")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_expired_sessions_for_volunteer(&self, volunteer_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM volunteer_sessions WHERE volunteer_id = $1 AND expires_at <= now()")
            .bind(volunteer_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_volunteer_session(&self, session_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM volunteer_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
