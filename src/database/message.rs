use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::message::{Cursor, Message, NewMessage};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append_message(&self, message: &NewMessage) -> Result<Message, AppError>;
    /// Messages strictly newer than `cursor`, oldest first. A start cursor
    /// returns the whole conversation.
    async fn list_messages(&self, session_id: &Uuid, cursor: Cursor) -> Result<Vec<Message>, AppError>;
}

#[async_trait::async_trait]
impl MessageRepository for PostgresRepository {
    async fn append_message(&self, message: &NewMessage) -> Result<Message, AppError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (session_id, sender, text, volunteer_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, session_id, sender, text, volunteer_id, created_at
            "#,
        )
        .bind(message.session_id)
        .bind(message.sender)
        .bind(&message.text)
        .bind(message.volunteer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn list_messages(&self, session_id: &Uuid, cursor: Cursor) -> Result<Vec<Message>, AppError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, session_id, sender, text, volunteer_id, created_at
            FROM messages
            WHERE session_id = $1
              AND ($2::timestamptz IS NULL OR created_at > $2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .bind(cursor.position())
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}
