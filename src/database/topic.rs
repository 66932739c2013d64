use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::topic::{GLOBAL_COUNTRY, Topic};

#[async_trait::async_trait]
pub trait TopicRepository: Send + Sync {
    /// Active topics for `pais` plus the global ones. `None` lists every active topic.
    async fn list_topics(&self, pais: Option<&str>) -> Result<Vec<Topic>, AppError>;
}

#[async_trait::async_trait]
impl TopicRepository for PostgresRepository {
    async fn list_topics(&self, pais: Option<&str>) -> Result<Vec<Topic>, AppError> {
        let topics = sqlx::query_as::<_, Topic>(
            r#"
            SELECT id, pais, titulo, active, created_at
            FROM topics
            WHERE active
              AND ($1::text IS NULL OR pais = $1 OR pais = $2)
            ORDER BY titulo ASC
            "#,
        )
        .bind(pais)
        .bind(GLOBAL_COUNTRY)
        .fetch_all(&self.pool)
        .await?;

        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockRepository, sample_topic};

    #[tokio::test]
    async fn test_mock_topics_include_global_ones() {
        let repo = MockRepository::new();
        repo.insert_topic(sample_topic("Paraguay", "Historia familiar", true));
        repo.insert_topic(sample_topic(GLOBAL_COUNTRY, "Otro", true));
        repo.insert_topic(sample_topic("Chile", "Indexación", true));
        repo.insert_topic(sample_topic("Paraguay", "Archivado", false));

        let titles: Vec<String> = repo.list_topics(Some("Paraguay")).await.unwrap().into_iter().map(|t| t.titulo).collect();
        assert_eq!(titles, vec!["Historia familiar".to_string(), "Otro".to_string()]);

        assert_eq!(repo.list_topics(None).await.unwrap().len(), 3);
    }
}
