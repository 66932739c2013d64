use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionEvent, SessionRequest, SessionRow, SessionStatus};
use uuid::Uuid;

#[async_trait::async_trait]
pub trait SessionRepository: Send + Sync {
    /// `token_hash` is the digest of the requester token handed out once.
    async fn create_session(&self, request: &SessionRequest, room_id: &str, token_hash: &str) -> Result<Session, AppError>;
    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, AppError>;
    async fn requester_token_matches(&self, id: &Uuid, token_hash: &str) -> Result<bool, AppError>;
    /// Sessions in any of `statuses`, oldest arrival first.
    async fn list_sessions(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, AppError>;
    /// Applies `event` only if the stored status is still the event's source
    /// status and, for closing events with an `owner`, the session belongs to
    /// that volunteer. Returns `None` when the precondition no longer holds.
    async fn transition_session(&self, id: &Uuid, event: SessionEvent, owner: Option<&Uuid>) -> Result<Option<Session>, AppError>;
}

#[async_trait::async_trait]
impl SessionRepository for PostgresRepository {
    async fn create_session(&self, request: &SessionRequest, room_id: &str, token_hash: &str) -> Result<Session, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO sessions (nombre, apellido, email, pais, idioma, tema, type, sala_jitsi_id, requester_token_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, nombre, apellido, email, pais, idioma, tema, type, sala_jitsi_id, estado,
                      voluntario_id, fecha_ingreso, fecha_atencion, fecha_fin, created_at
            "#,
        )
        .bind(request.nombre.trim())
        .bind(request.apellido.trim())
        .bind(request.email())
        .bind(request.pais.trim())
        .bind(request.idioma())
        .bind(request.tema.trim())
        .bind(request.channel)
        .bind(room_id)
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;

        Session::try_from(row)
    }

    async fn requester_token_matches(&self, id: &Uuid, token_hash: &str) -> Result<bool, AppError> {
        let matches: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM sessions WHERE id = $1 AND requester_token_hash = $2)")
            .bind(id)
            .bind(token_hash)
            .fetch_one(&self.pool)
            .await?;

        Ok(matches)
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, nombre, apellido, email, pais, idioma, tema, type, sala_jitsi_id, estado,
                   voluntario_id, fecha_ingreso, fecha_atencion, fecha_fin, created_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn list_sessions(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, AppError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, nombre, apellido, email, pais, idioma, tema, type, sala_jitsi_id, estado,
                   voluntario_id, fecha_ingreso, fecha_atencion, fecha_fin, created_at
            FROM sessions
            WHERE estado = ANY($1)
            ORDER BY fecha_ingreso ASC, id ASC
            "#,
        )
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn transition_session(&self, id: &Uuid, event: SessionEvent, owner: Option<&Uuid>) -> Result<Option<Session>, AppError> {
        let query = match event {
            SessionEvent::Claim(volunteer_id) => sqlx::query_as::<_, SessionRow>(
                r#"
                UPDATE sessions
                SET estado = $2, voluntario_id = $3, fecha_atencion = clock_timestamp()
                WHERE id = $1 AND estado = $4 AND voluntario_id IS NULL
                RETURNING id, nombre, apellido, email, pais, idioma, tema, type, sala_jitsi_id, estado,
                          voluntario_id, fecha_ingreso, fecha_atencion, fecha_fin, created_at
                "#,
            )
            .bind(id)
            .bind(event.target())
            .bind(volunteer_id)
            .bind(event.source()),
            SessionEvent::Cancel | SessionEvent::WaitTimeout | SessionEvent::End => sqlx::query_as::<_, SessionRow>(
                r#"
                UPDATE sessions
                SET estado = $2, fecha_fin = clock_timestamp()
                WHERE id = $1 AND estado = $3 AND fecha_fin IS NULL
                  AND ($4::uuid IS NULL OR voluntario_id = $4)
                RETURNING id, nombre, apellido, email, pais, idioma, tema, type, sala_jitsi_id, estado,
                          voluntario_id, fecha_ingreso, fecha_atencion, fecha_fin, created_at
                "#,
            )
            .bind(id)
            .bind(event.target())
            .bind(event.source())
            .bind(owner.copied()),
        };

        let row = query.fetch_optional(&self.pool).await?;
        row.map(Session::try_from).transpose()
    }
}
