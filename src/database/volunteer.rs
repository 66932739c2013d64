use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::volunteer::{Leader, Volunteer, VolunteerRequest, VolunteerStatus};
use argon2::Argon2;
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, Salt, SaltString};
use std::sync::LazyLock;
use uuid::Uuid;

/// A real Argon2 hash generated once at startup, used as a timing decoy
/// so that login requests for unknown emails take as long as real ones.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"dummy-never-matches", Salt::from(&salt))
        .map(|hash| hash.to_string())
        .unwrap_or_default()
});

#[async_trait::async_trait]
pub trait VolunteerRepository: Send + Sync {
    /// Returns `None` when the email is already registered.
    async fn create_volunteer(&self, request: &VolunteerRequest, password_hash: &str) -> Result<Option<Volunteer>, AppError>;
    async fn get_volunteer_by_email(&self, email: &str) -> Result<Option<Volunteer>, AppError>;
    async fn get_volunteer_by_id(&self, id: &Uuid) -> Result<Option<Volunteer>, AppError>;
    async fn set_volunteer_status(&self, id: &Uuid, status: VolunteerStatus) -> Result<Option<Volunteer>, AppError>;
    async fn list_volunteers_by_status(&self, statuses: &[VolunteerStatus]) -> Result<Vec<Volunteer>, AppError>;
    async fn list_leaders(&self) -> Result<Vec<Leader>, AppError>;
    async fn is_leader(&self, id: &Uuid) -> Result<bool, AppError>;
    /// Sets `volunteer_id` offline on behalf of `actor_id` and records the override.
    async fn force_offline(&self, actor_id: &Uuid, volunteer_id: &Uuid) -> Result<Option<Volunteer>, AppError>;
}

#[async_trait::async_trait]
impl VolunteerRepository for PostgresRepository {
    async fn create_volunteer(&self, request: &VolunteerRequest, password_hash: &str) -> Result<Option<Volunteer>, AppError> {
        let volunteer = sqlx::query_as::<_, Volunteer>(
            r#"
            INSERT INTO volunteers (email, nombre, password_hash, role_id)
            VALUES (lower($1), $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, nombre, password_hash, role_id, status, last_status_change, created_at
            "#,
        )
        .bind(request.email.trim())
        .bind(request.nombre.trim())
        .bind(password_hash)
        .bind(request.role_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(volunteer)
    }

    async fn get_volunteer_by_email(&self, email: &str) -> Result<Option<Volunteer>, AppError> {
        let volunteer = sqlx::query_as::<_, Volunteer>(
            r#"
            SELECT id, email, nombre, password_hash, role_id, status, last_status_change, created_at
            FROM volunteers
            WHERE email = lower($1)
            "#,
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(volunteer)
    }

    async fn get_volunteer_by_id(&self, id: &Uuid) -> Result<Option<Volunteer>, AppError> {
        let volunteer = sqlx::query_as::<_, Volunteer>(
            r#"
            SELECT id, email, nombre, password_hash, role_id, status, last_status_change, created_at
            FROM volunteers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(volunteer)
    }

    async fn set_volunteer_status(&self, id: &Uuid, status: VolunteerStatus) -> Result<Option<Volunteer>, AppError> {
        let volunteer = sqlx::query_as::<_, Volunteer>(
            r#"
            UPDATE volunteers
            SET status = $2, last_status_change = now()
            WHERE id = $1
            RETURNING id, email, nombre, password_hash, role_id, status, last_status_change, created_at
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(volunteer)
    }

    async fn list_volunteers_by_status(&self, statuses: &[VolunteerStatus]) -> Result<Vec<Volunteer>, AppError> {
        let statuses: Vec<String> = statuses.iter().map(ToString::to_string).collect();

        let volunteers = sqlx::query_as::<_, Volunteer>(
            r#"
            SELECT id, email, nombre, password_hash, role_id, status, last_status_change, created_at
            FROM volunteers
            WHERE status = ANY($1)
            ORDER BY nombre ASC
            "#,
        )
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        Ok(volunteers)
    }

    async fn list_leaders(&self) -> Result<Vec<Leader>, AppError> {
        let leaders = sqlx::query_as::<_, Leader>(
            r#"
            SELECT v.id, v.email, v.nombre, r.name AS role_name, v.status
            FROM volunteers v
            JOIN roles r ON r.id = v.role_id
            WHERE r.is_leader
            ORDER BY v.nombre ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(leaders)
    }

    async fn is_leader(&self, id: &Uuid) -> Result<bool, AppError> {
        let is_leader: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT r.is_leader
            FROM volunteers v
            JOIN roles r ON r.id = v.role_id
            WHERE v.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(is_leader.unwrap_or(false))
    }

    async fn force_offline(&self, actor_id: &Uuid, volunteer_id: &Uuid) -> Result<Option<Volunteer>, AppError> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<VolunteerStatus> = sqlx::query_scalar("SELECT status FROM volunteers WHERE id = $1 FOR UPDATE")
            .bind(volunteer_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(previous) = previous else {
            return Ok(None);
        };

        let volunteer = sqlx::query_as::<_, Volunteer>(
            r#"
            UPDATE volunteers
            SET status = 'offline', last_status_change = now()
            WHERE id = $1
            RETURNING id, email, nombre, password_hash, role_id, status, last_status_change, created_at
            "#,
        )
        .bind(volunteer_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO presence_audit (actor_id, volunteer_id, old_status, new_status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(actor_id)
        .bind(volunteer_id)
        .bind(previous)
        .bind(VolunteerStatus::Offline)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(volunteer))
    }
}

pub(crate) fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub(crate) fn verify_password(volunteer: &Volunteer, password: &str) -> Result<(), AppError> {
    let password_hash = PasswordHash::new(&volunteer.password_hash).map_err(|e| AppError::password_hash("Failed to parse stored password hash", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &password_hash)
        .map_err(|_| AppError::InvalidCredentials)?;

    Ok(())
}

/// Throwaway verification that equalizes timing for unknown emails.
pub(crate) fn dummy_verify(password: &str) {
    if let Ok(hash) = PasswordHash::new(&DUMMY_HASH) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
    }
}
