use crate::database::volunteer::{VolunteerRepository, dummy_verify, hash_password, verify_password};
use crate::error::app_error::AppError;
use crate::models::volunteer::{Leader, LoginRequest, Volunteer, VolunteerRequest, VolunteerStatus};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Statuses listed in the "who's online" roster.
pub const ROSTER_STATUSES: [VolunteerStatus; 2] = [VolunteerStatus::Online, VolunteerStatus::Busy];

pub struct VolunteerService<'a, R> {
    repository: &'a R,
}

impl<'a, R: VolunteerRepository> VolunteerService<'a, R> {
    pub fn new(repository: &'a R) -> Self {
        VolunteerService { repository }
    }

    pub async fn register(&self, request: &VolunteerRequest) -> Result<Volunteer, AppError> {
        request.validate()?;

        let password_hash = hash_password(&request.password)?;
        let volunteer = self
            .repository
            .create_volunteer(request, &password_hash)
            .await?
            .ok_or_else(|| AppError::VolunteerAlreadyExists(request.email.clone()))?;

        info!(volunteer_id = %volunteer.id, "volunteer registered");
        Ok(volunteer)
    }

    /// Checks credentials and marks the volunteer online.
    pub async fn authenticate(&self, request: &LoginRequest) -> Result<Volunteer, AppError> {
        request.validate()?;

        let Some(volunteer) = self.repository.get_volunteer_by_email(&request.email).await? else {
            dummy_verify(&request.password);
            return Err(AppError::InvalidCredentials);
        };
        verify_password(&volunteer, &request.password)?;

        self.set_status(&volunteer.id, VolunteerStatus::Online).await
    }

    pub async fn get(&self, id: &Uuid) -> Result<Volunteer, AppError> {
        self.repository
            .get_volunteer_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Volunteer {} not found", id)))
    }

    pub async fn set_status(&self, id: &Uuid, status: VolunteerStatus) -> Result<Volunteer, AppError> {
        let volunteer = self
            .repository
            .set_volunteer_status(id, status)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Volunteer {} not found", id)))?;

        info!(volunteer_id = %id, status = %status, "presence changed");
        Ok(volunteer)
    }

    pub async fn roster(&self) -> Result<Vec<Volunteer>, AppError> {
        self.repository.list_volunteers_by_status(&ROSTER_STATUSES).await
    }

    pub async fn online_count(&self) -> Result<usize, AppError> {
        Ok(self.repository.list_volunteers_by_status(&[VolunteerStatus::Online]).await?.len())
    }

    pub async fn leaders(&self) -> Result<Vec<Leader>, AppError> {
        self.repository.list_leaders().await
    }

    pub async fn force_offline(&self, actor_id: &Uuid, volunteer_id: &Uuid) -> Result<Volunteer, AppError> {
        if !self.repository.is_leader(actor_id).await? {
            return Err(AppError::Forbidden("Only leaders can change another volunteer's presence".to_string()));
        }

        let volunteer = self
            .repository
            .force_offline(actor_id, volunteer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Volunteer {} not found", volunteer_id)))?;

        info!(target: "audit", actor_id = %actor_id, volunteer_id = %volunteer_id, "presence forced offline");
        Ok(volunteer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockRepository, sample_volunteer_request};

    #[tokio::test]
    async fn register_twice_conflicts() {
        let repo = MockRepository::new();
        let service = VolunteerService::new(&repo);
        let request = sample_volunteer_request("maria@example.org");

        service.register(&request).await.unwrap();
        let err = service.register(&request).await.unwrap_err();
        assert!(matches!(err, AppError::VolunteerAlreadyExists(_)));
    }

    #[tokio::test]
    async fn login_goes_online_and_bad_password_fails() {
        let repo = MockRepository::new();
        let service = VolunteerService::new(&repo);
        let request = sample_volunteer_request("pedro@example.org");
        service.register(&request).await.unwrap();

        let bad = LoginRequest {
            email: "pedro@example.org".to_string(),
            password: "otra-clave".to_string(),
        };
        assert!(matches!(service.authenticate(&bad).await, Err(AppError::InvalidCredentials)));

        let unknown = LoginRequest {
            email: "nadie@example.org".to_string(),
            password: request.password.clone(),
        };
        assert!(matches!(service.authenticate(&unknown).await, Err(AppError::InvalidCredentials)));

        let good = LoginRequest {
            email: "Pedro@Example.org".to_string(),
            password: request.password.clone(),
        };
        let volunteer = service.authenticate(&good).await.unwrap();
        assert_eq!(volunteer.status, VolunteerStatus::Online);
        assert_eq!(service.online_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn roster_lists_online_and_busy() {
        let repo = MockRepository::new();
        let service = VolunteerService::new(&repo);
        let a = repo.create_volunteer(&sample_volunteer_request("a@example.org"), "h").await.unwrap().unwrap();
        let b = repo.create_volunteer(&sample_volunteer_request("b@example.org"), "h").await.unwrap().unwrap();
        repo.create_volunteer(&sample_volunteer_request("c@example.org"), "h").await.unwrap();
        service.set_status(&a.id, VolunteerStatus::Online).await.unwrap();
        service.set_status(&b.id, VolunteerStatus::Busy).await.unwrap();

        let roster: Vec<Uuid> = service.roster().await.unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(roster, vec![a.id, b.id]);
        assert_eq!(service.online_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn only_leaders_force_offline() {
        let repo = MockRepository::new();
        let service = VolunteerService::new(&repo);
        let leader_role = repo.insert_role("Coordinador", true);
        let leader = repo
            .create_volunteer(
                &VolunteerRequest {
                    role_id: Some(leader_role.id),
                    ..sample_volunteer_request("lider@example.org")
                },
                "h",
            )
            .await
            .unwrap()
            .unwrap();
        let other = repo.create_volunteer(&sample_volunteer_request("otro@example.org"), "h").await.unwrap().unwrap();
        service.set_status(&other.id, VolunteerStatus::Online).await.unwrap();

        let err = service.force_offline(&other.id, &leader.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let forced = service.force_offline(&leader.id, &other.id).await.unwrap();
        assert_eq!(forced.status, VolunteerStatus::Offline);
        assert_eq!(repo.presence_audit().len(), 1);

        let leaders = service.leaders().await.unwrap();
        assert_eq!(leaders.len(), 1);
        assert_eq!(leaders[0].role_name, "Coordinador");
    }
}
