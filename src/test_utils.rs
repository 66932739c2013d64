use crate::database::message::MessageRepository;
use crate::database::session::SessionRepository;
use crate::database::survey::SurveyRepository;
use crate::database::topic::TopicRepository;
use crate::database::volunteer::VolunteerRepository;
use crate::error::app_error::AppError;
use crate::models::message::{Cursor, Message, NewMessage};
use crate::models::session::{Channel, Lifecycle, Requester, Session, SessionEvent, SessionRequest, SessionRow, SessionStatus};
use crate::models::survey::{Survey, SurveyRequest};
use crate::models::topic::{GLOBAL_COUNTRY, Topic};
use crate::models::volunteer::{Leader, Role, Volunteer, VolunteerRequest, VolunteerStatus};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub fn sample_session_request() -> SessionRequest {
    SessionRequest {
        nombre: "Ana".to_string(),
        apellido: "Benítez".to_string(),
        email: Some("ana@example.org".to_string()),
        pais: "Paraguay".to_string(),
        idioma: Some("es".to_string()),
        tema: "X".to_string(),
        channel: Channel::Chat,
        terms: true,
    }
}

pub fn sample_session() -> Session {
    let now = Utc::now().trunc_subsecs(6);
    Session {
        id: Uuid::new_v4(),
        requester: Requester {
            first_name: "Ana".to_string(),
            last_name: "Benítez".to_string(),
            email: None,
            country: "Paraguay".to_string(),
            language: Some("es".to_string()),
        },
        topic: "X".to_string(),
        channel: Channel::Chat,
        room_id: "sala-ana-test".to_string(),
        entered_at: now,
        lifecycle: Lifecycle::Waiting,
        created_at: now,
    }
}

pub fn sample_session_row() -> SessionRow {
    let now = Utc::now();
    SessionRow {
        id: Uuid::new_v4(),
        nombre: "Ana".to_string(),
        apellido: "Benítez".to_string(),
        email: None,
        pais: "Paraguay".to_string(),
        idioma: None,
        tema: "X".to_string(),
        channel: Channel::Video,
        sala_jitsi_id: "sala-ana-test".to_string(),
        estado: SessionStatus::Waiting,
        voluntario_id: None,
        fecha_ingreso: now,
        fecha_atencion: None,
        fecha_fin: None,
        created_at: now,
    }
}

pub fn sample_volunteer() -> Volunteer {
    Volunteer {
        id: Uuid::new_v4(),
        email: "voluntario@example.org".to_string(),
        nombre: "Voluntario".to_string(),
        password_hash: String::new(),
        role_id: None,
        status: VolunteerStatus::Offline,
        last_status_change: Utc::now(),
        created_at: Utc::now(),
    }
}

pub fn sample_volunteer_request(email: &str) -> VolunteerRequest {
    VolunteerRequest {
        email: email.to_string(),
        nombre: email.split('@').next().unwrap_or("voluntario").to_string(),
        password: "una-clave-segura".to_string(),
        role_id: None,
    }
}

pub fn sample_topic(pais: &str, titulo: &str, active: bool) -> Topic {
    Topic {
        id: Uuid::new_v4(),
        pais: pais.to_string(),
        titulo: titulo.to_string(),
        active,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
struct MockState {
    sessions: Vec<Session>,
    messages: Vec<Message>,
    volunteers: Vec<Volunteer>,
    roles: Vec<Role>,
    surveys: Vec<Survey>,
    topics: Vec<Topic>,
    presence_audit: Vec<(Uuid, Uuid, VolunteerStatus, VolunteerStatus)>,
    requester_tokens: HashMap<Uuid, String>,
    failures_left: u32,
    calls_before_failure: u32,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MockState {
    /// Strictly increasing timestamps at database precision.
    fn now(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }
}

/// In-memory repository with the same conditional-update semantics as
/// the Postgres one. Clones share state.
#[derive(Clone, Default)]
pub struct MockRepository {
    state: Arc<Mutex<MockState>>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` repository calls fail like an unreachable database.
    pub fn fail_next(&self, count: u32) {
        self.fail_after(0, count);
    }

    /// Lets `calls` repository calls through, then fails the following `count`.
    pub fn fail_after(&self, calls: u32, count: u32) {
        let mut state = self.state.lock().unwrap();
        state.calls_before_failure = calls;
        state.failures_left = count;
    }

    pub fn insert_topic(&self, topic: Topic) {
        self.state.lock().unwrap().topics.push(topic);
    }

    pub fn insert_role(&self, name: &str, is_leader: bool) -> Role {
        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            is_leader,
        };
        self.state.lock().unwrap().roles.push(role.clone());
        role
    }

    pub fn presence_audit(&self) -> Vec<(Uuid, Uuid, VolunteerStatus, VolunteerStatus)> {
        self.state.lock().unwrap().presence_audit.clone()
    }

    pub fn messages_for(&self, session_id: &Uuid) -> Vec<Message> {
        let state = self.state.lock().unwrap();
        state.messages.iter().filter(|m| &m.session_id == session_id).cloned().collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.failures_left > 0 {
            if state.calls_before_failure > 0 {
                state.calls_before_failure -= 1;
            } else {
                state.failures_left -= 1;
                return Err(AppError::from(sqlx::Error::PoolTimedOut));
            }
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl SessionRepository for MockRepository {
    async fn create_session(&self, request: &SessionRequest, room_id: &str, token_hash: &str) -> Result<Session, AppError> {
        let mut state = self.lock()?;
        let now = state.now();
        let session = Session {
            id: Uuid::new_v4(),
            requester: Requester {
                first_name: request.nombre.trim().to_string(),
                last_name: request.apellido.trim().to_string(),
                email: request.email().map(str::to_string),
                country: request.pais.trim().to_string(),
                language: request.idioma().map(str::to_string),
            },
            topic: request.tema.trim().to_string(),
            channel: request.channel,
            room_id: room_id.to_string(),
            entered_at: now,
            lifecycle: Lifecycle::Waiting,
            created_at: now,
        };
        state.sessions.push(session.clone());
        state.requester_tokens.insert(session.id, token_hash.to_string());
        Ok(session)
    }

    async fn requester_token_matches(&self, id: &Uuid, token_hash: &str) -> Result<bool, AppError> {
        let state = self.lock()?;
        Ok(state.requester_tokens.get(id).is_some_and(|stored| stored == token_hash))
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<Session>, AppError> {
        let state = self.lock()?;
        Ok(state.sessions.iter().find(|s| &s.id == id).cloned())
    }

    async fn list_sessions(&self, statuses: &[SessionStatus]) -> Result<Vec<Session>, AppError> {
        let state = self.lock()?;
        let mut sessions: Vec<Session> = state.sessions.iter().filter(|s| statuses.contains(&s.status())).cloned().collect();
        sessions.sort_by_key(|s| s.entered_at);
        Ok(sessions)
    }

    async fn transition_session(&self, id: &Uuid, event: SessionEvent, owner: Option<&Uuid>) -> Result<Option<Session>, AppError> {
        let mut state = self.lock()?;
        let now = state.now();
        let Some(stored) = state.sessions.iter_mut().find(|s| &s.id == id) else {
            return Ok(None);
        };
        if let Some(owner) = owner
            && !matches!(event, SessionEvent::Claim(_))
            && !stored.is_owned_by(owner)
        {
            return Ok(None);
        }
        match stored.apply(event, now) {
            Ok(next) => {
                *stored = next.clone();
                Ok(Some(next))
            }
            Err(_) => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl MessageRepository for MockRepository {
    async fn append_message(&self, message: &NewMessage) -> Result<Message, AppError> {
        let mut state = self.lock()?;
        let created_at = state.now();
        let message = Message {
            id: Uuid::new_v4(),
            session_id: message.session_id,
            sender: message.sender,
            text: message.text.clone(),
            volunteer_id: message.volunteer_id,
            created_at,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, session_id: &Uuid, cursor: Cursor) -> Result<Vec<Message>, AppError> {
        let state = self.lock()?;
        Ok(state
            .messages
            .iter()
            .filter(|m| &m.session_id == session_id)
            .filter(|m| cursor.position().is_none_or(|after| m.created_at > after))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl VolunteerRepository for MockRepository {
    async fn create_volunteer(&self, request: &VolunteerRequest, password_hash: &str) -> Result<Option<Volunteer>, AppError> {
        let mut state = self.lock()?;
        let email = request.email.trim().to_lowercase();
        if state.volunteers.iter().any(|v| v.email == email) {
            return Ok(None);
        }
        let now = state.now();
        let volunteer = Volunteer {
            id: Uuid::new_v4(),
            email,
            nombre: request.nombre.trim().to_string(),
            password_hash: password_hash.to_string(),
            role_id: request.role_id,
            status: VolunteerStatus::Offline,
            last_status_change: now,
            created_at: now,
        };
        state.volunteers.push(volunteer.clone());
        Ok(Some(volunteer))
    }

    async fn get_volunteer_by_email(&self, email: &str) -> Result<Option<Volunteer>, AppError> {
        let state = self.lock()?;
        let email = email.trim().to_lowercase();
        Ok(state.volunteers.iter().find(|v| v.email == email).cloned())
    }

    async fn get_volunteer_by_id(&self, id: &Uuid) -> Result<Option<Volunteer>, AppError> {
        let state = self.lock()?;
        Ok(state.volunteers.iter().find(|v| &v.id == id).cloned())
    }

    async fn set_volunteer_status(&self, id: &Uuid, status: VolunteerStatus) -> Result<Option<Volunteer>, AppError> {
        let mut state = self.lock()?;
        let now = state.now();
        Ok(state.volunteers.iter_mut().find(|v| &v.id == id).map(|volunteer| {
            volunteer.status = status;
            volunteer.last_status_change = now;
            volunteer.clone()
        }))
    }

    async fn list_volunteers_by_status(&self, statuses: &[VolunteerStatus]) -> Result<Vec<Volunteer>, AppError> {
        let state = self.lock()?;
        let mut volunteers: Vec<Volunteer> = state.volunteers.iter().filter(|v| statuses.contains(&v.status)).cloned().collect();
        volunteers.sort_by(|a, b| a.nombre.cmp(&b.nombre));
        Ok(volunteers)
    }

    async fn list_leaders(&self) -> Result<Vec<Leader>, AppError> {
        let state = self.lock()?;
        let mut leaders: Vec<Leader> = state
            .volunteers
            .iter()
            .filter_map(|v| {
                let role = state.roles.iter().find(|r| Some(r.id) == v.role_id && r.is_leader)?;
                Some(Leader {
                    id: v.id,
                    email: v.email.clone(),
                    nombre: v.nombre.clone(),
                    role_name: role.name.clone(),
                    status: v.status,
                })
            })
            .collect();
        leaders.sort_by(|a, b| a.nombre.cmp(&b.nombre));
        Ok(leaders)
    }

    async fn is_leader(&self, id: &Uuid) -> Result<bool, AppError> {
        let state = self.lock()?;
        let role_id = state.volunteers.iter().find(|v| &v.id == id).and_then(|v| v.role_id);
        Ok(state.roles.iter().any(|r| Some(r.id) == role_id && r.is_leader))
    }

    async fn force_offline(&self, actor_id: &Uuid, volunteer_id: &Uuid) -> Result<Option<Volunteer>, AppError> {
        let mut state = self.lock()?;
        let now = state.now();
        let Some(volunteer) = state.volunteers.iter_mut().find(|v| &v.id == volunteer_id) else {
            return Ok(None);
        };
        let previous = volunteer.status;
        volunteer.status = VolunteerStatus::Offline;
        volunteer.last_status_change = now;
        let volunteer = volunteer.clone();
        state.presence_audit.push((*actor_id, *volunteer_id, previous, VolunteerStatus::Offline));
        Ok(Some(volunteer))
    }
}

#[async_trait::async_trait]
impl SurveyRepository for MockRepository {
    async fn create_survey(&self, request: &SurveyRequest) -> Result<Option<Survey>, AppError> {
        let mut state = self.lock()?;
        if state.surveys.iter().any(|s| s.session_id == request.session_id) {
            return Ok(None);
        }
        let created_at = state.now();
        let survey = Survey {
            id: Uuid::new_v4(),
            session_id: request.session_id,
            calificacion: request.calificacion,
            comentarios: request.comentarios().map(str::to_string),
            created_at,
        };
        state.surveys.push(survey.clone());
        Ok(Some(survey))
    }

    async fn list_surveys(&self, limit: i64) -> Result<Vec<Survey>, AppError> {
        let state = self.lock()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state.surveys.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait::async_trait]
impl TopicRepository for MockRepository {
    async fn list_topics(&self, pais: Option<&str>) -> Result<Vec<Topic>, AppError> {
        let state = self.lock()?;
        let mut topics: Vec<Topic> = state
            .topics
            .iter()
            .filter(|t| t.active)
            .filter(|t| pais.is_none_or(|p| t.pais == p || t.pais == GLOBAL_COUNTRY))
            .cloned()
            .collect();
        topics.sort_by(|a, b| a.titulo.cmp(&b.titulo));
        Ok(topics)
    }
}

/// Rocket client against the database in `DATABASE_URL`, for tests marked
/// `#[ignore = "requires database"]`.
pub async fn test_client() -> rocket::local::asynchronous::Client {
    let mut config = crate::Config::default();
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }
    config.rate_limit.read_limit = 10_000;
    config.rate_limit.mutation_limit = 10_000;
    config.rate_limit.auth_limit = 10_000;

    rocket::local::asynchronous::Client::tracked(crate::build_rocket(config))
        .await
        .expect("valid rocket instance")
}

/// Registers a fresh volunteer, logs in on `client` and returns its id.
pub async fn login(client: &rocket::local::asynchronous::Client) -> String {
    use rocket::http::{ContentType, Status};

    let email = format!("voluntario-{}@example.org", Uuid::new_v4());
    let body = serde_json::json!({ "email": email, "nombre": "Élder Silva", "password": "una-clave-segura" }).to_string();

    let registered = client.post("/api/volunteers").header(ContentType::JSON).body(&body).dispatch().await;
    assert_eq!(registered.status(), Status::Created);

    let response = client
        .post("/api/volunteers/login")
        .header(ContentType::JSON)
        .body(serde_json::json!({ "email": email, "password": "una-clave-segura" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let volunteer: serde_json::Value = response.into_json().await.expect("volunteer body");
    volunteer["id"].as_str().expect("volunteer id").to_string()
}
