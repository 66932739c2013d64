use crate::error::app_error::AppError;
use chrono::{DateTime, Duration, Utc};
use rocket::FromFormField;
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidateEmail, ValidationError};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, JsonSchema, sqlx::Type, FromFormField)]
#[sqlx(type_name = "text")]
pub enum SessionStatus {
    #[serde(rename = "esperando")]
    #[sqlx(rename = "esperando")]
    #[field(value = "esperando")]
    Waiting,
    #[serde(rename = "en_atencion")]
    #[sqlx(rename = "en_atencion")]
    #[field(value = "en_atencion")]
    InAttendance,
    #[serde(rename = "finalizado")]
    #[sqlx(rename = "finalizado")]
    #[field(value = "finalizado")]
    Finished,
    #[serde(rename = "abandonado")]
    #[sqlx(rename = "abandonado")]
    #[field(value = "abandonado")]
    Abandoned,
    #[serde(rename = "no_atendido")]
    #[sqlx(rename = "no_atendido")]
    #[field(value = "no_atendido")]
    Unattended,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        SessionStatus::Waiting,
        SessionStatus::InAttendance,
        SessionStatus::Finished,
        SessionStatus::Abandoned,
        SessionStatus::Unattended,
    ];

    /// Statuses shown on the volunteer dashboard when no filter is given.
    pub const DASHBOARD: [SessionStatus; 4] = [
        SessionStatus::Waiting,
        SessionStatus::InAttendance,
        SessionStatus::Abandoned,
        SessionStatus::Finished,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "esperando",
            SessionStatus::InAttendance => "en_atencion",
            SessionStatus::Finished => "finalizado",
            SessionStatus::Abandoned => "abandonado",
            SessionStatus::Unattended => "no_atendido",
        }
    }

    /// No transition leaves a terminal status. `no_atendido` is a reporting
    /// bucket and has no outgoing transition either.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Finished | SessionStatus::Abandoned | SessionStatus::Unattended)
    }

    pub fn apply(self, event: SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        if self == event.source() {
            Ok(event.target())
        } else {
            Err(InvalidTransition { from: self, event })
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, JsonSchema, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Video,
    Chat,
}

/// Everything that can move a session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Claim(Uuid),
    Cancel,
    WaitTimeout,
    End,
}

impl SessionEvent {
    /// The only status this event may be applied to.
    pub fn source(self) -> SessionStatus {
        match self {
            SessionEvent::Claim(_) | SessionEvent::Cancel | SessionEvent::WaitTimeout => SessionStatus::Waiting,
            SessionEvent::End => SessionStatus::InAttendance,
        }
    }

    pub fn target(self) -> SessionStatus {
        match self {
            SessionEvent::Claim(_) => SessionStatus::InAttendance,
            SessionEvent::Cancel | SessionEvent::WaitTimeout => SessionStatus::Abandoned,
            SessionEvent::End => SessionStatus::Finished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {event:?} to a session in state {from}")]
pub struct InvalidTransition {
    pub from: SessionStatus,
    pub event: SessionEvent,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    Cancelled,
    WaitTimeout,
}

impl From<AbandonReason> for SessionEvent {
    fn from(reason: AbandonReason) -> Self {
        match reason {
            AbandonReason::Cancelled => SessionEvent::Cancel,
            AbandonReason::WaitTimeout => SessionEvent::WaitTimeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attendance {
    pub volunteer_id: Uuid,
    pub attended_at: DateTime<Utc>,
}

/// Lifecycle state of a session. Timestamps only exist in the variants
/// where the transition table has set them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Waiting,
    InAttendance(Attendance),
    Finished { attendance: Attendance, ended_at: DateTime<Utc> },
    Abandoned { ended_at: DateTime<Utc> },
    Unattended { ended_at: Option<DateTime<Utc>> },
}

impl Lifecycle {
    pub fn status(&self) -> SessionStatus {
        match self {
            Lifecycle::Waiting => SessionStatus::Waiting,
            Lifecycle::InAttendance(_) => SessionStatus::InAttendance,
            Lifecycle::Finished { .. } => SessionStatus::Finished,
            Lifecycle::Abandoned { .. } => SessionStatus::Abandoned,
            Lifecycle::Unattended { .. } => SessionStatus::Unattended,
        }
    }

    pub fn attendance(&self) -> Option<&Attendance> {
        match self {
            Lifecycle::InAttendance(attendance) | Lifecycle::Finished { attendance, .. } => Some(attendance),
            _ => None,
        }
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Finished { ended_at, .. } | Lifecycle::Abandoned { ended_at } => Some(*ended_at),
            Lifecycle::Unattended { ended_at } => *ended_at,
            _ => None,
        }
    }

    pub fn apply(&self, event: SessionEvent, now: DateTime<Utc>) -> Result<Lifecycle, InvalidTransition> {
        match (self, event) {
            (Lifecycle::Waiting, SessionEvent::Claim(volunteer_id)) => Ok(Lifecycle::InAttendance(Attendance {
                volunteer_id,
                attended_at: now,
            })),
            (Lifecycle::Waiting, SessionEvent::Cancel | SessionEvent::WaitTimeout) => Ok(Lifecycle::Abandoned { ended_at: now }),
            (Lifecycle::InAttendance(attendance), SessionEvent::End) => Ok(Lifecycle::Finished {
                attendance: *attendance,
                ended_at: now,
            }),
            _ => Err(InvalidTransition { from: self.status(), event }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub country: String,
    pub language: Option<String>,
}

impl Requester {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub requester: Requester,
    pub topic: String,
    pub channel: Channel,
    pub room_id: String,
    pub entered_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        self.lifecycle.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn volunteer_id(&self) -> Option<Uuid> {
        self.lifecycle.attendance().map(|a| a.volunteer_id)
    }

    pub fn attended_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.attendance().map(|a| a.attended_at)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.ended_at()
    }

    pub fn is_owned_by(&self, volunteer_id: &Uuid) -> bool {
        self.volunteer_id().as_ref() == Some(volunteer_id)
    }

    /// Whole minutes between arrival and the claim (or `now` while waiting).
    pub fn wait_minutes(&self, now: DateTime<Utc>) -> i64 {
        whole_minutes(self.attended_at().unwrap_or(now) - self.entered_at)
    }

    /// Whole minutes between the claim and the end (or `now` while attended).
    /// Zero when the session was never attended.
    pub fn duration_minutes(&self, now: DateTime<Utc>) -> i64 {
        match self.attended_at() {
            Some(attended_at) => whole_minutes(self.ended_at().unwrap_or(now) - attended_at),
            None => 0,
        }
    }

    pub fn apply(&self, event: SessionEvent, now: DateTime<Utc>) -> Result<Session, InvalidTransition> {
        Ok(Session {
            lifecycle: self.lifecycle.apply(event, now)?,
            ..self.clone()
        })
    }
}

fn whole_minutes(elapsed: Duration) -> i64 {
    elapsed.num_minutes().max(0)
}

/// Raw `sessions` row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub nombre: String,
    pub apellido: String,
    pub email: Option<String>,
    pub pais: String,
    pub idioma: Option<String>,
    pub tema: String,
    #[sqlx(rename = "type")]
    pub channel: Channel,
    pub sala_jitsi_id: String,
    pub estado: SessionStatus,
    pub voluntario_id: Option<Uuid>,
    pub fecha_ingreso: DateTime<Utc>,
    pub fecha_atencion: Option<DateTime<Utc>>,
    pub fecha_fin: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let attendance = match (row.voluntario_id, row.fecha_atencion) {
            (Some(volunteer_id), Some(attended_at)) => Some(Attendance { volunteer_id, attended_at }),
            (None, None) => None,
            _ => return Err(AppError::invalid_session_row(row.id, "voluntario_id and fecha_atencion must be set together")),
        };

        let lifecycle = match (row.estado, attendance, row.fecha_fin) {
            (SessionStatus::Waiting, None, None) => Lifecycle::Waiting,
            (SessionStatus::InAttendance, Some(attendance), None) => Lifecycle::InAttendance(attendance),
            (SessionStatus::Finished, Some(attendance), Some(ended_at)) => Lifecycle::Finished { attendance, ended_at },
            (SessionStatus::Abandoned, None, Some(ended_at)) => Lifecycle::Abandoned { ended_at },
            (SessionStatus::Unattended, None, ended_at) => Lifecycle::Unattended { ended_at },
            (estado, _, _) => {
                return Err(AppError::invalid_session_row(row.id, format!("inconsistent lifecycle columns for estado '{}'", estado)));
            }
        };

        Ok(Session {
            id: row.id,
            requester: Requester {
                first_name: row.nombre,
                last_name: row.apellido,
                email: row.email,
                country: row.pais,
                language: row.idioma,
            },
            topic: row.tema,
            channel: row.channel,
            room_id: row.sala_jitsi_id,
            entered_at: row.fecha_ingreso,
            lifecycle,
            created_at: row.created_at,
        })
    }
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn validate_optional_email(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() || value.validate_email() {
        Ok(())
    } else {
        Err(ValidationError::new("email"))
    }
}

fn validate_terms(accepted: &bool) -> Result<(), ValidationError> {
    if *accepted {
        Ok(())
    } else {
        Err(ValidationError::new("terms_not_accepted"))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Validate, JsonSchema)]
pub struct SessionRequest {
    #[validate(length(max = 120), custom(function = "validate_not_blank"))]
    pub nombre: String,
    #[validate(length(max = 120), custom(function = "validate_not_blank"))]
    pub apellido: String,
    #[validate(custom(function = "validate_optional_email"))]
    pub email: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    pub pais: String,
    #[schemars(regex(pattern = r"^(es|pt|fr|gn|en)$"))]
    pub idioma: Option<String>,
    #[validate(length(max = 200), custom(function = "validate_not_blank"))]
    pub tema: String,
    #[serde(rename = "type")]
    pub channel: Channel,
    #[serde(default)]
    #[validate(custom(function = "validate_terms"))]
    pub terms: bool,
}

impl SessionRequest {
    /// Empty optional form fields are stored as NULL.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    pub fn idioma(&self) -> Option<&str> {
        self.idioma.as_deref().map(str::trim).filter(|l| !l.is_empty())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct AbandonRequest {
    pub reason: AbandonReason,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub nombre: String,
    pub apellido: String,
    pub email: Option<String>,
    pub pais: String,
    pub idioma: Option<String>,
    pub tema: String,
    #[serde(rename = "type")]
    pub channel: Channel,
    pub sala_jitsi_id: String,
    pub estado: SessionStatus,
    pub voluntario_id: Option<Uuid>,
    pub fecha_ingreso: DateTime<Utc>,
    pub fecha_atencion: Option<DateTime<Utc>>,
    pub fecha_fin: Option<DateTime<Utc>>,
    pub tiempo_espera_minutos: i64,
    pub duracion_conversacion_minutos: i64,
    pub created_at: DateTime<Utc>,
}

impl SessionResponse {
    pub fn at(session: &Session, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id,
            nombre: session.requester.first_name.clone(),
            apellido: session.requester.last_name.clone(),
            email: session.requester.email.clone(),
            pais: session.requester.country.clone(),
            idioma: session.requester.language.clone(),
            tema: session.topic.clone(),
            channel: session.channel,
            sala_jitsi_id: session.room_id.clone(),
            estado: session.status(),
            voluntario_id: session.volunteer_id(),
            fecha_ingreso: session.entered_at,
            fecha_atencion: session.attended_at(),
            fecha_fin: session.ended_at(),
            tiempo_espera_minutos: session.wait_minutes(now),
            duracion_conversacion_minutos: session.duration_minutes(now),
            created_at: session.created_at,
        }
    }

    /// Drops contact details for callers that are not volunteers.
    pub fn redacted(self) -> Self {
        Self { email: None, ..self }
    }
}

/// Body of a successful submission. The token is shown once and proves the
/// caller is the requester on `/end`, `/abandon` and the message endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct SessionCreatedResponse {
    #[serde(flatten)]
    pub session: SessionResponse,
    pub requester_token: String,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        SessionResponse::at(session, Utc::now())
    }
}

impl From<SessionResponse> for SessionRow {
    fn from(response: SessionResponse) -> Self {
        Self {
            id: response.id,
            nombre: response.nombre,
            apellido: response.apellido,
            email: response.email,
            pais: response.pais,
            idioma: response.idioma,
            tema: response.tema,
            channel: response.channel,
            sala_jitsi_id: response.sala_jitsi_id,
            estado: response.estado,
            voluntario_id: response.voluntario_id,
            fecha_ingreso: response.fecha_ingreso,
            fecha_atencion: response.fecha_atencion,
            fecha_fin: response.fecha_fin,
            created_at: response.created_at,
        }
    }
}

impl TryFrom<SessionResponse> for Session {
    type Error = AppError;

    fn try_from(response: SessionResponse) -> Result<Self, Self::Error> {
        Session::try_from(SessionRow::from(response))
    }
}

/// Conferencing room name for a new session: `sala-<slug>-<suffix>`.
pub fn room_id_for(first_name: &str, suffix: &str) -> String {
    let slug: String = first_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        format!("sala-{}", suffix)
    } else {
        format!("sala-{}-{}", slug, suffix)
    }
}
