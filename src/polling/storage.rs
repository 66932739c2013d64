use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionRequest};
use crate::service::queue::QueueCounts;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Last values typed into the request form.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RequesterPrefill {
    pub nombre: String,
    pub apellido: String,
    pub email: Option<String>,
    pub pais: String,
}

impl From<&SessionRequest> for RequesterPrefill {
    fn from(request: &SessionRequest) -> Self {
        Self {
            nombre: request.nombre.trim().to_string(),
            apellido: request.apellido.trim().to_string(),
            email: request.email().map(str::to_string),
            pais: request.pais.trim().to_string(),
        }
    }
}

impl From<&Session> for RequesterPrefill {
    fn from(session: &Session) -> Self {
        Self {
            nombre: session.requester.first_name.clone(),
            apellido: session.requester.last_name.clone(),
            email: session.requester.email.clone(),
            pais: session.requester.country.clone(),
        }
    }
}

/// Volunteer identity saved by the extension.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MissionaryIdentity {
    pub id: Uuid,
    pub nombre: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StoredState {
    pub active_session: Option<Uuid>,
    pub prefill: Option<RequesterPrefill>,
    pub language: Option<String>,
    pub missionary: Option<MissionaryIdentity>,
    pub available: bool,
    pub queue_counts: QueueCounts,
}

impl StoredState {
    /// The extension only polls for a saved volunteer who switched availability on.
    pub fn can_watch_queue(&self) -> bool {
        self.available && self.missionary.is_some()
    }
}

/// Persistent key/value storage on the client machine.
pub trait ClientStorage: Send + Sync {
    fn load(&self) -> Result<StoredState, AppError>;
    fn save(&self, state: &StoredState) -> Result<(), AppError>;

    fn update<F>(&self, change: F) -> Result<StoredState, AppError>
    where
        F: FnOnce(&mut StoredState),
        Self: Sized,
    {
        let mut state = self.load()?;
        change(&mut state);
        self.save(&state)?;
        Ok(state)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<StoredState>,
}

impl MemoryStorage {
    pub fn new(state: StoredState) -> Self {
        Self { state: Mutex::new(state) }
    }

    fn poisoned() -> AppError {
        AppError::storage("storage lock poisoned", std::io::Error::other("poisoned"))
    }
}

impl ClientStorage for MemoryStorage {
    fn load(&self) -> Result<StoredState, AppError> {
        self.state.lock().map(|state| state.clone()).map_err(|_| Self::poisoned())
    }

    fn save(&self, state: &StoredState) -> Result<(), AppError> {
        *self.state.lock().map_err(|_| Self::poisoned())? = state.clone();
        Ok(())
    }
}

/// Stores the state as one JSON document. A missing file reads as empty state.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClientStorage for JsonFileStorage {
    fn load(&self) -> Result<StoredState, AppError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(StoredState::default()),
            Err(err) => return Err(AppError::storage(format!("reading {}", self.path.display()), err)),
        };

        serde_json::from_str(&raw).map_err(|e| AppError::storage(format!("parsing {}", self.path.display()), std::io::Error::other(e)))
    }

    fn save(&self, state: &StoredState) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(state).map_err(|e| AppError::storage("serializing client state", std::io::Error::other(e)))?;

        // Write then rename so readers never see half a document.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| AppError::storage(format!("writing {}", tmp.display()), e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| AppError::storage(format!("replacing {}", self.path.display()), e))?;
        Ok(())
    }
}
