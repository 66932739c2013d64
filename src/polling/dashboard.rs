use crate::database::HelpDeskRepository;
use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionStatus};
use crate::models::survey::Survey;
use crate::models::volunteer::{Leader, VolunteerResponse, VolunteerStatus};
use crate::polling::{PollHandle, Poller, spawn_poller};
use crate::service::queue::{QueueSnapshot, needs_escalation};
use crate::service::session::{Participant, SessionService};
use crate::service::volunteer::VolunteerService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

const HISTORY_LIMIT: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    QueueChanged(QueueSnapshot),
    ActiveChanged(Vec<Session>),
    RosterChanged(Vec<VolunteerResponse>),
    /// The session open in this dashboard was finished by the other party.
    SessionClosedRemotely(Session),
    EscalationRequired { waiting: usize, leaders: Vec<Leader> },
    HistoryRefreshed(Vec<Survey>),
}

/// Volunteer-side view state, refreshed one tick at a time.
pub struct Dashboard<R> {
    service: SessionService<R>,
    volunteer_id: Uuid,
    nombre: String,
    history_every: u32,
    ticks: u64,
    queue: QueueSnapshot,
    active: Vec<Session>,
    roster: Vec<VolunteerResponse>,
    open_session: Option<Uuid>,
    escalated: bool,
}

impl<R: HelpDeskRepository> Dashboard<R> {
    pub fn new(service: SessionService<R>, volunteer_id: Uuid, nombre: impl Into<String>, history_every: u32) -> Self {
        Self {
            service,
            volunteer_id,
            nombre: nombre.into(),
            history_every: history_every.max(1),
            ticks: 0,
            queue: QueueSnapshot::default(),
            active: Vec::new(),
            roster: Vec::new(),
            open_session: None,
            escalated: false,
        }
    }

    pub fn queue(&self) -> &QueueSnapshot {
        &self.queue
    }

    pub fn open_session(&self) -> Option<Uuid> {
        self.open_session
    }

    /// Refreshes queue, active sessions and roster, and every
    /// `history_every` ticks the survey history. Only changes are reported.
    pub async fn tick(&mut self) -> Result<Vec<DashboardEvent>, AppError> {
        let mut events = Vec::new();

        let sessions = self.service.list(&[SessionStatus::Waiting, SessionStatus::InAttendance]).await?;
        let active: Vec<Session> = sessions.iter().filter(|s| s.status() == SessionStatus::InAttendance).cloned().collect();
        let queue = QueueSnapshot::from_sessions(sessions);

        if queue != self.queue {
            self.queue = queue.clone();
            events.push(DashboardEvent::QueueChanged(queue));
        }
        if active != self.active {
            self.active = active.clone();
            events.push(DashboardEvent::ActiveChanged(active));
        }

        let volunteers = VolunteerService::new(self.service.repository());
        let roster: Vec<VolunteerResponse> = volunteers.roster().await?.iter().map(VolunteerResponse::from).collect();
        let online = roster.iter().filter(|v| v.status == VolunteerStatus::Online).count();
        if roster != self.roster {
            self.roster = roster.clone();
            events.push(DashboardEvent::RosterChanged(roster));
        }

        if let Some(id) = self.open_session {
            match self.service.get(&id).await {
                Ok(session) if session.status() == SessionStatus::Finished => {
                    info!(session_id = %id, volunteer_id = %self.volunteer_id, "open session closed by the other party");
                    self.open_session = None;
                    events.push(DashboardEvent::SessionClosedRemotely(session));
                }
                Ok(_) => {}
                Err(AppError::NotFound(_)) => {
                    warn!(session_id = %id, volunteer_id = %self.volunteer_id, "open session no longer exists, closing view");
                    self.open_session = None;
                }
                Err(err) => return Err(err),
            }
        }

        let waiting = self.queue.waiting.len();
        if needs_escalation(waiting, online) {
            if !self.escalated {
                let leaders = volunteers.leaders().await?;
                info!(waiting, leaders = leaders.len(), "no volunteers online, escalating");
                self.escalated = true;
                events.push(DashboardEvent::EscalationRequired { waiting, leaders });
            }
        } else {
            self.escalated = false;
        }

        if self.ticks % u64::from(self.history_every) == 0 {
            events.push(DashboardEvent::HistoryRefreshed(self.service.recent_surveys(HISTORY_LIMIT).await?));
        }
        self.ticks += 1;

        Ok(events)
    }

    /// Claims a waiting session. Losing the race is not an error: the
    /// session is dropped from the local queue and `None` is returned.
    pub async fn claim(&mut self, id: &Uuid) -> Result<Option<Session>, AppError> {
        let result = self.service.claim(id, &self.volunteer_id).await;
        self.queue.remove(id);

        match result {
            Ok(session) => {
                self.open_session = Some(session.id);
                Ok(Some(session))
            }
            Err(AppError::SessionConflict { current, .. }) => {
                debug!(session_id = %id, current = %current, "session already taken");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Joins an attended session without claiming it.
    pub fn open(&mut self, id: Uuid) {
        self.open_session = Some(id);
    }

    pub fn close_view(&mut self) {
        self.open_session = None;
    }

    /// Finishes the open session if this volunteer owns it, otherwise
    /// leaves the conversation. Either way the view closes.
    pub async fn finish(&mut self) -> Result<Option<Session>, AppError> {
        let Some(id) = self.open_session else {
            return Ok(None);
        };

        let by = Participant::Volunteer {
            id: self.volunteer_id,
            nombre: self.nombre.clone(),
        };
        let session = match self.service.close(&id, &by).await {
            Ok(session) => session,
            Err(AppError::NotSessionOwner(_)) => self.service.leave(&id, &self.volunteer_id, &self.nombre).await?,
            Err(err) => return Err(err),
        };

        self.open_session = None;
        Ok(Some(session))
    }

    /// Starts ticking every `period`. Dropping the returned view stops it.
    pub fn mount(self, period: Duration) -> MountedDashboard<R> {
        let dashboard = Arc::new(Mutex::new(self));
        let (tx, rx) = mpsc::unbounded_channel();
        let poll = spawn_poller(
            DashboardPoll {
                dashboard: Arc::clone(&dashboard),
                events: tx,
            },
            period,
        );

        MountedDashboard {
            dashboard,
            events: rx,
            _poll: poll,
        }
    }
}

struct DashboardPoll<R> {
    dashboard: Arc<Mutex<Dashboard<R>>>,
    events: mpsc::UnboundedSender<DashboardEvent>,
}

#[async_trait::async_trait]
impl<R: HelpDeskRepository> Poller for DashboardPoll<R> {
    fn name(&self) -> &'static str {
        "dashboard"
    }

    async fn poll(&mut self) -> Result<(), AppError> {
        let events = self.dashboard.lock().await.tick().await?;
        for event in events {
            let _ = self.events.send(event);
        }
        Ok(())
    }
}

pub struct MountedDashboard<R> {
    dashboard: Arc<Mutex<Dashboard<R>>>,
    events: mpsc::UnboundedReceiver<DashboardEvent>,
    _poll: PollHandle,
}

impl<R: HelpDeskRepository> MountedDashboard<R> {
    pub async fn next_event(&mut self) -> Option<DashboardEvent> {
        self.events.recv().await
    }

    pub async fn claim(&self, id: &Uuid) -> Result<Option<Session>, AppError> {
        self.dashboard.lock().await.claim(id).await
    }

    pub async fn finish(&self) -> Result<Option<Session>, AppError> {
        self.dashboard.lock().await.finish().await
    }

    pub async fn open_session(&self) -> Option<Uuid> {
        self.dashboard.lock().await.open_session()
    }
}
