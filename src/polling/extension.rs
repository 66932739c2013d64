use crate::database::HelpDeskRepository;
use crate::error::app_error::AppError;
use crate::models::session::{Channel, Session};
use crate::polling::Poller;
use crate::polling::storage::ClientStorage;
use crate::service::queue::{QueueCounts, QueueSnapshot};
use crate::service::session::SessionService;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const BADGE_COLOR: &str = "#8CB83E";

const NOTIFICATION_TITLE: &str = "Nueva solicitud de ayuda";

/// Where the watcher reads the waiting queue from.
#[async_trait::async_trait]
pub trait QueueSource: Send + Sync {
    async fn waiting(&self) -> Result<Vec<Session>, AppError>;
}

#[async_trait::async_trait]
impl<R: HelpDeskRepository> QueueSource for SessionService<R> {
    async fn waiting(&self) -> Result<Vec<Session>, AppError> {
        self.queue().await
    }
}

/// Desktop notification surface.
pub trait Notifier: Send + Sync {
    fn notify(&self, id: &str, title: &str, message: &str);
    fn clear(&self, id: &str);
    fn set_badge(&self, text: &str, color: &str);
    fn play_sound(&self);
}

/// Emits notifications as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, id: &str, title: &str, message: &str) {
        info!(target: "notifier", notification_id = id, title, message, "notification");
    }

    fn clear(&self, id: &str) {
        debug!(target: "notifier", notification_id = id, "notification cleared");
    }

    fn set_badge(&self, text: &str, color: &str) {
        debug!(target: "notifier", badge = text, color, "badge updated");
    }

    fn play_sound(&self) {
        info!(target: "notifier", "alert sound");
    }
}

pub fn notification_id(session_id: &Uuid) -> String {
    format!("session_{}", session_id)
}

fn notification_message(session: &Session) -> String {
    let channel = match session.channel {
        Channel::Video => "videollamada",
        Channel::Chat => "chat",
    };
    format!("{} ({}): {}", session.requester.display_name(), channel, session.topic)
}

fn badge_text(counts: &QueueCounts) -> String {
    if counts.total == 0 { String::new() } else { counts.total.to_string() }
}

/// Background queue watcher for volunteers who are not looking at the dashboard.
pub struct QueueWatcher<S, N, C> {
    source: S,
    notifier: N,
    storage: C,
    seen: HashSet<Uuid>,
}

impl<S: QueueSource, N: Notifier, C: ClientStorage> QueueWatcher<S, N, C> {
    pub fn new(source: S, notifier: N, storage: C) -> Self {
        Self {
            source,
            notifier,
            storage,
            seen: HashSet::new(),
        }
    }

    pub fn storage(&self) -> &C {
        &self.storage
    }

    /// One poll. Returns the ids that were announced.
    pub async fn tick(&mut self) -> Result<Vec<Uuid>, AppError> {
        if !self.storage.load()?.can_watch_queue() {
            self.notifier.set_badge("", BADGE_COLOR);
            self.seen.clear();
            return Ok(Vec::new());
        }

        let snapshot = QueueSnapshot::from_sessions(self.source.waiting().await?);
        let current = snapshot.ids();

        let fresh: Vec<&Session> = snapshot.waiting.iter().filter(|s| !self.seen.contains(&s.id)).collect();
        for session in &fresh {
            self.notifier
                .notify(&notification_id(&session.id), NOTIFICATION_TITLE, &notification_message(session));
        }
        if !fresh.is_empty() {
            self.notifier.play_sound();
        }
        for gone in self.seen.difference(&current) {
            self.notifier.clear(&notification_id(gone));
        }

        let announced: Vec<Uuid> = fresh.iter().map(|s| s.id).collect();
        self.seen = current;

        let counts = snapshot.counts();
        self.notifier.set_badge(&badge_text(&counts), BADGE_COLOR);
        // Notifications already went out; a failed write only leaves stale counts.
        if let Err(err) = self.storage.update(|state| state.queue_counts = counts) {
            warn!(error = %err, "failed to persist queue counts");
        }

        if !announced.is_empty() {
            info!(new = announced.len(), waiting = counts.total, "new sessions waiting");
        }
        Ok(announced)
    }
}

#[async_trait::async_trait]
impl<S, N, C> Poller for QueueWatcher<S, N, C>
where
    S: QueueSource + 'static,
    N: Notifier + 'static,
    C: ClientStorage + 'static,
{
    fn name(&self) -> &'static str {
        "queue-watcher"
    }

    async fn poll(&mut self) -> Result<(), AppError> {
        self.tick().await.map(|_| ())
    }
}
