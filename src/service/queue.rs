use crate::models::session::{Channel, Session, SessionStatus};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::collections::HashSet;
use uuid::Uuid;

/// Waiting counts by channel, as shown on the extension badge.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
pub struct QueueCounts {
    pub chat: usize,
    pub video: usize,
    pub total: usize,
}

/// The waiting queue at one point in time, oldest arrival first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub waiting: Vec<Session>,
}

impl QueueSnapshot {
    pub fn from_sessions(sessions: impl IntoIterator<Item = Session>) -> Self {
        let mut waiting: Vec<Session> = sessions.into_iter().filter(|s| s.status() == SessionStatus::Waiting).collect();
        waiting.sort_by_key(|s| s.entered_at);
        Self { waiting }
    }

    pub fn ids(&self) -> HashSet<Uuid> {
        self.waiting.iter().map(|s| s.id).collect()
    }

    pub fn counts(&self) -> QueueCounts {
        let chat = self.waiting.iter().filter(|s| s.channel == Channel::Chat).count();
        QueueCounts {
            chat,
            video: self.waiting.len() - chat,
            total: self.waiting.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn remove(&mut self, id: &Uuid) {
        self.waiting.retain(|s| &s.id != id);
    }
}

/// Leaders must be alerted when people wait and nobody is online.
pub fn needs_escalation(waiting: usize, online: usize) -> bool {
    waiting > 0 && online == 0
}
