//! Session registry derived from event activity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{Event, EventKind};

/// Live view of one agent session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Working directory reported at session start.
    #[serde(rename = "cwd")]
    pub working_context: String,
    pub event_count: u64,
}

/// What an event did to the registry.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionChange {
    Started(Session),
    Ended(String),
    Touched,
    Unchanged,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an appended event. This is the only mutation path.
    ///
    /// A session start for a known id replaces the old entry. Events for ids
    /// that were never started leave the registry untouched.
    pub fn upsert_from_event(&mut self, event: &Event) -> SessionChange {
        let Some(session_id) = event.session_id.as_deref() else {
            return SessionChange::Unchanged;
        };

        match event.kind {
            EventKind::SessionStart => {
                let session = Session {
                    id: session_id.to_string(),
                    started_at: event.timestamp,
                    last_activity: event.timestamp,
                    working_context: event.working_context().unwrap_or("unknown").to_string(),
                    event_count: 1,
                };
                let _ = self.sessions.insert(session_id.to_string(), session.clone());
                SessionChange::Started(session)
            }
            EventKind::SessionEnd => {
                let _ = self.sessions.remove(session_id);
                SessionChange::Ended(session_id.to_string())
            }
            _ => match self.sessions.get_mut(session_id) {
                Some(session) => {
                    session.last_activity = event.timestamp;
                    session.event_count += 1;
                    SessionChange::Touched
                }
                None => SessionChange::Unchanged,
            },
        }
    }

    /// All sessions, oldest first.
    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
