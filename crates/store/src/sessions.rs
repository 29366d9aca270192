//! Session store.
//!
//! Persists sessions in `sessions.json` under the state path. The
//! in-memory map is the source of truth; `flush()` snapshots it to
//! disk. Event lists are append-only and keep their stream-assigned
//! ids.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use fm_domain::event::AgentEvent;
use fm_domain::session::{Session, SessionStatus};
use fm_domain::{Error, Result};

pub struct SessionStore {
    sessions_path: PathBuf,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Load or create the session store at `state_path/sessions.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;

        let sessions_path = state_path.join("sessions.json");
        let sessions = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %sessions_path.display(),
            "session store loaded"
        );

        Ok(Self {
            sessions_path,
            sessions: RwLock::new(sessions),
        })
    }

    pub fn save(&self, session: Session) {
        let mut sessions = self.sessions.write();
        sessions.insert(session.id.clone(), session);
    }

    pub fn find(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().get(session_id).cloned()
    }

    /// All sessions, most recently updated first.
    pub fn get_all(&self) -> Vec<Session> {
        let mut all: Vec<Session> = self.sessions.read().values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all
    }

    pub fn delete(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }

    fn with_session<R>(
        &self,
        session_id: &str,
        mutate: impl FnOnce(&mut Session) -> R,
    ) -> Result<R> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::not_found(format!("session not found: {session_id}")))?;
        let result = mutate(session);
        session.updated_at = Utc::now();
        Ok(result)
    }

    pub fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        self.with_session(session_id, |s| s.status = status)
    }

    pub fn update_title(&self, session_id: &str, title: &str) -> Result<()> {
        self.with_session(session_id, |s| s.title = Some(title.to_string()))
    }

    pub fn update_latest_message(
        &self,
        session_id: &str,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.with_session(session_id, |s| {
            s.latest_message = Some(message.to_string());
            s.latest_message_at = Some(timestamp);
        })
    }

    /// Append an event, keeping the stream-assigned id.
    pub fn add_event(&self, session_id: &str, event: AgentEvent) -> Result<()> {
        self.with_session(session_id, |s| s.events.push(event))
    }

    pub fn increment_unread(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, |s| s.unread_message_count += 1)
    }

    pub fn reset_unread(&self, session_id: &str) -> Result<()> {
        self.with_session(session_id, |s| s.unread_message_count = 0)
    }

    /// Bind (or clear) the live worker task id.
    pub fn bind_task(&self, session_id: &str, task_id: Option<String>) -> Result<()> {
        self.with_session(session_id, |s| s.task_id = task_id)
    }

    pub fn bind_sandbox(&self, session_id: &str, sandbox_id: &str) -> Result<()> {
        self.with_session(session_id, |s| s.sandbox_id = Some(sandbox_id.to_string()))
    }

    /// Snapshot the current state to disk.
    pub fn flush(&self) -> Result<()> {
        let sessions = self.sessions.read();
        let json = serde_json::to_string_pretty(&*sessions)
            .map_err(|e| Error::Other(format!("serializing sessions: {e}")))?;
        std::fs::write(&self.sessions_path, json).map_err(Error::Io)?;
        Ok(())
    }
}
