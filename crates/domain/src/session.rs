use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AgentEvent, EventPayload};
use crate::plan::Plan;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Pending,
    Running,
    Waiting,
    Completed,
}

/// A durable conversation plus its worker binding. Aggregate root of
/// the event list; owns the sandbox reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_id: String,
    /// Set on first run; the sandbox is reused for the session's lifetime.
    #[serde(default)]
    pub sandbox_id: Option<String>,
    /// Set while a worker task is live. At most one at a time.
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub unread_message_count: u32,
    #[serde(default)]
    pub latest_message: Option<String>,
    #[serde(default)]
    pub latest_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only, ordered by stream-assigned event id.
    #[serde(default)]
    pub events: Vec<AgentEvent>,
    #[serde(default)]
    pub status: SessionStatus,
}

impl Session {
    pub fn new(agent_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::short_id(),
            agent_id: agent_id.into(),
            sandbox_id: None,
            task_id: None,
            title: None,
            unread_message_count: 0,
            latest_message: None,
            latest_message_at: Some(now),
            created_at: now,
            updated_at: now,
            events: Vec::new(),
            status: SessionStatus::Pending,
        }
    }

    /// The most recent plan snapshot, reconstructed from the event list.
    pub fn last_plan(&self) -> Option<Plan> {
        self.events.iter().rev().find_map(|e| match &e.payload {
            EventPayload::Plan { plan, .. } => Some(plan.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PlanStatus;
    use crate::plan::Step;

    #[test]
    fn new_session_is_pending() {
        let session = Session::new("agent1");
        assert_eq!(session.status, SessionStatus::Pending);
        assert!(session.task_id.is_none());
        assert!(session.events.is_empty());
    }

    #[test]
    fn last_plan_finds_most_recent_snapshot() {
        let mut session = Session::new("agent1");
        assert!(session.last_plan().is_none());

        let first = Plan::new("g1", "t1", "m", vec![Step::new("1", "a")]);
        let second = Plan::new("g2", "t2", "m", vec![Step::new("1", "b")]);
        session
            .events
            .push(AgentEvent::plan(PlanStatus::Created, first));
        session.events.push(AgentEvent::message(
            crate::event::MessageRole::Assistant,
            "working",
        ));
        session
            .events
            .push(AgentEvent::plan(PlanStatus::Updated, second.clone()));

        assert_eq!(session.last_plan(), Some(second));
    }
}
