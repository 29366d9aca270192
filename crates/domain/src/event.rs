use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::{Plan, Step};
use crate::tool::ToolResult;

/// Plan event status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Created,
    Updated,
    Completed,
}

/// Step event status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Failed,
    Completed,
}

/// Tool event status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Calling,
    Called,
}

/// Role of a `message` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// The tagged payload of an agent event. The serde shape is the wire
/// shape: SSE frames, the outbox, and persisted session events all use
/// this serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    Message {
        role: MessageRole,
        content: String,
    },
    Title {
        title: String,
    },
    Plan {
        status: PlanStatus,
        plan: Plan,
    },
    Step {
        status: StepStatus,
        step: Step,
    },
    Tool {
        tool_call_id: String,
        tool_name: String,
        function_name: String,
        function_args: Value,
        status: ToolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function_result: Option<ToolResult>,
        /// Enriched display content attached by the task runner
        /// (console snapshot, file content, search results).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_content: Option<Value>,
    },
    Error {
        error: String,
    },
    Wait {},
    Done {},
}

/// A typed event with the stream-assigned id and timestamp.
///
/// `event_id` is 0 until the task runner appends the event to the
/// session's outbox; downstream persistence preserves the assigned id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    #[serde(default)]
    pub event_id: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl AgentEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            event_id: 0,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// The SSE event name for this payload.
    pub fn name(&self) -> &'static str {
        match self.payload {
            EventPayload::Message { .. } => "message",
            EventPayload::Title { .. } => "title",
            EventPayload::Plan { .. } => "plan",
            EventPayload::Step { .. } => "step",
            EventPayload::Tool { .. } => "tool",
            EventPayload::Error { .. } => "error",
            EventPayload::Wait {} => "wait",
            EventPayload::Done {} => "done",
        }
    }

    /// Terminal events end a `chat` subscription: the flow finished,
    /// failed, or parked on user input.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::Done {} | EventPayload::Error { .. } | EventPayload::Wait {}
        )
    }

    // ── Constructors for the common variants ───────────────────────

    pub fn message(role: MessageRole, content: impl Into<String>) -> Self {
        Self::new(EventPayload::Message {
            role,
            content: content.into(),
        })
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self::new(EventPayload::Title {
            title: title.into(),
        })
    }

    pub fn plan(status: PlanStatus, plan: Plan) -> Self {
        Self::new(EventPayload::Plan { status, plan })
    }

    pub fn step(status: StepStatus, step: Step) -> Self {
        Self::new(EventPayload::Step { status, step })
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::new(EventPayload::Error {
            error: error.into(),
        })
    }

    pub fn wait() -> Self {
        Self::new(EventPayload::Wait {})
    }

    pub fn done() -> Self {
        Self::new(EventPayload::Done {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ExecutionStatus;

    #[test]
    fn events_round_trip_through_json() {
        let events = vec![
            AgentEvent::message(MessageRole::Assistant, "hello"),
            AgentEvent::title("My task"),
            AgentEvent::plan(
                PlanStatus::Created,
                Plan::new("g", "t", "m", vec![Step::new("1", "do it")]),
            ),
            AgentEvent::step(StepStatus::Started, Step::new("1", "do it")),
            AgentEvent::new(EventPayload::Tool {
                tool_call_id: "call_1".into(),
                tool_name: "file".into(),
                function_name: "file_write".into(),
                function_args: serde_json::json!({"file": "/tmp/hello.txt"}),
                status: ToolStatus::Called,
                function_result: Some(ToolResult::ok()),
                tool_content: Some(serde_json::json!({"content": "hi"})),
            }),
            AgentEvent::error("boom"),
            AgentEvent::wait(),
            AgentEvent::done(),
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: AgentEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event, "round trip failed for {}", event.name());
        }
    }

    #[test]
    fn serialized_form_is_internally_tagged() {
        let event = AgentEvent::message(MessageRole::User, "hi");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn terminal_classification() {
        assert!(AgentEvent::done().is_terminal());
        assert!(AgentEvent::wait().is_terminal());
        assert!(AgentEvent::error("x").is_terminal());
        assert!(!AgentEvent::title("t").is_terminal());
    }

    #[test]
    fn step_snapshot_carries_status() {
        let mut step = Step::new("1", "d");
        step.status = ExecutionStatus::Running;
        let json = serde_json::to_value(AgentEvent::step(StepStatus::Started, step)).unwrap();
        assert_eq!(json["status"], "started");
        assert_eq!(json["step"]["status"], "running");
    }
}
