use serde::{Deserialize, Serialize};

/// Execution status shared by plans and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// A single step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: ExecutionStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// Done means the step will not be executed again: completed or failed.
    pub fn is_done(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed
        )
    }
}

/// A linear plan produced by the planner role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub goal: String,
    pub title: String,
    /// Greeting message shown to the user when the plan is created.
    pub message: String,
    #[serde(default)]
    pub todo: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub status: ExecutionStatus,
}

impl Plan {
    pub fn new(
        goal: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        steps: Vec<Step>,
    ) -> Self {
        Self {
            goal: goal.into(),
            title: title.into(),
            message: message.into(),
            todo: String::new(),
            steps,
            status: ExecutionStatus::Pending,
        }
    }

    /// Index of the first step that is neither completed nor failed.
    ///
    /// Failed steps are never retried here; only a plan update may
    /// re-introduce them.
    pub fn next_pending_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.is_done())
    }

    /// Replace every not-yet-done step with `new_steps`, preserving the
    /// done prefix verbatim. No-op when every step is done.
    pub fn replace_pending_tail(&mut self, new_steps: Vec<Step>) {
        if let Some(first_pending) = self.next_pending_index() {
            self.steps.truncate(first_pending);
            self.steps.extend(new_steps);
        }
    }
}
