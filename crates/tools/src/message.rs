//! Message tool: the agent's channel back to the user.
//!
//! Both functions are no-ops at this layer; the executor intercepts
//! their tool events. `message_ask_user` is the suspension signal that
//! parks the session in WAITING.

use serde_json::{json, Value};

use fm_domain::tool::{ToolDefinition, ToolResult};
use fm_domain::{Error, Result};

use crate::Tool;

pub const NOTIFY_USER: &str = "message_notify_user";
pub const ASK_USER: &str = "message_ask_user";

pub struct MessageTool;

impl MessageTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MessageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &'static str {
        "message"
    }

    fn functions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: NOTIFY_USER.into(),
                description: "Send a message to user without requiring a response. Use for \
                              acknowledging receipt of messages, providing progress updates, \
                              reporting task completion, or explaining changes in approach."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "Message text to display to user" }
                    },
                    "required": ["text"]
                }),
            },
            ToolDefinition {
                name: ASK_USER.into(),
                description: "Ask user a question and wait for response. Use for requesting \
                              clarification, asking for confirmation, or gathering additional \
                              information."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "Question text to present to user" },
                        "attachments": {
                            "anyOf": [
                                { "type": "string" },
                                { "items": { "type": "string" }, "type": "array" }
                            ],
                            "description": "(Optional) List of question-related files or reference materials"
                        },
                        "suggest_user_takeover": {
                            "type": "string",
                            "enum": ["none", "browser"],
                            "description": "(Optional) Suggested operation for user takeover"
                        }
                    },
                    "required": ["text"]
                }),
            },
        ]
    }

    async fn invoke(&self, function_name: &str, _args: &Value) -> Result<ToolResult> {
        match function_name {
            NOTIFY_USER | ASK_USER => Ok(ToolResult::ok()),
            other => Err(Error::bad_input(format!(
                "unknown message function: {other}"
            ))),
        }
    }
}
