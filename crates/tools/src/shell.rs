//! Shell tool: command execution inside the session sandbox.

use std::sync::Arc;

use serde_json::{json, Value};

use fm_domain::tool::{ToolDefinition, ToolResult};
use fm_domain::{Error, Result};
use fm_sandbox::Sandbox;

use crate::{arg_bool, arg_str, arg_str_or, arg_u64, Tool};

pub struct ShellTool {
    sandbox: Arc<dyn Sandbox>,
}

impl ShellTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait::async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn functions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "shell_exec".into(),
                description: "Execute commands in a specified shell session. Use for running \
                              code, installing packages, or managing files."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Unique identifier of the target shell session" },
                        "exec_dir": { "type": "string", "description": "Working directory for command execution (absolute path)" },
                        "command": { "type": "string", "description": "Shell command to execute" }
                    },
                    "required": ["id", "exec_dir", "command"]
                }),
            },
            ToolDefinition {
                name: "shell_view".into(),
                description: "View the content of a specified shell session. Use for checking \
                              command execution results or monitoring output."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Unique identifier of the target shell session" }
                    },
                    "required": ["id"]
                }),
            },
            ToolDefinition {
                name: "shell_wait".into(),
                description: "Wait for the running process in a specified shell session to \
                              return. Use after running commands that take a while."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Unique identifier of the target shell session" },
                        "seconds": { "type": "integer", "description": "Wait duration in seconds" }
                    },
                    "required": ["id"]
                }),
            },
            ToolDefinition {
                name: "shell_write_to_process".into(),
                description: "Write input to a running process in a specified shell session. \
                              Use for responding to interactive prompts."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Unique identifier of the target shell session" },
                        "input": { "type": "string", "description": "Input content to write to the process" },
                        "press_enter": { "type": "boolean", "description": "Whether to press Enter after input" }
                    },
                    "required": ["id", "input"]
                }),
            },
            ToolDefinition {
                name: "shell_kill_process".into(),
                description: "Terminate a running process in a specified shell session."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Unique identifier of the target shell session" }
                    },
                    "required": ["id"]
                }),
            },
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> Result<ToolResult> {
        match function_name {
            "shell_exec" => {
                self.sandbox
                    .exec_shell(
                        arg_str(args, "id")?,
                        arg_str_or(args, "exec_dir", "/home/user"),
                        arg_str(args, "command")?,
                    )
                    .await
            }
            "shell_view" => self.sandbox.view_shell(arg_str(args, "id")?).await,
            "shell_wait" => {
                self.sandbox
                    .wait_shell(arg_str(args, "id")?, arg_u64(args, "seconds"))
                    .await
            }
            "shell_write_to_process" => {
                self.sandbox
                    .write_to_shell(
                        arg_str(args, "id")?,
                        arg_str(args, "input")?,
                        arg_bool(args, "press_enter", true),
                    )
                    .await
            }
            "shell_kill_process" => self.sandbox.kill_shell(arg_str(args, "id")?).await,
            other => Err(Error::bad_input(format!("unknown shell function: {other}"))),
        }
    }
}
