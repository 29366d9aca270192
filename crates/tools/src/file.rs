//! File tool: file operations inside the session sandbox.

use std::sync::Arc;

use serde_json::{json, Value};

use fm_domain::tool::{ToolDefinition, ToolResult};
use fm_domain::{Error, Result};
use fm_sandbox::Sandbox;

use crate::{arg_bool, arg_i64, arg_str, arg_str_or, Tool};

pub struct FileTool {
    sandbox: Arc<dyn Sandbox>,
}

impl FileTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait::async_trait]
impl Tool for FileTool {
    fn name(&self) -> &'static str {
        "file"
    }

    fn functions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "file_read".into(),
                description: "Read file content. Use for checking file contents, analyzing \
                              logs, or reading configuration files."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "file": { "type": "string", "description": "Absolute path of the file to read" },
                        "start_line": { "type": "integer", "description": "(Optional) Starting line to read from, 0-based" },
                        "end_line": { "type": "integer", "description": "(Optional) Ending line number (exclusive)" }
                    },
                    "required": ["file"]
                }),
            },
            ToolDefinition {
                name: "file_write".into(),
                description: "Overwrite or append content to a file. Use for creating new \
                              files, appending content, or modifying existing files."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "file": { "type": "string", "description": "Absolute path of the file to write to" },
                        "content": { "type": "string", "description": "Text content to write" },
                        "append": { "type": "boolean", "description": "(Optional) Whether to use append mode" }
                    },
                    "required": ["file", "content"]
                }),
            },
            ToolDefinition {
                name: "file_str_replace".into(),
                description: "Replace specified string in a file. Use for updating specific \
                              content or fixing errors in code."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "file": { "type": "string", "description": "Absolute path of the file to perform replacement on" },
                        "old_str": { "type": "string", "description": "Original string to be replaced" },
                        "new_str": { "type": "string", "description": "New string to replace with" }
                    },
                    "required": ["file", "old_str", "new_str"]
                }),
            },
            ToolDefinition {
                name: "file_find_in_content".into(),
                description: "Search for matching text within file content. Use for finding \
                              specific content or patterns."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "file": { "type": "string", "description": "Absolute path of the file to search within" },
                        "regex": { "type": "string", "description": "Regular expression pattern to match" }
                    },
                    "required": ["file", "regex"]
                }),
            },
            ToolDefinition {
                name: "file_find_by_name".into(),
                description: "Find files by name pattern in a specified directory."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Absolute path of the directory to search" },
                        "glob": { "type": "string", "description": "Filename pattern using glob syntax wildcards" }
                    },
                    "required": ["path", "glob"]
                }),
            },
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> Result<ToolResult> {
        match function_name {
            "file_read" => {
                self.sandbox
                    .file_read(
                        arg_str(args, "file")?,
                        arg_i64(args, "start_line"),
                        arg_i64(args, "end_line"),
                    )
                    .await
            }
            "file_write" => {
                self.sandbox
                    .file_write(
                        arg_str(args, "file")?,
                        arg_str(args, "content")?,
                        arg_bool(args, "append", false),
                    )
                    .await
            }
            "file_str_replace" => {
                self.sandbox
                    .file_replace(
                        arg_str(args, "file")?,
                        arg_str(args, "old_str")?,
                        arg_str(args, "new_str")?,
                    )
                    .await
            }
            "file_find_in_content" => {
                self.sandbox
                    .file_search(arg_str(args, "file")?, arg_str(args, "regex")?)
                    .await
            }
            "file_find_by_name" => {
                self.sandbox
                    .file_find(arg_str(args, "path")?, arg_str_or(args, "glob", "*"))
                    .await
            }
            other => Err(Error::bad_input(format!("unknown file function: {other}"))),
        }
    }
}
