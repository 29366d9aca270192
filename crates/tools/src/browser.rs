//! Browser tool: drives the sandbox-hosted browser.
//!
//! Every function maps onto a sandbox browser action endpoint; the
//! function name minus the `browser_` prefix is the action name.

use std::sync::Arc;

use serde_json::{json, Value};

use fm_domain::tool::{ToolDefinition, ToolResult};
use fm_domain::{Error, Result};
use fm_sandbox::Sandbox;

use crate::Tool;

pub struct BrowserTool {
    sandbox: Arc<dyn Sandbox>,
}

impl BrowserTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait::async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn functions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "browser_navigate".into(),
                description: "Navigate the browser to a specified URL.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "Complete URL to visit, including protocol" }
                    },
                    "required": ["url"]
                }),
            },
            ToolDefinition {
                name: "browser_restart".into(),
                description: "Restart the browser and navigate to a specified URL. Use when \
                              the browser state needs to be reset."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "Complete URL to visit after restart" }
                    },
                    "required": ["url"]
                }),
            },
            ToolDefinition {
                name: "browser_click".into(),
                description: "Click on an element in the current page.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer", "description": "(Optional) Index of the element to click" },
                        "coordinate_x": { "type": "number", "description": "(Optional) Horizontal click coordinate" },
                        "coordinate_y": { "type": "number", "description": "(Optional) Vertical click coordinate" }
                    },
                    "required": []
                }),
            },
            ToolDefinition {
                name: "browser_input".into(),
                description: "Type text into an editable element on the current page."
                    .into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer", "description": "(Optional) Index of the element to type into" },
                        "text": { "type": "string", "description": "Text to type" },
                        "press_enter": { "type": "boolean", "description": "Whether to press Enter after typing" }
                    },
                    "required": ["text"]
                }),
            },
            ToolDefinition {
                name: "browser_press_key".into(),
                description: "Simulate a key press in the current page.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "key": { "type": "string", "description": "Key name (e.g. Enter, Tab, ArrowUp)" }
                    },
                    "required": ["key"]
                }),
            },
            ToolDefinition {
                name: "browser_scroll_up".into(),
                description: "Scroll the current page up.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "to_top": { "type": "boolean", "description": "(Optional) Scroll straight to the top" }
                    },
                    "required": []
                }),
            },
            ToolDefinition {
                name: "browser_scroll_down".into(),
                description: "Scroll the current page down.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "to_bottom": { "type": "boolean", "description": "(Optional) Scroll straight to the bottom" }
                    },
                    "required": []
                }),
            },
            ToolDefinition {
                name: "browser_console_exec".into(),
                description: "Execute JavaScript in the browser console.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "javascript": { "type": "string", "description": "JavaScript code to execute" }
                    },
                    "required": ["javascript"]
                }),
            },
            ToolDefinition {
                name: "browser_console_view".into(),
                description: "View the browser console output.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "max_lines": { "type": "integer", "description": "(Optional) Maximum number of log lines to return" }
                    },
                    "required": []
                }),
            },
        ]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> Result<ToolResult> {
        let action = function_name
            .strip_prefix("browser_")
            .ok_or_else(|| Error::bad_input(format!("unknown browser function: {function_name}")))?;
        if !self.has_function(function_name) {
            return Err(Error::bad_input(format!(
                "unknown browser function: {function_name}"
            )));
        }
        self.sandbox.browser_invoke(action, args).await
    }
}
