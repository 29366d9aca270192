//! Built-in tools and the tool registry.
//!
//! A tool is a named capability exposing one or more functions to the
//! LLM via function-calling. The registry exports the combined schema,
//! resolves function names to tools, validates required arguments, and
//! applies the bounded retry policy around invocation.

pub mod browser;
pub mod file;
pub mod message;
pub mod search;
pub mod shell;

pub use browser::BrowserTool;
pub use file::FileTool;
pub use message::MessageTool;
pub use search::{GoogleSearchEngine, SearchEngine, SearchTool};
pub use shell::ShellTool;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use fm_domain::tool::{ToolDefinition, ToolResult};
use fm_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as it appears in tool events (`shell`, `file`, ...).
    fn name(&self) -> &'static str;

    /// The functions this tool exposes, in the shape the LLM's
    /// function-calling protocol expects.
    fn functions(&self) -> Vec<ToolDefinition>;

    fn has_function(&self, function_name: &str) -> bool {
        self.functions().iter().any(|f| f.name == function_name)
    }

    /// Invoke one function. Transport-level failures return `Err` and
    /// are retried by the registry; domain-level failures return
    /// `Ok(ToolResult { success: false, .. })` and are final.
    async fn invoke(&self, function_name: &str, args: &Value) -> Result<ToolResult>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    max_retries: u32,
    retry_interval: Duration,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    fn with_retry(mut self, max_retries: u32, retry_interval: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_interval = retry_interval;
        self
    }

    /// Concatenated function schema across all tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().flat_map(|t| t.functions()).collect()
    }

    /// Resolve a function name to its owning tool.
    pub fn lookup(&self, function_name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.has_function(function_name))
            .cloned()
            .ok_or_else(|| Error::bad_input(format!("unknown function: {function_name}")))
    }

    /// Invoke with required-argument validation and bounded retry.
    ///
    /// Exhausted retries become `ToolResult { success: false }` rather
    /// than an error so the LLM can see the failure and replan.
    pub async fn invoke(
        &self,
        tool: &Arc<dyn Tool>,
        function_name: &str,
        args: &Value,
    ) -> ToolResult {
        if let Some(missing) = self.missing_required(tool, function_name, args) {
            return ToolResult::failure(format!(
                "missing required parameter: {missing}"
            ));
        }

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            match tool.invoke(function_name, args).await {
                Ok(result) => return result,
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        tool = tool.name(),
                        function = function_name,
                        attempt,
                        error = %last_error,
                        "tool invocation failed"
                    );
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_interval).await;
                    }
                }
            }
        }
        ToolResult::failure(last_error)
    }

    fn missing_required(
        &self,
        tool: &Arc<dyn Tool>,
        function_name: &str,
        args: &Value,
    ) -> Option<String> {
        let functions = tool.functions();
        let def = functions.iter().find(|f| f.name == function_name)?;
        def.required_parameters()
            .into_iter()
            .find(|name| args.get(name).map_or(true, Value::is_null))
            .map(str::to_string)
    }
}

// ── Argument helpers shared by the built-in tools ──────────────────

pub(crate) fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::bad_input(format!("missing string argument: {key}")))
}

pub(crate) fn arg_str_or<'a>(args: &'a Value, key: &str, default: &'a str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub(crate) fn arg_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn arg_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

pub(crate) fn arg_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Fails `failures` times, then succeeds.
    struct FlakyTool {
        failures: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn functions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "flaky_op".into(),
                description: "sometimes works".into(),
                parameters: json!({
                    "type": "object",
                    "properties": { "target": { "type": "string" } },
                    "required": ["target"]
                }),
            }]
        }

        async fn invoke(&self, _function_name: &str, _args: &Value) -> Result<ToolResult> {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Http("connection reset".into()));
            }
            Ok(ToolResult::ok())
        }
    }

    fn registry(failures: u32) -> ToolRegistry {
        ToolRegistry::new(vec![Arc::new(FlakyTool {
            failures: Mutex::new(failures),
        })])
        .with_retry(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn lookup_unknown_function_fails() {
        let registry = registry(0);
        let err = match registry.lookup("nope") {
            Err(err) => err,
            Ok(_) => panic!("expected lookup to fail"),
        };
        assert_eq!(err.kind(), fm_domain::ErrorKind::BadInput);
        assert!(registry.lookup("flaky_op").is_ok());
    }

    #[tokio::test]
    async fn invoke_retries_transport_errors() {
        let registry = registry(2);
        let tool = registry.lookup("flaky_op").unwrap();
        let result = registry
            .invoke(&tool, "flaky_op", &json!({ "target": "x" }))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn invoke_exhaustion_returns_failure_result() {
        let registry = registry(10);
        let tool = registry.lookup("flaky_op").unwrap();
        let result = registry
            .invoke(&tool, "flaky_op", &json!({ "target": "x" }))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn missing_required_argument_fails_without_retry() {
        let registry = registry(0);
        let tool = registry.lookup("flaky_op").unwrap();
        let result = registry.invoke(&tool, "flaky_op", &json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("target"));
    }

    #[tokio::test]
    async fn definitions_concatenate_all_tools() {
        let registry = ToolRegistry::new(vec![
            Arc::new(FlakyTool {
                failures: Mutex::new(0),
            }),
            Arc::new(MessageTool::new()),
        ]);
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert!(names.contains(&"flaky_op".to_string()));
        assert!(names.contains(&"message_notify_user".to_string()));
        assert!(names.contains(&"message_ask_user".to_string()));
    }
}
