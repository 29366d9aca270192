use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a tool invocation, fed back to the LLM verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn ok_with_data(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// A single callable function exposed to the LLM, in the shape the
/// function-calling protocol expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the function's parameters, including `required`.
    pub parameters: Value,
}

impl ToolDefinition {
    /// The names listed in the schema's `required` array.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_parameters_read_from_schema() {
        let def = ToolDefinition {
            name: "file_write".into(),
            description: "Write a file".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["file", "content"]
            }),
        };
        assert_eq!(def.required_parameters(), vec!["file", "content"]);
    }

    #[test]
    fn required_parameters_empty_when_absent() {
        let def = ToolDefinition {
            name: "noop".into(),
            description: String::new(),
            parameters: json!({ "type": "object", "properties": {} }),
        };
        assert!(def.required_parameters().is_empty());
    }

    #[test]
    fn failure_result_serializes_error_only() {
        let json = serde_json::to_value(ToolResult::failure("boom")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("message").is_none());
        assert!(json.get("data").is_none());
    }
}
