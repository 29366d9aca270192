//! Web search tool.
//!
//! Registered only when a search engine adapter is configured. The
//! Google Custom Search adapter is the reference implementation.

use std::sync::Arc;

use serde_json::{json, Value};

use fm_domain::tool::{ToolDefinition, ToolResult};
use fm_domain::{Error, Result};

use crate::{arg_str, Tool};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SearchEngine trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait SearchEngine: Send + Sync {
    /// Search the web. `date_range` is one of `all`, `past_hour`,
    /// `past_day`, `past_week`, `past_month`, `past_year`.
    async fn search(&self, query: &str, date_range: Option<&str>) -> Result<ToolResult>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Google Custom Search adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GoogleSearchEngine {
    api_key: String,
    engine_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleSearchEngine {
    pub fn new(api_key: impl Into<String>, engine_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            base_url: "https://www.googleapis.com/customsearch/v1".into(),
            client: reqwest::Client::new(),
        }
    }

    fn date_restrict(date_range: &str) -> Option<&'static str> {
        match date_range {
            "past_hour" | "past_day" => Some("d1"),
            "past_week" => Some("w1"),
            "past_month" => Some("m1"),
            "past_year" => Some("y1"),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl SearchEngine for GoogleSearchEngine {
    async fn search(&self, query: &str, date_range: Option<&str>) -> Result<ToolResult> {
        let mut params = vec![
            ("key", self.api_key.clone()),
            ("cx", self.engine_id.clone()),
            ("q", query.to_string()),
        ];
        if let Some(restrict) = date_range.and_then(Self::date_restrict) {
            params.push(("dateRestrict", restrict.to_string()));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::Http(format!("search request failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Http(format!("search API error: {e}")))?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("decoding search response: {e}")))?;

        let results: Vec<Value> = data["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        json!({
                            "title": item["title"].as_str().unwrap_or(""),
                            "link": item["link"].as_str().unwrap_or(""),
                            "snippet": item["snippet"].as_str().unwrap_or(""),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ToolResult::ok_with_data(json!({
            "query": query,
            "date_range": date_range,
            "search_info": data.get("searchInformation").cloned().unwrap_or(Value::Null),
            "results": results,
        })))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SearchTool {
    engine: Arc<dyn SearchEngine>,
}

impl SearchTool {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn functions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "info_search_web".into(),
            description: "Search web pages using a search engine. Use for obtaining the \
                          latest information or finding references."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query, 3-5 keywords" },
                    "date_range": {
                        "type": "string",
                        "enum": ["all", "past_hour", "past_day", "past_week", "past_month", "past_year"],
                        "description": "(Optional) Time range filter for search results"
                    }
                },
                "required": ["query"]
            }),
        }]
    }

    async fn invoke(&self, function_name: &str, args: &Value) -> Result<ToolResult> {
        match function_name {
            "info_search_web" => {
                let date_range = args.get("date_range").and_then(Value::as_str);
                self.engine.search(arg_str(args, "query")?, date_range).await
            }
            other => Err(Error::bad_input(format!(
                "unknown search function: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedEngine;

    #[async_trait::async_trait]
    impl SearchEngine for CannedEngine {
        async fn search(&self, query: &str, _date_range: Option<&str>) -> Result<ToolResult> {
            Ok(ToolResult::ok_with_data(json!({
                "query": query,
                "results": [{ "title": "t", "link": "l", "snippet": "s" }],
            })))
        }
    }

    #[tokio::test]
    async fn search_tool_passes_query_through() {
        let tool = SearchTool::new(Arc::new(CannedEngine));
        let result = tool
            .invoke("info_search_web", &json!({ "query": "rust agents" }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["query"], "rust agents");
    }

    #[test]
    fn date_restrict_mapping() {
        assert_eq!(GoogleSearchEngine::date_restrict("past_week"), Some("w1"));
        assert_eq!(GoogleSearchEngine::date_restrict("all"), None);
    }
}
