//! Resilient decoding of LLM-generated JSON.
//!
//! Models wrap JSON in code fences, prepend prose, use single quotes,
//! leave trailing commas, and forget to escape quotes. The parser runs
//! a strategy chain, first success wins:
//!
//! 1. strict parse of the raw string
//! 2. extract the first fenced code block and parse it
//! 3. clean common malformations and parse
//! 4. ask the LLM to repair the JSON and parse its answer
//!
//! Callers without a default value get `Error::BadInput` when every
//! strategy fails.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use fm_domain::message::ChatMessage;
use fm_domain::{Error, Result};

use crate::traits::{ChatRequest, LlmClient, ResponseFormat};

pub struct JsonRepair {
    /// Last-resort repair delegate. `None` disables strategy 4.
    llm: Option<Arc<dyn LlmClient>>,
}

impl JsonRepair {
    pub fn new() -> Self {
        Self { llm: None }
    }

    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Parse `text` into a JSON value, trying each strategy in order.
    pub async fn parse(&self, text: &str) -> Result<Value> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::bad_input("empty LLM output"));
        }

        if let Ok(value) = serde_json::from_str(trimmed) {
            return Ok(value);
        }
        if let Some(value) = parse_fenced_block(trimmed) {
            tracing::debug!("JSON recovered from fenced block");
            return Ok(value);
        }
        if let Some(value) = cleanup_and_parse(trimmed) {
            tracing::debug!("JSON recovered by cleanup");
            return Ok(value);
        }
        if let Some(value) = self.llm_repair(trimmed).await {
            tracing::debug!("JSON recovered by LLM repair");
            return Ok(value);
        }

        let preview: String = trimmed.chars().take(200).collect();
        Err(Error::bad_input(format!(
            "failed to parse JSON from LLM output: {preview}"
        )))
    }

    /// Like [`parse`], but falls back to `default` instead of failing.
    pub async fn parse_or(&self, text: &str, default: Value) -> Value {
        match self.parse(text).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "all JSON parse strategies failed, using default");
                default
            }
        }
    }

    async fn llm_repair(&self, text: &str) -> Option<Value> {
        let llm = self.llm.as_ref()?;
        let prompt = format!(
            "Extract and fix the JSON from the following text. Return only \
             valid JSON without any explanation or markdown formatting. If no \
             valid JSON can be extracted, return null.\n\nInput text:\n{text}"
        );
        let response = llm
            .ask(ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                tools: Vec::new(),
                response_format: Some(ResponseFormat::JsonObject),
            })
            .await;
        match response {
            Ok(resp) => {
                let content = resp.text().trim().to_string();
                if content.is_empty() || content == "null" {
                    return None;
                }
                serde_json::from_str(&content).ok()
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM JSON repair failed");
                None
            }
        }
    }
}

impl Default for JsonRepair {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Strategy 2: fenced code blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_fenced_block(text: &str) -> Option<Value> {
    let patterns = [
        r"(?si)```json\s*\n(.*?)\n\s*```",
        r"(?s)```\s*\n(.*?)\n\s*```",
        r"`([^`]+)`",
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).expect("static regex");
        for captures in re.captures_iter(text) {
            let candidate = captures.get(1)?.as_str().trim();
            if let Ok(value) = serde_json::from_str(candidate) {
                return Some(value);
            }
            // A fenced block may itself carry the malformations the
            // cleanup pass knows how to fix.
            if let Some(value) = cleanup_and_parse(candidate) {
                return Some(value);
            }
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Strategy 3: cleanup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn cleanup_and_parse(text: &str) -> Option<Value> {
    let mut cleaned = text.trim().to_string();

    for prefix in ["json:", "result:", "output:", "response:"] {
        let head = cleaned.get(..prefix.len());
        if head.is_some_and(|h| h.eq_ignore_ascii_case(prefix)) {
            cleaned = cleaned[prefix.len()..].trim().to_string();
        }
    }
    for suffix in ["...", "."] {
        if let Some(stripped) = cleaned.strip_suffix(suffix) {
            cleaned = stripped.trim().to_string();
        }
    }

    let cleaned = fix_json_formatting(&cleaned);
    serde_json::from_str(&cleaned).ok()
}

fn fix_json_formatting(text: &str) -> String {
    // Single-quoted strings → double-quoted.
    let single_quotes = Regex::new(r"'([^']*)'").expect("static regex");
    let text = single_quotes.replace_all(text, "\"$1\"").into_owned();

    // Unquoted object keys. Quoted keys never match: the char before
    // the colon is `"` rather than a word character.
    let bare_keys = Regex::new(r"(\w+):").expect("static regex");
    let text = bare_keys.replace_all(&text, "\"$1\":").into_owned();

    let text = escape_inner_quotes(&text);

    // Trailing commas, after quote fixes so commas inside repaired
    // strings are untouched.
    let trailing_commas = Regex::new(r",(\s*[}\]])").expect("static regex");
    trailing_commas.replace_all(&text, "$1").into_owned()
}

/// Escape unescaped `"` inside string values.
///
/// Walks the text tracking string state; a closing quote only counts
/// when the next non-whitespace character can legally follow a string
/// (`,` `}` `]` `:` or end of input). Everything else is an inner quote
/// the model forgot to escape.
fn escape_inner_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string && c == '\\' && i + 1 < chars.len() {
            out.push(c);
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        if c == '"' {
            if !in_string {
                in_string = true;
                out.push('"');
            } else {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                let terminates = j >= chars.len() || matches!(chars[j], ',' | '}' | ']' | ':');
                if terminates {
                    in_string = false;
                    out.push('"');
                } else {
                    out.push_str("\\\"");
                }
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn well_formed_json_is_parsed_verbatim() {
        let parser = JsonRepair::new();
        let input = r#"{"goal": "g", "steps": [{"id": "1"}]}"#;
        let value = parser.parse(input).await.unwrap();
        assert_eq!(value, json!({"goal": "g", "steps": [{"id": "1"}]}));

        // Idempotence: re-serializing and re-parsing yields the same value.
        let again = parser.parse(&value.to_string()).await.unwrap();
        assert_eq!(again, value);
    }

    #[tokio::test]
    async fn fenced_block_with_trailing_comma() {
        let parser = JsonRepair::new();
        let input = "```json\n{\"goal\":\"g\",\"title\":\"t\",\"message\":\"m\",\"steps\":[{\"id\":\"1\",\"description\":\"d\"},]}\n```";
        let value = parser.parse(input).await.unwrap();
        assert_eq!(value["goal"], "g");
        assert_eq!(value["steps"][0]["description"], "d");
        assert_eq!(value["steps"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fenced_block_with_surrounding_prose() {
        let parser = JsonRepair::new();
        let input = "Here is the plan you asked for:\n```\n{\"goal\": \"g\"}\n```\nLet me know!";
        let value = parser.parse(input).await.unwrap();
        assert_eq!(value["goal"], "g");
    }

    #[tokio::test]
    async fn single_quotes_and_bare_keys() {
        let parser = JsonRepair::new();
        let value = parser.parse("{goal: 'build it', count: 2}").await.unwrap();
        assert_eq!(value, json!({"goal": "build it", "count": 2}));
    }

    #[tokio::test]
    async fn prefix_and_trailing_period() {
        let parser = JsonRepair::new();
        let value = parser.parse("json: {\"ok\": true}.").await.unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn unescaped_inner_quotes() {
        let parser = JsonRepair::new();
        let input = r#"{"title": "the "best" plan"}"#;
        let value = parser.parse(input).await.unwrap();
        assert_eq!(value["title"], "the \"best\" plan");
    }

    #[tokio::test]
    async fn hopeless_input_is_bad_input() {
        let parser = JsonRepair::new();
        let err = parser.parse("this is not json at all").await.unwrap_err();
        assert_eq!(err.kind(), fm_domain::ErrorKind::BadInput);
    }

    #[tokio::test]
    async fn default_value_on_failure() {
        let parser = JsonRepair::new();
        let value = parser.parse_or("not json", json!({})).await;
        assert_eq!(value, json!({}));
    }

    #[test]
    fn escape_inner_quotes_leaves_valid_strings_alone() {
        let input = r#"{"a": "x", "b": ["y", "z"]}"#;
        assert_eq!(escape_inner_quotes(input), input);
    }
}
