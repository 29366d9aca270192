//! LLM access for Foreman.
//!
//! The [`LlmClient`] trait is the seam the agent roles program against;
//! [`OpenAiClient`] adapts it to any OpenAI-compatible chat-completions
//! endpoint. [`JsonRepair`] decodes the model's frequently-mangled JSON
//! output.

pub mod json_repair;
pub mod openai;
pub mod traits;

pub use json_repair::JsonRepair;
pub use openai::OpenAiClient;
pub use traits::{ChatRequest, ChatResponse, LlmClient, ResponseFormat, Usage};
