//! The LLM-backed agent roles.
//!
//! [`base`] holds the generic agent loop shared by both roles: ask the
//! model, dispatch the first tool call, feed the result back, repeat.
//! [`planner`] turns user requests into structured plans; [`executor`]
//! drives a single plan step to completion using tools.

pub mod base;
pub mod executor;
pub mod planner;
pub mod prompts;

pub use base::{roll_back, AgentContext};
pub use executor::Executor;
pub use planner::Planner;
