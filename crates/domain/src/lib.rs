//! Shared domain types for all Foreman crates.
//!
//! Everything here is plain data: the error type, the chat protocol
//! messages exchanged with the LLM, the typed agent events streamed to
//! clients, plans, memories, sessions, and configuration. No I/O.

pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod plan;
pub mod session;
pub mod stream;
pub mod tool;

pub use error::{Error, ErrorKind, Result};

/// Generate a short opaque identifier (16 hex chars).
///
/// Used for session, agent, and plan-step ids.
pub fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_16_hex_chars() {
        let id = short_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_ids_are_unique() {
        assert_ne!(short_id(), short_id());
    }
}
