//! Durable stores for sessions and agents.
//!
//! JSON-file persistence under the configured state path, fronted by
//! in-memory maps. Operations are linearizable per key (one RwLock per
//! store); `flush()` writes the current snapshot to disk and is called
//! periodically plus on shutdown.

pub mod agents;
pub mod sessions;

pub use agents::AgentStore;
pub use sessions::SessionStore;
