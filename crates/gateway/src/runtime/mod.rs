//! The session execution engine.
//!
//! A `chat` with a message creates a [`task::Task`] (inbox + outbox
//! sharing one id space, a cancellation token, a worker handle) and a
//! [`runner::TaskRunner`] that drains the inbox through the
//! [`flow::PlanActFlow`], persisting every yielded event. The
//! [`service::AgentService`] façade enforces at-most-one live worker
//! per session.

pub mod flow;
pub mod runner;
pub mod service;
pub mod session_lock;
pub mod task;

pub use service::AgentService;
