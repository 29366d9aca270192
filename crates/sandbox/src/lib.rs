//! Per-session sandbox handles.
//!
//! A sandbox is an external collaborator exposing shell, file, and
//! browser capabilities over HTTP plus a VNC endpoint. This crate
//! defines the capability trait the rest of the system programs
//! against, the HTTP adapter, and the session-indexed handle cache.

pub mod client;
pub mod manager;

pub use client::HttpSandbox;
pub use manager::SandboxManager;

use async_trait::async_trait;
use serde_json::Value;

use fm_domain::tool::ToolResult;
use fm_domain::Result;

/// The capability surface of one isolated sandbox.
///
/// Handles are exclusive to a session; the manager returns the same
/// handle for a given id until `destroy` invalidates it.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Opaque sandbox id, stored on the session for reuse.
    fn id(&self) -> &str;

    /// WebSocket URL of the sandbox's VNC server.
    fn vnc_url(&self) -> String;

    // ── Shell ──────────────────────────────────────────────────────

    async fn exec_shell(&self, session_id: &str, exec_dir: &str, command: &str)
        -> Result<ToolResult>;
    async fn view_shell(&self, session_id: &str) -> Result<ToolResult>;
    async fn wait_shell(&self, session_id: &str, seconds: Option<u64>) -> Result<ToolResult>;
    async fn write_to_shell(
        &self,
        session_id: &str,
        input: &str,
        press_enter: bool,
    ) -> Result<ToolResult>;
    async fn kill_shell(&self, session_id: &str) -> Result<ToolResult>;

    // ── Files ──────────────────────────────────────────────────────

    async fn file_read(
        &self,
        file: &str,
        start_line: Option<i64>,
        end_line: Option<i64>,
    ) -> Result<ToolResult>;
    async fn file_write(&self, file: &str, content: &str, append: bool) -> Result<ToolResult>;
    async fn file_replace(&self, file: &str, old_str: &str, new_str: &str) -> Result<ToolResult>;
    async fn file_search(&self, file: &str, regex: &str) -> Result<ToolResult>;
    async fn file_find(&self, path: &str, glob: &str) -> Result<ToolResult>;

    // ── Browser ────────────────────────────────────────────────────

    /// Invoke a browser action (`navigate`, `click`, `input`, ...) on
    /// the sandbox-hosted browser.
    async fn browser_invoke(&self, action: &str, args: &Value) -> Result<ToolResult>;

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Tear the sandbox down and release its resources. Idempotent.
    async fn destroy(&self) -> Result<()>;
}
