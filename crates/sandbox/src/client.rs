//! HTTP adapter for the sandbox runtime API.
//!
//! Every capability maps onto a `POST /api/v1/...` endpoint that
//! returns a `ToolResult`-shaped body. Transport failures surface as
//! `Error::Sandbox` so the tool retry policy can kick in.

use async_trait::async_trait;
use serde_json::{json, Value};

use fm_domain::tool::ToolResult;
use fm_domain::{Error, Result};

use crate::Sandbox;

pub struct HttpSandbox {
    id: String,
    base_url: String,
    vnc_url: String,
    client: reqwest::Client,
}

impl HttpSandbox {
    /// Connect to a sandbox by address (host or host:port of its API).
    pub fn connect(address: &str, id: impl Into<String>) -> Result<Self> {
        let host = address.split(':').next().unwrap_or(address);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| Error::Sandbox(format!("building sandbox client: {e}")))?;
        Ok(Self {
            id: id.into(),
            base_url: format!("http://{host}:8080"),
            vnc_url: format!("ws://{host}:5901"),
            client,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<ToolResult> {
        let url = format!("{}/api/v1{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Sandbox(format!("POST {path}: {e}")))?;
        response
            .json::<ToolResult>()
            .await
            .map_err(|e| Error::Sandbox(format!("decoding {path} response: {e}")))
    }
}

#[async_trait]
impl Sandbox for HttpSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn vnc_url(&self) -> String {
        self.vnc_url.clone()
    }

    async fn exec_shell(
        &self,
        session_id: &str,
        exec_dir: &str,
        command: &str,
    ) -> Result<ToolResult> {
        self.post(
            "/shell/exec",
            json!({ "id": session_id, "exec_dir": exec_dir, "command": command }),
        )
        .await
    }

    async fn view_shell(&self, session_id: &str) -> Result<ToolResult> {
        self.post("/shell/view", json!({ "id": session_id })).await
    }

    async fn wait_shell(&self, session_id: &str, seconds: Option<u64>) -> Result<ToolResult> {
        self.post("/shell/wait", json!({ "id": session_id, "seconds": seconds }))
            .await
    }

    async fn write_to_shell(
        &self,
        session_id: &str,
        input: &str,
        press_enter: bool,
    ) -> Result<ToolResult> {
        self.post(
            "/shell/write",
            json!({ "id": session_id, "input": input, "press_enter": press_enter }),
        )
        .await
    }

    async fn kill_shell(&self, session_id: &str) -> Result<ToolResult> {
        self.post("/shell/kill", json!({ "id": session_id })).await
    }

    async fn file_read(
        &self,
        file: &str,
        start_line: Option<i64>,
        end_line: Option<i64>,
    ) -> Result<ToolResult> {
        self.post(
            "/file/read",
            json!({ "file": file, "start_line": start_line, "end_line": end_line }),
        )
        .await
    }

    async fn file_write(&self, file: &str, content: &str, append: bool) -> Result<ToolResult> {
        self.post(
            "/file/write",
            json!({ "file": file, "content": content, "append": append }),
        )
        .await
    }

    async fn file_replace(&self, file: &str, old_str: &str, new_str: &str) -> Result<ToolResult> {
        self.post(
            "/file/replace",
            json!({ "file": file, "old_str": old_str, "new_str": new_str }),
        )
        .await
    }

    async fn file_search(&self, file: &str, regex: &str) -> Result<ToolResult> {
        self.post("/file/search", json!({ "file": file, "regex": regex }))
            .await
    }

    async fn file_find(&self, path: &str, glob: &str) -> Result<ToolResult> {
        self.post("/file/find", json!({ "path": path, "glob": glob }))
            .await
    }

    async fn browser_invoke(&self, action: &str, args: &Value) -> Result<ToolResult> {
        self.post(&format!("/browser/{action}"), args.clone()).await
    }

    async fn destroy(&self) -> Result<()> {
        // The sandbox runtime owns its own teardown (TTL-based); closing
        // our side just drops the connection pool.
        tracing::debug!(sandbox_id = %self.id, "sandbox handle released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_derives_service_urls() {
        let sandbox = HttpSandbox::connect("172.17.0.2", "box-1").unwrap();
        assert_eq!(sandbox.base_url, "http://172.17.0.2:8080");
        assert_eq!(sandbox.vnc_url(), "ws://172.17.0.2:5901");
        assert_eq!(sandbox.id(), "box-1");
    }

    #[test]
    fn connect_strips_explicit_port() {
        let sandbox = HttpSandbox::connect("sandbox:8080", "box-2").unwrap();
        assert_eq!(sandbox.base_url, "http://sandbox:8080");
    }
}
