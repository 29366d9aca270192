//! The per-session worker.
//!
//! Owns the sandbox handle and the flow for the duration of one run.
//! Drains the task's inbox; every event the flow yields gets an outbox
//! id, is persisted to the session's event list, and triggers its
//! side-effects. Failures become a terminal `error` event; cancellation
//! becomes exactly one terminal `done`.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};

use fm_domain::event::{AgentEvent, EventPayload, MessageRole, ToolStatus};
use fm_domain::session::SessionStatus;
use fm_domain::{Error, Result};
use fm_sandbox::{Sandbox, SandboxManager};
use fm_store::SessionStore;
use fm_streams::EventStream as _;

use super::flow::PlanActFlow;
use super::task::Task;

enum RunOutcome {
    Completed,
    Suspended,
}

pub struct TaskRunner {
    session_id: String,
    sessions: Arc<SessionStore>,
    sandboxes: Arc<SandboxManager>,
    sandbox: Arc<dyn Sandbox>,
    flow: PlanActFlow,
}

impl TaskRunner {
    pub fn new(
        session_id: String,
        sessions: Arc<SessionStore>,
        sandboxes: Arc<SandboxManager>,
        sandbox: Arc<dyn Sandbox>,
        flow: PlanActFlow,
    ) -> Self {
        Self {
            session_id,
            sessions,
            sandboxes,
            sandbox,
            flow,
        }
    }

    /// Spawn the worker for `runner` on `task`, marking the task done
    /// when the run returns.
    pub fn spawn(runner: Arc<TaskRunner>, task: Arc<Task>) {
        task.mark_running();
        let handle = tokio::spawn({
            let task = task.clone();
            async move {
                runner.run(&task).await;
                task.mark_done();
            }
        });
        task.set_join(handle);
    }

    /// Drain the inbox, running the flow once per user message.
    pub async fn run(&self, task: &Arc<Task>) {
        loop {
            let message = match task.input.pop().await {
                Ok(Some((_, message))) => message,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(session_id = %self.session_id, error = %e, "inbox read failed");
                    break;
                }
            };

            tracing::info!(session_id = %self.session_id, "worker picked up message");
            match self.run_flow(task, message).await {
                Ok(RunOutcome::Suspended) => return,
                Ok(RunOutcome::Completed) => continue,
                Err(Error::Cancelled) => {
                    self.finish_cancelled(task).await;
                    return;
                }
                Err(e) => {
                    self.finish_failed(task, e).await;
                    return;
                }
            }
        }

        if let Err(e) = self.complete_session() {
            tracing::warn!(session_id = %self.session_id, error = %e, "completing session failed");
        }
    }

    /// Release the sandbox. Called on stop and process shutdown; safe
    /// to call more than once.
    pub async fn destroy(&self) {
        if let Err(e) = self.sandboxes.destroy(self.sandbox.id()).await {
            tracing::warn!(
                session_id = %self.session_id,
                sandbox_id = %self.sandbox.id(),
                error = %e,
                "sandbox release failed"
            );
        }
    }

    // ── One flow run ───────────────────────────────────────────────

    async fn run_flow(&self, task: &Arc<Task>, message: String) -> Result<RunOutcome> {
        let mut stream = self.flow.run(message);
        while let Some(item) = stream.next().await {
            let mut event = item?;
            self.enrich(&mut event).await;
            self.append(task, &mut event).await?;

            match &event.payload {
                EventPayload::Title { title } => {
                    self.sessions.update_title(&self.session_id, title)?;
                }
                EventPayload::Message {
                    role: MessageRole::Assistant,
                    content,
                } => {
                    self.sessions.update_latest_message(
                        &self.session_id,
                        content,
                        event.timestamp,
                    )?;
                    self.sessions.increment_unread(&self.session_id)?;
                }
                EventPayload::Wait {} => {
                    self.sessions
                        .update_status(&self.session_id, SessionStatus::Waiting)?;
                    return Ok(RunOutcome::Suspended);
                }
                _ => {}
            }
        }
        Ok(RunOutcome::Completed)
    }

    /// Assign an outbox id and persist the event to the session.
    ///
    /// Subscribers read `(id, payload)` pairs and stamp the id onto
    /// the decoded event themselves, so the payload does not need to
    /// be re-serialized after assignment.
    async fn append(&self, task: &Arc<Task>, event: &mut AgentEvent) -> Result<()> {
        let id = task.output.put(serde_json::to_string(&*event)?).await?;
        event.event_id = id;
        self.sessions.add_event(&self.session_id, event.clone())
    }

    // ── Terminal paths ─────────────────────────────────────────────

    async fn finish_cancelled(&self, task: &Arc<Task>) {
        tracing::info!(session_id = %self.session_id, "worker cancelled");
        let mut done = AgentEvent::done();
        if let Err(e) = self.append(task, &mut done).await {
            tracing::warn!(session_id = %self.session_id, error = %e, "appending terminal done failed");
        }
        if let Err(e) = self.complete_session() {
            tracing::warn!(session_id = %self.session_id, error = %e, "completing session failed");
        }
    }

    async fn finish_failed(&self, task: &Arc<Task>, error: Error) {
        tracing::error!(session_id = %self.session_id, error = %error, "worker failed");
        let mut event = AgentEvent::error(error.to_string());
        if let Err(e) = self.append(task, &mut event).await {
            tracing::warn!(session_id = %self.session_id, error = %e, "appending terminal error failed");
        }
        if let Err(e) = self.complete_session() {
            tracing::warn!(session_id = %self.session_id, error = %e, "completing session failed");
        }
    }

    fn complete_session(&self) -> Result<()> {
        // Unbind before the status write so a bound task id never
        // coexists with a COMPLETED status.
        self.sessions.bind_task(&self.session_id, None)?;
        self.sessions
            .update_status(&self.session_id, SessionStatus::Completed)
    }

    // ── Tool-content enrichment ────────────────────────────────────

    /// Attach display content to `tool(called)` events: the console
    /// snapshot for shell calls, file content for file calls, and the
    /// result copy for searches.
    async fn enrich(&self, event: &mut AgentEvent) {
        let EventPayload::Tool {
            tool_name,
            function_args,
            status: ToolStatus::Called,
            function_result,
            tool_content,
            ..
        } = &mut event.payload
        else {
            return;
        };

        *tool_content = match tool_name.as_str() {
            "search" => function_result
                .as_ref()
                .and_then(|r| r.data.as_ref())
                .and_then(|d| d.get("results").cloned())
                .map(|results| json!({ "results": results })),
            "shell" => match function_args.get("id").and_then(Value::as_str) {
                Some(shell_id) => match self.sandbox.view_shell(shell_id).await {
                    Ok(result) => result.data,
                    Err(e) => {
                        tracing::debug!(error = %e, "shell snapshot unavailable");
                        Some(Value::String("<console unavailable>".into()))
                    }
                },
                None => Some(Value::String("<console unavailable>".into())),
            },
            "file" => match function_args.get("file").and_then(Value::as_str) {
                Some(file) => match self.sandbox.file_read(file, None, None).await {
                    Ok(result) => result.data,
                    Err(e) => {
                        tracing::debug!(error = %e, "file content unavailable");
                        Some(Value::String("<content unavailable>".into()))
                    }
                },
                None => Some(Value::String("<content unavailable>".into())),
            },
            _ => None,
        };
    }
}
