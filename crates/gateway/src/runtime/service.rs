//! The session orchestrator façade.
//!
//! The single legal way to inject user input. Guarantees at-most-one
//! live worker per session by holding the session's lock across the
//! status check, task creation, and message enqueue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use parking_lot::Mutex;

use fm_agents::{Executor, Planner};
use fm_domain::agent::AgentRecord;
use fm_domain::config::Config;
use fm_domain::event::{AgentEvent, MessageRole};
use fm_domain::session::{Session, SessionStatus};
use fm_domain::stream::BoxStream;
use fm_domain::{Error, Result};
use fm_providers::{JsonRepair, LlmClient};
use fm_sandbox::{Sandbox, SandboxManager};
use fm_store::{AgentStore, SessionStore};
use fm_streams::{EventStream as _, StreamHub};
use fm_tools::{
    BrowserTool, FileTool, GoogleSearchEngine, MessageTool, SearchEngine, SearchTool, ShellTool,
    Tool, ToolRegistry,
};

use super::flow::PlanActFlow;
use super::runner::TaskRunner;
use super::session_lock::SessionLockMap;
use super::task::{Task, TaskStore};

/// How long `shutdown` waits for workers before dropping them.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(30);

pub struct AgentService {
    llm: Arc<dyn LlmClient>,
    parser: Arc<JsonRepair>,
    sessions: Arc<SessionStore>,
    agents: Arc<AgentStore>,
    sandboxes: Arc<SandboxManager>,
    search: Option<Arc<dyn SearchEngine>>,
    tasks: TaskStore,
    streams: StreamHub,
    locks: SessionLockMap,
    /// task id → runner, kept so stop/shutdown can release resources.
    runners: Mutex<HashMap<String, Arc<TaskRunner>>>,
}

impl AgentService {
    pub fn new(
        config: Arc<Config>,
        llm: Arc<dyn LlmClient>,
        sessions: Arc<SessionStore>,
        agents: Arc<AgentStore>,
        sandboxes: Arc<SandboxManager>,
    ) -> Self {
        let parser = Arc::new(JsonRepair::with_llm(llm.clone()));
        let search: Option<Arc<dyn SearchEngine>> = match (
            &config.search.google_api_key,
            &config.search.google_engine_id,
        ) {
            (Some(key), Some(engine)) => {
                tracing::info!("search tool enabled (Google Custom Search)");
                Some(Arc::new(GoogleSearchEngine::new(key.clone(), engine.clone())))
            }
            _ => None,
        };
        Self {
            llm,
            parser,
            sessions,
            agents,
            sandboxes,
            search,
            tasks: TaskStore::new(),
            streams: StreamHub::new(),
            locks: SessionLockMap::new(),
            runners: Mutex::new(HashMap::new()),
        }
    }

    // ── Session CRUD ───────────────────────────────────────────────

    pub fn create_session(&self) -> Result<Session> {
        let agent = AgentRecord::new(
            self.llm.model_name(),
            self.llm.temperature(),
            self.llm.max_tokens(),
        )?;
        let agent_id = agent.id.clone();
        self.agents.save(agent);

        let session = Session::new(agent_id);
        tracing::info!(session_id = %session.id, "session created");
        self.sessions.save(session.clone());
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .find(session_id)
            .ok_or_else(|| Error::not_found(format!("session not found: {session_id}")))
    }

    pub fn get_all_sessions(&self) -> Vec<Session> {
        self.sessions.get_all()
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.stop_session(session_id).await?;
        let session = self.get_session(session_id)?;
        self.agents.delete(&session.agent_id);
        self.sessions.delete(session_id);
        self.streams.remove(session_id);
        tracing::info!(session_id, "session deleted");
        Ok(())
    }

    /// Cancel the session's worker (if any) and complete the session.
    pub async fn stop_session(&self, session_id: &str) -> Result<()> {
        let session = self.get_session(session_id)?;
        if let Some(task_id) = &session.task_id {
            if let Some(task) = self.tasks.get(task_id) {
                task.cancel();
                if let Some(join) = task.take_join() {
                    let _ = tokio::time::timeout(SHUTDOWN_BUDGET, join).await;
                }
                self.tasks.remove(task_id);
            }
            let runner = self.runners.lock().remove(task_id);
            if let Some(runner) = runner {
                runner.destroy().await;
            }
        }
        // Unbind before the status write so a bound task id never
        // coexists with a COMPLETED status.
        self.sessions.bind_task(session_id, None)?;
        self.sessions
            .update_status(session_id, SessionStatus::Completed)?;
        tracing::info!(session_id, "session stopped");
        Ok(())
    }

    /// Cancel and release every live worker, then flush the stores.
    pub async fn shutdown(&self) {
        tracing::info!(tasks = self.tasks.len(), "shutting down workers");
        let tasks = self.tasks.all();
        for task in &tasks {
            task.cancel();
        }

        let deadline = tokio::time::Instant::now() + SHUTDOWN_BUDGET;
        for task in &tasks {
            if let Some(join) = task.take_join() {
                if tokio::time::timeout_at(deadline, join).await.is_err() {
                    tracing::warn!(task_id = %task.id, "worker did not stop in time, dropping");
                }
            }
            self.tasks.remove(&task.id);
        }

        let runners: Vec<Arc<TaskRunner>> = self.runners.lock().drain().map(|(_, r)| r).collect();
        for runner in runners {
            runner.destroy().await;
        }
        self.sandboxes.destroy_all().await;

        if let Err(e) = self.sessions.flush() {
            tracing::warn!(error = %e, "session store flush failed");
        }
        if let Err(e) = self.agents.flush() {
            tracing::warn!(error = %e, "agent store flush failed");
        }
        tracing::info!("shutdown complete");
    }

    pub fn flush_stores(&self) {
        if let Err(e) = self.sessions.flush() {
            tracing::warn!(error = %e, "session store flush failed");
        }
        if let Err(e) = self.agents.flush() {
            tracing::warn!(error = %e, "agent store flush failed");
        }
    }

    // ── Sandbox views (shell/file/vnc endpoints) ───────────────────

    async fn session_sandbox(&self, session_id: &str) -> Result<Arc<dyn Sandbox>> {
        let session = self.get_session(session_id)?;
        let sandbox_id = session
            .sandbox_id
            .ok_or_else(|| Error::not_found(format!("sandbox not found: {session_id}")))?;
        self.sandboxes.get(&sandbox_id).await
    }

    pub async fn shell_view(&self, session_id: &str, shell_session_id: &str) -> Result<serde_json::Value> {
        let sandbox = self.session_sandbox(session_id).await?;
        let result = sandbox.view_shell(shell_session_id).await?;
        result
            .data
            .ok_or_else(|| Error::Sandbox("shell view returned no data".into()))
    }

    pub async fn file_view(&self, session_id: &str, file: &str) -> Result<serde_json::Value> {
        let sandbox = self.session_sandbox(session_id).await?;
        let result = sandbox.file_read(file, None, None).await?;
        result
            .data
            .ok_or_else(|| Error::Sandbox("file read returned no data".into()))
    }

    pub async fn vnc_url(&self, session_id: &str) -> Result<String> {
        Ok(self.session_sandbox(session_id).await?.vnc_url())
    }

    // ── Chat ───────────────────────────────────────────────────────

    /// Route a user message (if any) to the session's worker and
    /// stream events from the outbox cursor. Errors are converted to a
    /// terminal `error` event, persisted and yielded.
    pub fn chat(
        self: &Arc<Self>,
        session_id: String,
        message: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        last_event_id: Option<u64>,
    ) -> BoxStream<'static, AgentEvent> {
        let service = self.clone();
        Box::pin(async_stream::stream! {
            let mut inner =
                service.clone().chat_inner(session_id.clone(), message, timestamp, last_event_id);
            while let Some(item) = inner.next().await {
                match item {
                    Ok(event) => yield event,
                    Err(e) => {
                        tracing::error!(session_id = %session_id, error = %e, "chat failed");
                        let event = AgentEvent::error(e.to_string());
                        if service.sessions.find(&session_id).is_some() {
                            let _ = service.sessions.add_event(&session_id, event.clone());
                        }
                        yield event;
                        break;
                    }
                }
            }
            let _ = service.sessions.reset_unread(&session_id);
        })
    }

    fn chat_inner(
        self: Arc<Self>,
        session_id: String,
        message: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        last_event_id: Option<u64>,
    ) -> BoxStream<'static, Result<AgentEvent>> {
        let service = self;
        Box::pin(async_stream::try_stream! {
            let session = service.get_session(&session_id)?;
            let mut task = session
                .task_id
                .as_deref()
                .and_then(|task_id| service.tasks.get(task_id));

            if let Some(message) = message {
                // Critical section: liveness check → task creation →
                // enqueue → worker start, under the per-session lock.
                let permit = service.locks.acquire(&session_id).await;
                let session = service.get_session(&session_id)?;

                // Liveness is decided by the task alone: a bound task
                // that has not returned is the session's single active
                // worker. The persisted status is not consulted here;
                // it only reaches RUNNING once create_task has written
                // it, and a concurrent chat waiting on the lock must
                // not mistake that window for a dead worker.
                let live = session
                    .task_id
                    .as_deref()
                    .and_then(|task_id| service.tasks.get(task_id))
                    .filter(|bound| !bound.done());
                let (current, fresh) = match live {
                    Some(existing) => (existing, false),
                    None => (service.create_task(&session).await?, true),
                };
                task = Some(current.clone());

                let at = timestamp.unwrap_or_else(Utc::now);
                service
                    .sessions
                    .update_latest_message(&session_id, &message, at)?;

                let message_id = current.input.put(message.clone()).await?;
                let mut user_event = AgentEvent::message(MessageRole::User, message.clone());
                user_event.event_id = message_id;
                service.sessions.add_event(&session_id, user_event)?;

                // Start the worker only for a fresh task; a live one is
                // already draining the inbox.
                if fresh {
                    if let Some(runner) = service.runners.lock().get(&current.id).cloned() {
                        TaskRunner::spawn(runner, current.clone());
                    }
                }
                drop(permit);
            }

            if let Some(task) = task {
                let mut cursor = last_event_id;
                loop {
                    let entry = task.output.get(cursor, 1_000).await?;
                    let Some((id, payload)) = entry else {
                        if task.done() {
                            break;
                        }
                        continue;
                    };
                    cursor = Some(id);

                    let mut event: AgentEvent = serde_json::from_str(&payload)?;
                    event.event_id = id;
                    service.sessions.reset_unread(&session_id)?;
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        break;
                    }
                }
            }
        })
    }

    // ── Task creation ──────────────────────────────────────────────

    /// Build a fresh worker task for the session. Runs under the
    /// caller's session lock.
    ///
    /// A bound task id must imply a RUNNING or WAITING session, so the
    /// status transition happens here, before the task is bound, not
    /// inside the spawned flow. The creation-time status is snapshotted
    /// into the flow so a WAITING resume still enters at the step it
    /// suspended on.
    async fn create_task(&self, session: &Session) -> Result<Arc<Task>> {
        // Drop the previous (finished) task binding, keeping its
        // sandbox alive for reuse.
        if let Some(old_task_id) = &session.task_id {
            self.tasks.remove(old_task_id);
            self.runners.lock().remove(old_task_id);
        }

        let entry_status = session.status;

        // Acquire-on-first-run, reuse within the session.
        let sandbox = match &session.sandbox_id {
            Some(sandbox_id) => self.sandboxes.get(sandbox_id).await?,
            None => {
                let sandbox = self.sandboxes.create().await?;
                self.sessions.bind_sandbox(&session.id, sandbox.id())?;
                sandbox
            }
        };

        let (inbox, outbox) = self.streams.session_streams(&session.id);
        let task = self.tasks.create(&session.id, inbox, outbox);

        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ShellTool::new(sandbox.clone())),
            Arc::new(FileTool::new(sandbox.clone())),
            Arc::new(BrowserTool::new(sandbox.clone())),
            Arc::new(MessageTool::new()),
        ];
        if let Some(search) = &self.search {
            tools.push(Arc::new(SearchTool::new(search.clone())));
        }
        let registry = Arc::new(ToolRegistry::new(tools));

        let planner = Planner::new(
            session.agent_id.clone(),
            self.agents.clone(),
            self.llm.clone(),
            self.parser.clone(),
            task.cancel.clone(),
        );
        let executor = Executor::new(
            session.agent_id.clone(),
            self.agents.clone(),
            self.llm.clone(),
            self.parser.clone(),
            registry,
            task.cancel.clone(),
        );
        let flow = PlanActFlow::new(
            session.id.clone(),
            self.sessions.clone(),
            planner,
            executor,
            entry_status,
        );

        let runner = Arc::new(TaskRunner::new(
            session.id.clone(),
            self.sessions.clone(),
            self.sandboxes.clone(),
            sandbox,
            flow,
        ));
        self.runners.lock().insert(task.id.clone(), runner);

        // Status first, then the binding: a bound task id must never
        // be observed alongside a PENDING or COMPLETED status. WAITING
        // stays as-is; the flow flips it to RUNNING when the resumed
        // run actually starts.
        if entry_status != SessionStatus::Waiting {
            self.sessions
                .update_status(&session.id, SessionStatus::Running)?;
        }
        self.sessions
            .bind_task(&session.id, Some(task.id.clone()))?;

        tracing::info!(session_id = %session.id, task_id = %task.id, "task created");
        Ok(task)
    }
}
