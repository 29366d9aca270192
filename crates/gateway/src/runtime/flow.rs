//! The plan/act flow.
//!
//! Weaves one planner and one executor into a state machine:
//! `Planning → Executing ↔ Updating → Completed`. A session resumed
//! from WAITING skips straight to `Executing` (a user reply continues
//! the suspended step); every other entry replans from the incoming
//! message.
//!
//! The entry decision uses the status snapshot taken under the session
//! lock when the worker was created, not a fresh store read: the
//! orchestrator flips the session to RUNNING before the worker is
//! spawned, so by the time this runs the store no longer distinguishes
//! a fresh session from a resumed one. The snapshot is consumed by the
//! first run; later runs of the same worker (queued messages) replan.
//!
//! Suspension: when the executor yields `wait`, the run ends without a
//! `done` event and the task runner parks the session in WAITING.

use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;

use fm_agents::{Executor, Planner};
use fm_domain::event::{AgentEvent, EventPayload, MessageRole, PlanStatus};
use fm_domain::plan::ExecutionStatus;
use fm_domain::session::SessionStatus;
use fm_domain::stream::EventStream;
use fm_domain::Error;
use fm_store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    Planning,
    Executing,
    Updating,
    Completed,
}

#[derive(Clone)]
pub struct PlanActFlow {
    session_id: String,
    sessions: Arc<SessionStore>,
    planner: Planner,
    executor: Executor,
    /// Session status at task creation, consumed by the first run.
    entry_status: Arc<Mutex<Option<SessionStatus>>>,
}

impl PlanActFlow {
    pub fn new(
        session_id: String,
        sessions: Arc<SessionStore>,
        planner: Planner,
        executor: Executor,
        entry_status: SessionStatus,
    ) -> Self {
        Self {
            session_id,
            sessions,
            planner,
            executor,
            entry_status: Arc::new(Mutex::new(Some(entry_status))),
        }
    }

    /// Process one user message, yielding typed events until the flow
    /// completes, suspends, or fails.
    pub fn run(&self, message: String) -> EventStream<'static> {
        let flow = self.clone();
        Box::pin(async_stream::try_stream! {
            let session = flow
                .sessions
                .find(&flow.session_id)
                .ok_or_else(|| Error::not_found(format!("session not found: {}", flow.session_id)))?;

            // First run uses the creation-time snapshot; queued
            // follow-up messages behave like a RUNNING entry.
            let entry = flow
                .entry_status
                .lock()
                .take()
                .unwrap_or(SessionStatus::Running);

            // A non-pristine session may hold unanswered tool calls
            // from an interrupted run; repair both roles before the
            // next LLM call.
            if entry != SessionStatus::Pending {
                flow.executor.roll_back()?;
                flow.planner.roll_back()?;
            }

            let mut state = match entry {
                // A reply to `ask_user` resumes the suspended step.
                SessionStatus::Waiting => FlowState::Executing,
                _ => FlowState::Planning,
            };

            flow.sessions
                .update_status(&flow.session_id, SessionStatus::Running)?;
            let mut plan = session.last_plan();
            let mut suspended = false;

            tracing::info!(session_id = %flow.session_id, ?state, "flow started");

            loop {
                match state {
                    FlowState::Planning => {
                        let mut inner = flow.planner.create_plan(&message);
                        while let Some(event) = inner.next().await {
                            let event = event?;
                            if let EventPayload::Plan { status: PlanStatus::Created, plan: created } =
                                event.payload.clone()
                            {
                                plan = Some(created.clone());
                                yield event;
                                yield AgentEvent::title(created.title.clone());
                                yield AgentEvent::message(MessageRole::Assistant, created.message.clone());
                            } else {
                                yield event;
                            }
                        }
                        state = FlowState::Executing;
                    }

                    FlowState::Executing => {
                        let Some(current) = plan.as_mut() else {
                            // Resumed without a recorded plan; replan.
                            state = FlowState::Planning;
                            continue;
                        };
                        current.status = ExecutionStatus::Running;

                        let Some(index) = current.next_pending_index() else {
                            state = FlowState::Completed;
                            continue;
                        };
                        let step = current.steps[index].clone();

                        let mut inner = flow.executor.execute_step(current, step, &message);
                        while let Some(event) = inner.next().await {
                            let event = event?;
                            // Keep our plan copy in sync with step progress.
                            if let EventPayload::Step { step: snapshot, .. } = &event.payload {
                                current.steps[index] = snapshot.clone();
                            }
                            let is_wait = matches!(event.payload, EventPayload::Wait {});
                            yield event;
                            if is_wait {
                                suspended = true;
                                break;
                            }
                        }
                        if suspended {
                            break;
                        }
                        state = FlowState::Updating;
                    }

                    FlowState::Updating => {
                        let Some(current) = plan.clone() else {
                            state = FlowState::Planning;
                            continue;
                        };
                        let mut inner = flow.planner.update_plan(current);
                        while let Some(event) = inner.next().await {
                            let event = event?;
                            if let EventPayload::Plan { status: PlanStatus::Updated, plan: updated } =
                                event.payload.clone()
                            {
                                plan = Some(updated);
                            }
                            yield event;
                        }
                        state = FlowState::Executing;
                    }

                    FlowState::Completed => {
                        if let Some(mut finished) = plan.take() {
                            finished.status = ExecutionStatus::Completed;
                            yield AgentEvent::plan(PlanStatus::Completed, finished);
                        }
                        break;
                    }
                }
            }

            if !suspended {
                yield AgentEvent::done();
                tracing::info!(session_id = %flow.session_id, "flow completed");
            } else {
                tracing::info!(session_id = %flow.session_id, "flow suspended on user input");
            }
        })
    }
}
