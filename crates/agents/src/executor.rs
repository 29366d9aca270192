//! The execution role.
//!
//! Drives one plan step to completion with the full tool set. The
//! `message_ask_user` function is the suspension point: its tool
//! events are intercepted and turned into an assistant message plus a
//! `wait` event, ending the run with the step still in flight.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use fm_domain::event::{AgentEvent, EventPayload, MessageRole, StepStatus, ToolStatus};
use fm_domain::plan::{ExecutionStatus, Plan, Step};
use fm_domain::stream::EventStream;
use fm_domain::Result;
use fm_providers::{JsonRepair, LlmClient};
use fm_store::AgentStore;
use fm_tools::message::ASK_USER;
use fm_tools::ToolRegistry;

use crate::base::{self, run_loop, AgentContext};
use crate::prompts;

pub const ROLE: &str = "execution";

#[derive(Clone)]
pub struct Executor {
    ctx: AgentContext,
}

impl Executor {
    pub fn new(
        agent_id: String,
        store: Arc<AgentStore>,
        llm: Arc<dyn LlmClient>,
        parser: Arc<JsonRepair>,
        registry: Arc<ToolRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx: AgentContext {
                agent_id,
                role: ROLE,
                system_prompt: prompts::EXECUTION_SYSTEM_PROMPT,
                response_format: None,
                store,
                llm,
                parser,
                registry,
                cancel,
            },
        }
    }

    pub fn roll_back(&self) -> Result<()> {
        base::roll_back(&self.ctx)
    }

    /// Execute one step. Emits `step(started)`, the inner tool/message
    /// events, and one of: `step(completed)`, `step(failed)`, or
    /// `wait` (suspension, step left running).
    pub fn execute_step(&self, plan: &Plan, step: Step, user_message: &str) -> EventStream<'static> {
        let ctx = self.ctx.clone();
        let request = prompts::execution_prompt(&plan.goal, &step.description, user_message);
        Box::pin(async_stream::try_stream! {
            let mut step = step;
            step.status = ExecutionStatus::Running;
            tracing::info!(step_id = %step.id, "step started");
            yield AgentEvent::step(StepStatus::Started, step.clone());

            let mut inner = run_loop(ctx, request);
            while let Some(event) = inner.next().await {
                let event = event?;
                match event.payload.clone() {
                    EventPayload::Tool {
                        function_name,
                        status,
                        function_args,
                        ..
                    } if function_name == ASK_USER => match status {
                        // The question itself is the assistant's message.
                        ToolStatus::Calling => {
                            let text = function_args
                                .get("text")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            yield AgentEvent::message(MessageRole::Assistant, text);
                        }
                        // Park the session; the step stays in flight and
                        // resumes after the next user message.
                        ToolStatus::Called => {
                            tracing::info!(step_id = %step.id, "step suspended on user input");
                            yield AgentEvent::wait();
                            break;
                        }
                    },
                    EventPayload::Message { content, .. } => {
                        step.status = ExecutionStatus::Completed;
                        step.result = Some(content);
                        tracing::info!(step_id = %step.id, "step completed");
                        yield AgentEvent::step(StepStatus::Completed, step.clone());
                        yield event;
                    }
                    EventPayload::Error { error } => {
                        step.status = ExecutionStatus::Failed;
                        step.error = Some(error);
                        tracing::warn!(step_id = %step.id, "step failed");
                        yield AgentEvent::step(StepStatus::Failed, step.clone());
                        yield event;
                    }
                    _ => yield event,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::collect;
    use crate::base::testing::{fixture, message_tool, EchoTool, ScriptedLlm};

    fn executor_from(
        llm: Arc<dyn LlmClient>,
        tools: Vec<Arc<dyn fm_tools::Tool>>,
    ) -> (Executor, crate::base::testing::Fixture) {
        let fixture = fixture(llm, vec![]);
        let executor = Executor::new(
            fixture.ctx.agent_id.clone(),
            fixture.ctx.store.clone(),
            fixture.ctx.llm.clone(),
            fixture.ctx.parser.clone(),
            Arc::new(ToolRegistry::new(tools)),
            fixture.ctx.cancel.clone(),
        );
        (executor, fixture)
    }

    fn plan_with_step() -> (Plan, Step) {
        let step = Step::new("1", "write hello.txt");
        let plan = Plan::new("write a file", "hello", "hi", vec![step.clone()]);
        (plan, step)
    }

    #[tokio::test]
    async fn completed_step_emits_started_tools_completed() {
        let llm = ScriptedLlm::new(vec![
            ScriptedLlm::tool_call("c1", "echo_text", r#"{"text":"hi"}"#),
            ScriptedLlm::text("wrote the file"),
        ]);
        let (executor, _fixture) = executor_from(llm, vec![Arc::new(EchoTool)]);
        let (plan, step) = plan_with_step();

        let events: Vec<AgentEvent> = collect(executor.execute_step(&plan, step, "write it"))
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect();

        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["step", "tool", "tool", "step", "message"]);

        match &events[3].payload {
            EventPayload::Step { status, step } => {
                assert_eq!(*status, StepStatus::Completed);
                assert_eq!(step.result.as_deref(), Some("wrote the file"));
            }
            other => panic!("expected step event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ask_user_suspends_with_message_then_wait() {
        let llm = ScriptedLlm::new(vec![ScriptedLlm::tool_call(
            "c1",
            ASK_USER,
            r#"{"text":"Confirm?"}"#,
        )]);
        let (executor, fixture) = executor_from(llm, vec![message_tool()]);
        let (plan, step) = plan_with_step();

        let events: Vec<AgentEvent> = collect(executor.execute_step(&plan, step, "go"))
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect();

        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["step", "message", "wait"]);
        assert!(matches!(
            &events[1].payload,
            EventPayload::Message { role: MessageRole::Assistant, content } if content == "Confirm?"
        ));

        // Suspension leaves the ask_user call unanswered in the
        // execution memory; resume repairs it via roll_back.
        let memory = fixture.ctx.store.get_memory(&fixture.ctx.agent_id, ROLE);
        assert!(!memory.last_message().unwrap().tool_calls.is_empty());
    }

    #[tokio::test]
    async fn llm_failure_propagates_as_stream_error() {
        // Script exhausts after the tool call: the next ask errors.
        let llm = ScriptedLlm::new(vec![ScriptedLlm::tool_call(
            "c1",
            "echo_text",
            r#"{"text":"x"}"#,
        )]);
        let (executor, _fixture) = executor_from(llm, vec![Arc::new(EchoTool)]);
        let (plan, step) = plan_with_step();

        let events = collect(executor.execute_step(&plan, step, "go")).await;
        // step(started), tool, tool, then the LLM error propagates.
        assert!(events.last().unwrap().is_err());
    }
}
