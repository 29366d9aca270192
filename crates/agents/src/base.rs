//! The generic agent loop.
//!
//! One iteration: append input to memory, ask the LLM with the
//! available tools, and either finish (no tool calls) or dispatch the
//! first tool call and loop with its result. Memory is write-through:
//! every turn is persisted before the next LLM call, so a resumed
//! session sees exactly what the protocol requires, modulo unanswered
//! tool calls, which [`roll_back`] repairs.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use fm_domain::event::{AgentEvent, EventPayload, MessageRole, ToolStatus};
use fm_domain::memory::Memory;
use fm_domain::message::ChatMessage;
use fm_domain::stream::EventStream;
use fm_domain::tool::ToolResult;
use fm_domain::{Error, Result};
use fm_providers::{ChatRequest, JsonRepair, LlmClient, ResponseFormat};
use fm_store::AgentStore;
use fm_tools::ToolRegistry;

/// How many ask/dispatch iterations a single request may take.
pub const MAX_ITERATIONS: usize = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentContext
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct AgentContext {
    pub agent_id: String,
    /// Role name keying this agent's memory ("planner", "execution").
    pub role: &'static str,
    pub system_prompt: &'static str,
    pub response_format: Option<ResponseFormat>,
    pub store: Arc<AgentStore>,
    pub llm: Arc<dyn LlmClient>,
    pub parser: Arc<JsonRepair>,
    pub registry: Arc<ToolRegistry>,
    pub cancel: CancellationToken,
}

impl AgentContext {
    fn memory(&self) -> Memory {
        self.store.get_memory(&self.agent_id, self.role)
    }

    /// Append messages to this role's memory, installing the system
    /// prompt on first write.
    fn add_to_memory(&self, messages: Vec<ChatMessage>) -> Result<()> {
        let mut memory = self.memory();
        if memory.is_empty() {
            memory.add_message(ChatMessage::system(self.system_prompt));
        }
        memory.add_messages(messages);
        self.store.save_memory(&self.agent_id, self.role, memory)
    }

    /// Persist `messages`, ask the LLM with the effective memory view,
    /// keep only the first tool call, persist the assistant reply.
    async fn ask_with_messages(&self, messages: Vec<ChatMessage>) -> Result<ChatMessage> {
        self.add_to_memory(messages)?;

        let request = ChatRequest {
            messages: self.memory().messages_with_latest_system(),
            tools: self.registry.definitions(),
            response_format: self.response_format,
        };

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = self.llm.ask(request) => response?,
        };

        let mut message = response.into_message();
        // Serialize the function-calling protocol: keep only the first
        // tool call so every persisted call gets exactly one response.
        message.tool_calls.truncate(1);

        self.add_to_memory(vec![message.clone()])?;
        Ok(message)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the generic loop for one user-role request, yielding tool and
/// message events.
///
/// Suspension safety: the `called` tool event is yielded *before* the
/// tool response is written to memory. A consumer that stops the
/// stream there (the `ask_user` suspension) leaves the assistant's
/// tool call unanswered, which is exactly the state [`roll_back`]
/// repairs on resume.
pub fn run_loop(ctx: AgentContext, request: String) -> EventStream<'static> {
    Box::pin(async_stream::try_stream! {
        let mut message = ctx.ask_with_messages(vec![ChatMessage::user(request)]).await?;
        let mut finished = false;

        for iteration in 0..MAX_ITERATIONS {
            if ctx.cancel.is_cancelled() {
                Err::<(), Error>(Error::Cancelled)?;
            }

            if message.tool_calls.is_empty() {
                yield AgentEvent::message(MessageRole::Assistant, message.text());
                finished = true;
                break;
            }

            let call = message.tool_calls[0].clone();
            let tool_call_id = if call.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                call.id.clone()
            };

            let function_args: Value = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                ctx.parser.parse(&call.function.arguments).await?
            };

            let tool = ctx.registry.lookup(&call.function.name)?;
            tracing::debug!(
                iteration,
                tool = tool.name(),
                function = %call.function.name,
                "dispatching tool call"
            );

            yield AgentEvent::new(EventPayload::Tool {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool.name().to_string(),
                function_name: call.function.name.clone(),
                function_args: function_args.clone(),
                status: ToolStatus::Calling,
                function_result: None,
                tool_content: None,
            });

            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => Err(Error::Cancelled),
                result = ctx.registry.invoke(&tool, &call.function.name, &function_args) => Ok(result),
            }?;

            yield AgentEvent::new(EventPayload::Tool {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool.name().to_string(),
                function_name: call.function.name.clone(),
                function_args: function_args.clone(),
                status: ToolStatus::Called,
                function_result: Some(result.clone()),
                tool_content: None,
            });

            let tool_response =
                ChatMessage::tool_response(tool_call_id, serde_json::to_string(&result)?);
            message = ctx.ask_with_messages(vec![tool_response]).await?;
        }

        if !finished {
            yield AgentEvent::error(
                "maximum iteration count reached, failed to complete the task",
            );
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Roll-back
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Restore the "every tool call has a tool response" invariant.
///
/// When a run was suspended or torn down mid-dispatch, the last memory
/// entry is an assistant message whose tool calls were never answered.
/// Synthesize a success response for each before the next LLM call.
pub fn roll_back(ctx: &AgentContext) -> Result<()> {
    let memory = ctx.memory();
    let Some(last) = memory.last_message() else {
        return Ok(());
    };
    if last.tool_calls.is_empty() {
        return Ok(());
    }

    let placeholder = serde_json::to_string(&ToolResult::ok())?;
    let responses: Vec<ChatMessage> = last
        .tool_calls
        .iter()
        .map(|call| {
            let id = if call.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                call.id.clone()
            };
            ChatMessage::tool_response(id, placeholder.clone())
        })
        .collect();

    tracing::debug!(
        agent_id = %ctx.agent_id,
        role = ctx.role,
        synthesized = responses.len(),
        "rolled back unanswered tool calls"
    );
    ctx.add_to_memory(responses)
}

/// Drain a role's event stream into a vec (test helper shared by the
/// planner/executor tests).
#[cfg(test)]
pub(crate) async fn collect(mut stream: EventStream<'static>) -> Vec<Result<AgentEvent>> {
    use futures_util::StreamExt;
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        events.push(item);
    }
    events
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn plain_answer_yields_single_message_event() {
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text("all done")]);
        let fixture = fixture(llm, vec![]);

        let events = collect(run_loop(fixture.ctx.clone(), "do it".into())).await;
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert!(matches!(
            &event.payload,
            EventPayload::Message { role: MessageRole::Assistant, content } if content == "all done"
        ));

        // Memory: system, user, assistant.
        let memory = fixture.ctx.memory();
        assert_eq!(memory.messages.len(), 3);
        assert_eq!(memory.messages[0].role, fm_domain::message::Role::System);
    }

    #[tokio::test]
    async fn tool_call_cycle_emits_calling_called_and_answers() {
        let llm = ScriptedLlm::new(vec![
            ScriptedLlm::tool_call("call_1", "echo_text", r#"{"text":"hi"}"#),
            ScriptedLlm::text("finished"),
        ]);
        let fixture = fixture(llm, vec![Arc::new(EchoTool)]);

        let events: Vec<AgentEvent> = collect(run_loop(fixture.ctx.clone(), "go".into()))
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect();

        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0].payload,
            EventPayload::Tool { status: ToolStatus::Calling, tool_name, .. } if tool_name == "echo"
        ));
        assert!(matches!(
            &events[1].payload,
            EventPayload::Tool { status: ToolStatus::Called, function_result: Some(r), .. } if r.success
        ));
        assert!(matches!(&events[2].payload, EventPayload::Message { .. }));

        // Every assistant tool call has a matching tool response.
        let memory = fixture.ctx.memory();
        let call_ids: Vec<_> = memory
            .messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
            .collect();
        for id in call_ids {
            assert!(memory
                .messages
                .iter()
                .any(|m| m.tool_call_id.as_deref() == Some(id.as_str())));
        }
    }

    #[tokio::test]
    async fn unknown_function_surfaces_an_error() {
        let llm = ScriptedLlm::new(vec![ScriptedLlm::tool_call("c1", "no_such_fn", "{}")]);
        let fixture = fixture(llm, vec![]);

        let events = collect(run_loop(fixture.ctx, "go".into())).await;
        assert!(events.last().unwrap().is_err());
    }

    #[tokio::test]
    async fn roll_back_answers_dangling_tool_calls() {
        let llm = ScriptedLlm::new(vec![ScriptedLlm::tool_call("call_7", "echo_text", "{}")]);
        let fixture = fixture(llm, vec![Arc::new(EchoTool)]);

        // Drive the loop only until the `calling` event, then drop the
        // stream: the assistant's call is now unanswered in memory.
        {
            let mut stream = run_loop(fixture.ctx.clone(), "go".into());
            let first = stream.next().await.unwrap().unwrap();
            assert!(matches!(
                first.payload,
                EventPayload::Tool { status: ToolStatus::Calling, .. }
            ));
        }
        let memory = fixture.ctx.memory();
        assert!(!memory.last_message().unwrap().tool_calls.is_empty());

        roll_back(&fixture.ctx).unwrap();

        let memory = fixture.ctx.memory();
        let last = memory.last_message().unwrap();
        assert_eq!(last.role, fm_domain::message::Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_7"));

        // Idempotent in effect: the new last message has no tool calls.
        roll_back(&fixture.ctx).unwrap();
        assert_eq!(fixture.ctx.memory().messages.len(), memory.messages.len());
    }

    #[tokio::test]
    async fn sibling_tool_calls_are_truncated_to_the_first() {
        use fm_domain::message::{FunctionCall, ToolCall};
        let two_calls = fm_providers::ChatResponse {
            content: None,
            tool_calls: vec![
                ToolCall {
                    id: "call_a".into(),
                    call_type: "function".into(),
                    function: FunctionCall {
                        name: "echo_text".into(),
                        arguments: r#"{"text":"a"}"#.into(),
                    },
                },
                ToolCall {
                    id: "call_b".into(),
                    call_type: "function".into(),
                    function: FunctionCall {
                        name: "echo_text".into(),
                        arguments: r#"{"text":"b"}"#.into(),
                    },
                },
            ],
            usage: None,
            finish_reason: Some("tool_calls".into()),
        };
        let llm = ScriptedLlm::new(vec![two_calls, ScriptedLlm::text("done")]);
        let fixture = fixture(llm, vec![Arc::new(EchoTool)]);

        let events: Vec<AgentEvent> = collect(run_loop(fixture.ctx.clone(), "go".into()))
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect();

        // One calling/called pair, not two.
        let tool_events = events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::Tool { .. }))
            .count();
        assert_eq!(tool_events, 2);

        // The persisted assistant message carries only the first call.
        let memory = fixture.ctx.memory();
        let assistant = memory
            .messages
            .iter()
            .find(|m| !m.tool_calls.is_empty())
            .unwrap();
        assert_eq!(assistant.tool_calls.len(), 1);
        assert_eq!(assistant.tool_calls[0].id, "call_a");
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let llm = ScriptedLlm::new(vec![ScriptedLlm::text("never seen")]);
        let fixture = fixture(llm, vec![]);
        fixture.ctx.cancel.cancel();

        let events = collect(run_loop(fixture.ctx, "go".into())).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(Error::Cancelled)));
    }
}
