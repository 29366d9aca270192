//! The planner role.
//!
//! Given a user request, produces a structured plan; between steps,
//! rewrites the pending tail of the current plan. The planner holds no
//! tools and asks the LLM for JSON-object output.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use fm_domain::event::{AgentEvent, EventPayload, PlanStatus};
use fm_domain::plan::{Plan, Step};
use fm_domain::stream::EventStream;
use fm_domain::{Error, Result};
use fm_providers::{JsonRepair, LlmClient, ResponseFormat};
use fm_store::AgentStore;
use fm_tools::ToolRegistry;

use crate::base::{self, run_loop, AgentContext};
use crate::prompts;

pub const ROLE: &str = "planner";

#[derive(Clone)]
pub struct Planner {
    ctx: AgentContext,
}

impl Planner {
    pub fn new(
        agent_id: String,
        store: Arc<AgentStore>,
        llm: Arc<dyn LlmClient>,
        parser: Arc<JsonRepair>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx: AgentContext {
                agent_id,
                role: ROLE,
                system_prompt: prompts::PLANNER_SYSTEM_PROMPT,
                response_format: Some(ResponseFormat::JsonObject),
                store,
                llm,
                parser,
                registry: Arc::new(ToolRegistry::new(Vec::new())),
                cancel,
            },
        }
    }

    pub fn roll_back(&self) -> Result<()> {
        base::roll_back(&self.ctx)
    }

    /// Produce a plan for a user request. The LLM's final message is
    /// replaced by a `plan(created)` event carrying the parsed plan.
    pub fn create_plan(&self, message: &str) -> EventStream<'static> {
        let ctx = self.ctx.clone();
        let request = prompts::create_plan_prompt(message);
        Box::pin(async_stream::try_stream! {
            let mut inner = run_loop(ctx.clone(), request);
            while let Some(event) = inner.next().await {
                let event = event?;
                match event.payload.clone() {
                    EventPayload::Message { content, .. } => {
                        let parsed = ctx.parser.parse(&content).await?;
                        let plan = plan_from_json(&parsed)?;
                        tracing::info!(steps = plan.steps.len(), title = %plan.title, "plan created");
                        yield AgentEvent::plan(PlanStatus::Created, plan);
                    }
                    _ => yield event,
                }
            }
        })
    }

    /// Rewrite the pending tail of `plan`; completed steps are
    /// preserved verbatim. Emits `plan(updated)` with the new snapshot.
    pub fn update_plan(&self, plan: Plan) -> EventStream<'static> {
        let ctx = self.ctx.clone();
        let steps_json = serde_json::json!({ "steps": plan.steps }).to_string();
        let request = prompts::update_plan_prompt(&plan.goal, &steps_json);
        Box::pin(async_stream::try_stream! {
            let mut plan = plan;
            let mut inner = run_loop(ctx.clone(), request);
            while let Some(event) = inner.next().await {
                let event = event?;
                match event.payload.clone() {
                    EventPayload::Message { content, .. } => {
                        let parsed = ctx.parser.parse(&content).await?;
                        let new_steps = steps_from_json(&parsed)?;
                        plan.replace_pending_tail(new_steps);
                        tracing::info!(steps = plan.steps.len(), "plan updated");
                        yield AgentEvent::plan(PlanStatus::Updated, plan.clone());
                    }
                    _ => yield event,
                }
            }
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan JSON decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn required_str<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::bad_input(format!("plan output missing field: {key}")))
}

fn plan_from_json(value: &Value) -> Result<Plan> {
    let mut plan = Plan::new(
        required_str(value, "goal")?,
        required_str(value, "title")?,
        required_str(value, "message")?,
        steps_from_json(value)?,
    );
    plan.todo = value
        .get("todo")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(plan)
}

fn steps_from_json(value: &Value) -> Result<Vec<Step>> {
    let raw = value
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::bad_input("plan output missing field: steps"))?;
    raw.iter()
        .map(|step| {
            Ok(Step::new(
                required_str(step, "id")?,
                required_str(step, "description")?,
            ))
        })
        .collect()
}
