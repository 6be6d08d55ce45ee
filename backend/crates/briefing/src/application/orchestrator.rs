//! Agent Orchestrator
//!
//! Bounded loop: call the model, dispatch the tools it asks for, feed the
//! results back, until it answers without tool calls or `max_iterations`
//! model calls have been made.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;

use crate::application::config::BriefingConfig;
use crate::application::prompt::{initial_turns, system_instructions};
use crate::application::stream::EventSink;
use crate::application::usage::UsageTally;
use crate::domain::conversation::{BriefingRequest, ModelRequest, Part, Turn, TurnRole};
use crate::domain::repository::{ModelBackend, ToolExecutor};
use crate::domain::stream::StreamEvent;
use crate::domain::tool::{AvailableTools, BUDGET_EXHAUSTED, ToolCall, ToolKind};
use crate::error::{ModelError, OrchestratorError};

/// What happens to one requested call
enum Planned {
    Dispatch(ToolKind, ToolCall),
    /// Budgeted tool past its ceiling
    Exhausted(ToolCall),
    /// Not a known tool; the executor answers with text
    Unknown(ToolCall),
}

impl Planned {
    fn call(&self) -> &ToolCall {
        match self {
            Planned::Dispatch(_, call) | Planned::Exhausted(call) | Planned::Unknown(call) => call,
        }
    }
}

pub struct AgentOrchestrator<M, T>
where
    M: ModelBackend,
    T: ToolExecutor,
{
    model: Arc<M>,
    tools: Arc<T>,
    config: Arc<BriefingConfig>,
}

impl<M, T> Clone for AgentOrchestrator<M, T>
where
    M: ModelBackend,
    T: ToolExecutor,
{
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            tools: self.tools.clone(),
            config: self.config.clone(),
        }
    }
}

impl<M, T> AgentOrchestrator<M, T>
where
    M: ModelBackend + Sync,
    T: ToolExecutor + Sync,
{
    pub fn new(model: Arc<M>, tools: Arc<T>, config: Arc<BriefingConfig>) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &BriefingConfig {
        &self.config
    }

    /// Run one question to completion, streaming status and content into
    /// `sink`. Terminal events are the caller's job.
    pub async fn run(
        &self,
        request: &BriefingRequest,
        sink: &EventSink,
        tally: &mut UsageTally,
    ) -> Result<(), OrchestratorError> {
        let system = system_instructions(&request.context, Utc::now().date_naive());
        let mut turns = initial_turns(request);
        let registered = self.tools.registered();
        let max_searches = self.config.max_web_searches;
        let mut web_searches = 0u32;

        for iteration in 0..self.config.max_iterations {
            if sink.is_closed() {
                return Err(OrchestratorError::Cancelled);
            }

            let available = AvailableTools::for_budget(web_searches, max_searches);
            let model_request = ModelRequest {
                system: system.clone(),
                turns: turns.clone(),
                tools: available.specs(&registered),
            };
            let offered_any = !model_request.tools.is_empty();

            let response = tokio::time::timeout(
                self.config.model_timeout,
                self.model.generate(&model_request),
            )
            .await
            .unwrap_or(Err(ModelError::Timeout))?;
            tally.add_model_call(response.usage);

            let calls = response.turn.tool_calls();
            if calls.is_empty() || !offered_any {
                if !calls.is_empty() {
                    tracing::warn!(
                        iteration,
                        calls = calls.len(),
                        "Model called tools while none were offered, treating turn as final"
                    );
                }
                let text = response.turn.text();
                if !text.trim().is_empty() {
                    sink.send(StreamEvent::Content(text)).await;
                }
                tracing::info!(
                    iterations = iteration + 1,
                    web_searches,
                    "Briefing answered"
                );
                return Ok(());
            }

            turns.push(response.turn);

            // budget is charged in request order, before anything runs
            let planned: Vec<Planned> = calls
                .into_iter()
                .map(|call| match call.kind() {
                    Some(ToolKind::WebSearch) if web_searches >= max_searches => {
                        Planned::Exhausted(call)
                    }
                    Some(kind) => {
                        if kind.is_budgeted() {
                            web_searches += 1;
                        }
                        Planned::Dispatch(kind, call)
                    }
                    None => Planned::Unknown(call),
                })
                .collect();

            if sink.is_closed() {
                return Err(OrchestratorError::Cancelled);
            }

            for item in &planned {
                if let Planned::Dispatch(kind, call) = item {
                    let argument = call.str_arg(kind.status_argument()).map(str::to_string);
                    sink.send(StreamEvent::status(kind.status(), argument)).await;
                }
            }

            let results = join_all(planned.iter().map(|item| async move {
                match item {
                    Planned::Exhausted(_) => BUDGET_EXHAUSTED.to_string(),
                    Planned::Dispatch(_, call) | Planned::Unknown(call) => {
                        self.tools.execute(call).await
                    }
                }
            }))
            .await;

            for item in &planned {
                match item {
                    Planned::Dispatch(kind, _) => tally.add_dispatch(*kind),
                    Planned::Exhausted(_) => tally.add_budget_exhausted(),
                    Planned::Unknown(_) => {}
                }
            }

            tracing::debug!(
                iteration,
                dispatched = planned
                    .iter()
                    .filter(|p| matches!(p, Planned::Dispatch(..)))
                    .count(),
                web_searches,
                "Tool round complete"
            );

            turns.push(Turn {
                role: TurnRole::Tool,
                parts: planned
                    .iter()
                    .zip(results)
                    .map(|(item, content)| Part::ToolResult {
                        call_id: item.call().id.clone(),
                        name: item.call().name.clone(),
                        content,
                    })
                    .collect(),
                raw: None,
            });
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            "Iteration limit reached without a final answer"
        );
        Err(OrchestratorError::IterationLimit {
            max: self.config.max_iterations,
        })
    }
}
