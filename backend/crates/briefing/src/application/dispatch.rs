//! Tool Dispatcher
//!
//! Routes a tool call to its collaborator under a timeout and always comes
//! back with text.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::repository::{GraphBackend, SearchBackend, ToolExecutor};
use crate::domain::tool::{ToolCall, ToolKind};
use crate::error::ToolError;

/// Longest tool result handed back to the model
const MAX_RESULT_CHARS: usize = 8_000;

pub struct ToolDispatcher<S, G>
where
    S: SearchBackend,
    G: GraphBackend,
{
    search: Option<Arc<S>>,
    graph: Option<Arc<G>>,
    timeout: Duration,
}

impl<S, G> ToolDispatcher<S, G>
where
    S: SearchBackend + Sync,
    G: GraphBackend + Sync,
{
    pub fn new(search: Option<Arc<S>>, graph: Option<Arc<G>>, timeout: Duration) -> Self {
        Self {
            search,
            graph,
            timeout,
        }
    }

    async fn run(&self, kind: ToolKind, call: &ToolCall) -> Result<String, ToolError> {
        match kind {
            ToolKind::WebSearch => {
                let search = self.search.as_ref().ok_or(ToolError::Transport(
                    "web search is not configured".to_string(),
                ))?;
                let query = call.str_arg("query").ok_or(ToolError::MissingArgument("query"))?;
                with_timeout(self.timeout, search.search(query)).await
            }
            ToolKind::GraphTraverse => {
                let graph = self.graph.as_ref().ok_or(ToolError::Transport(
                    "graph traversal is not configured".to_string(),
                ))?;
                let topic = call.str_arg("topic").ok_or(ToolError::MissingArgument("topic"))?;
                with_timeout(self.timeout, graph.traverse(topic, &call.args)).await
            }
        }
    }
}

impl<S, G> ToolExecutor for ToolDispatcher<S, G>
where
    S: SearchBackend + Sync,
    G: GraphBackend + Sync,
{
    fn registered(&self) -> Vec<ToolKind> {
        let mut kinds = Vec::with_capacity(2);
        if self.search.is_some() {
            kinds.push(ToolKind::WebSearch);
        }
        if self.graph.is_some() {
            kinds.push(ToolKind::GraphTraverse);
        }
        kinds
    }

    async fn execute(&self, call: &ToolCall) -> String {
        let Some(kind) = call.kind() else {
            tracing::warn!(tool = %call.name, "Model requested an unknown tool");
            return format!("unknown tool: {}", call.name);
        };

        match self.run(kind, call).await {
            Ok(text) => truncate(text),
            Err(e) => {
                tracing::warn!(tool = kind.name(), error = ?e, "Tool call failed");
                failure_text(kind, &e)
            }
        }
    }
}

async fn with_timeout<F>(timeout: Duration, call: F) -> Result<String, ToolError>
where
    F: Future<Output = Result<String, ToolError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ToolError::Timeout))
}

fn failure_text(kind: ToolKind, error: &ToolError) -> String {
    match kind {
        ToolKind::WebSearch => format!("search failed: {error}"),
        ToolKind::GraphTraverse => format!("graph traversal failed: {error}"),
    }
}

fn truncate(text: String) -> String {
    match text.char_indices().nth(MAX_RESULT_CHARS) {
        Some((cut, _)) => format!("{}\n[truncated]", &text[..cut]),
        None => text,
    }
}
