//! Usage Accounting
//!
//! Accumulated in memory for one request and flushed once after the
//! stream has closed.

use crate::domain::conversation::TokenUsage;
use crate::domain::tool::ToolKind;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageTally {
    pub model_calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub web_searches: u32,
    pub graph_traversals: u32,
    /// Budgeted calls answered with the exhausted placeholder
    pub budget_exhausted: u32,
}

impl UsageTally {
    pub fn add_model_call(&mut self, usage: TokenUsage) {
        self.model_calls += 1;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
    }

    pub fn add_dispatch(&mut self, kind: ToolKind) {
        match kind {
            ToolKind::WebSearch => self.web_searches += 1,
            ToolKind::GraphTraverse => self.graph_traversals += 1,
        }
    }

    pub fn add_budget_exhausted(&mut self) {
        self.budget_exhausted += 1;
    }

    pub fn tool_calls(&self) -> u32 {
        self.web_searches + self.graph_traversals
    }
}
