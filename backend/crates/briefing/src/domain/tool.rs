//! Tools offered to the model

use serde_json::{Value, json};

/// Result text the model sees for a budgeted call that was not dispatched
pub const BUDGET_EXHAUSTED: &str =
    "Search budget exhausted for this question. Answer with the information you already have.";

/// Every tool the gateway can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// External web search; each call costs money
    WebSearch,
    /// Related-event graph lookup
    GraphTraverse,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::WebSearch, ToolKind::GraphTraverse];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => "web_search",
            ToolKind::GraphTraverse => "graph_traverse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Subject to the per-turn call ceiling
    pub fn is_budgeted(&self) -> bool {
        matches!(self, ToolKind::WebSearch)
    }

    /// `status` value streamed while the tool runs
    pub fn status(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => "searching",
            ToolKind::GraphTraverse => "exploring",
        }
    }

    /// Argument echoed to the client alongside the status
    pub fn status_argument(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => "query",
            ToolKind::GraphTraverse => "topic",
        }
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            ToolKind::WebSearch => ToolSpec {
                name: self.name(),
                description: "Search the web for recent news and background on a topic. \
                              Use only when the event context is not enough.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query, a few keywords"
                        }
                    },
                    "required": ["query"]
                }),
            },
            ToolKind::GraphTraverse => ToolSpec {
                name: self.name(),
                description: "Find events related to a topic, place or actor in the event graph.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "topic": {
                            "type": "string",
                            "description": "Entity, place or theme to start from"
                        },
                        "depth": {
                            "type": "integer",
                            "description": "How many hops to follow (1-3)"
                        }
                    },
                    "required": ["topic"]
                }),
            },
        }
    }
}

/// Model-issued invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    pub fn kind(&self) -> Option<ToolKind> {
        ToolKind::from_name(&self.name)
    }

    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Function declaration sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Tool set offered for one iteration, recomputed from budget state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailableTools {
    All,
    WithoutBudgeted,
}

impl AvailableTools {
    pub fn for_budget(budgeted_calls: u32, max_budgeted_calls: u32) -> Self {
        if budgeted_calls >= max_budgeted_calls {
            AvailableTools::WithoutBudgeted
        } else {
            AvailableTools::All
        }
    }

    pub fn offers(&self, kind: ToolKind) -> bool {
        match self {
            AvailableTools::All => true,
            AvailableTools::WithoutBudgeted => !kind.is_budgeted(),
        }
    }

    /// Declarations for the tools that are both offered and registered
    pub fn specs(&self, registered: &[ToolKind]) -> Vec<ToolSpec> {
        registered
            .iter()
            .filter(|kind| self.offers(**kind))
            .map(ToolKind::spec)
            .collect()
    }
}
