//! Conversation Model

use serde_json::Value;

use crate::domain::tool::ToolCall;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "model" => Some(Role::Model),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// The event the user is asking about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BriefingContext {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub category: String,
    pub location: String,
}

/// One prior message supplied by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

/// Request as received, before validation
#[derive(Debug, Clone, Default)]
pub struct UncheckedBriefing {
    pub id: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub question: Option<String>,
    /// `(role, content)` exactly as sent
    pub history: Vec<(String, String)>,
}

/// A validated request
#[derive(Debug, Clone)]
pub struct BriefingRequest {
    pub context: BriefingContext,
    pub question: String,
    pub history: Vec<HistoryMessage>,
}

/// Piece of a turn
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    ToolCall(ToolCall),
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
}

/// Who produced a turn in the running conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
    /// Synthetic turn carrying tool results back to the model
    Tool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub parts: Vec<Part>,
    /// Backend payload replayed verbatim on the next call, if the backend
    /// needs more than `parts` to resume
    pub raw: Option<Value>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            parts: vec![Part::Text(text.into())],
            raw: None,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            parts: vec![Part::Text(text.into())],
            raw: None,
        }
    }

    pub fn from_history(message: &HistoryMessage) -> Self {
        match message.role {
            Role::User => Self::user(message.content.clone()),
            Role::Model => Self::model_text(message.content.clone()),
        }
    }

    /// Concatenated text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Token counts reported by the model backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One inference call
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub turns: Vec<Turn>,
    pub tools: Vec<crate::domain::tool::ToolSpec>,
}

/// Result of one inference call
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Always a `TurnRole::Model` turn
    pub turn: Turn,
    pub usage: TokenUsage,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            turn: Turn::model_text(text),
            usage: TokenUsage::default(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            turn: Turn {
                role: TurnRole::Model,
                parts: calls.into_iter().map(Part::ToolCall).collect(),
                raw: None,
            },
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = TokenUsage {
            input_tokens,
            output_tokens,
        };
        self
    }
}
