//! Collaborator Traits
//!
//! Interfaces to everything outside the gateway. Implementations are in
//! the infrastructure layer; tests supply fakes.

use platform::kv::KvResult;
use serde_json::Value;

use crate::application::usage::UsageTally;
use crate::domain::conversation::{ModelRequest, ModelResponse};
use crate::domain::tool::{ToolCall, ToolKind};
use crate::error::{ModelError, ToolError};

/// LLM inference backend
#[trait_variant::make(ModelBackend: Send)]
pub trait LocalModelBackend {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;
}

/// Web search collaborator
#[trait_variant::make(SearchBackend: Send)]
pub trait LocalSearchBackend {
    /// Readable digest of the top results
    async fn search(&self, query: &str) -> Result<String, ToolError>;
}

/// Event graph collaborator
#[trait_variant::make(GraphBackend: Send)]
pub trait LocalGraphBackend {
    async fn traverse(&self, topic: &str, args: &Value) -> Result<String, ToolError>;
}

/// Runs one tool call to a text result. Never fails: failures are text
/// the model can read.
#[trait_variant::make(ToolExecutor: Send)]
pub trait LocalToolExecutor {
    /// Tool kinds that have a collaborator behind them
    fn registered(&self) -> Vec<ToolKind>;

    async fn execute(&self, call: &ToolCall) -> String;
}

/// Sink for per-request usage accounting
#[trait_variant::make(UsageRecorder: Send)]
pub trait LocalUsageRecorder {
    async fn record(&self, tally: &UsageTally) -> KvResult<()>;
}
