//! Conversational Briefing
//!
//! Clean Architecture structure:
//! - `domain/` - Conversation model, tool kinds, stream events, collaborator traits
//! - `application/` - Validation, tool dispatch, the agent loop and the stream driver
//! - `infra/` - Gemini, Tavily, graph and usage-store clients
//! - `presentation/` - The streaming HTTP endpoint
//!
//! ## Cost Controls
//! - Admission, rate limits and validation all run before the first model call
//! - The web search tool has a per-question budget and disappears from the
//!   offered tool set once it is spent
//! - The agent loop is bounded by a maximum number of model calls

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::{BriefingConfig, ValidationLimits};
pub use application::dispatch::ToolDispatcher;
pub use application::orchestrator::AgentOrchestrator;
pub use application::stream::{BriefingStream, EventSink};
pub use application::usage::UsageTally;
pub use domain::stream::{SseDecoder, StreamEvent};
pub use error::{BriefingError, BriefingResult, ModelError, OrchestratorError, ToolError};
pub use presentation::handlers::BriefingAppState;
pub use presentation::router::briefing_router;

#[cfg(test)]
mod tests;
