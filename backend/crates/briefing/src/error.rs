//! Briefing Error Types
//!
//! Two families: [`BriefingError`] for everything detected before the
//! stream opens (rendered as an HTTP error), and [`OrchestratorError`] for
//! failures after it (rendered as a single in-stream `error` event).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::rate_limit::RateLimitError;
use thiserror::Error;

use admission::AdmissionError;

pub type BriefingResult<T> = Result<T, BriefingError>;

/// Request rejected by the input validator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Question is too long (max {max} characters)")]
    QuestionTooLong { max: usize },

    #[error("Conversation history is too long (max {max} messages)")]
    TooManyTurns { max: usize },

    #[error("History message {index} is too long (max {max} characters)")]
    MessageTooLong { index: usize, max: usize },

    #[error("History message {index} has an unknown role")]
    UnknownRole { index: usize, role: String },
}

/// Pre-stream failures
#[derive(Debug, Error)]
pub enum BriefingError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Body is not the expected JSON
    #[error("Malformed request body: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

impl BriefingError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BriefingError::Admission(e) => e.kind(),
            BriefingError::RateLimited(RateLimitError::StoreUnavailable(_)) => {
                ErrorKind::ServiceUnavailable
            }
            BriefingError::RateLimited(_) => ErrorKind::TooManyRequests,
            BriefingError::Validation(_) | BriefingError::MalformedBody(_) => ErrorKind::BadRequest,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            BriefingError::Admission(e) => e.log(),
            BriefingError::RateLimited(RateLimitError::StoreUnavailable(e)) => {
                tracing::error!(error = %e, "Rate limit store unavailable");
            }
            BriefingError::RateLimited(e) => {
                tracing::warn!(error = %e, "Briefing request rate limited");
            }
            BriefingError::Validation(e) => {
                tracing::debug!(error = %e, "Briefing request failed validation");
            }
            BriefingError::MalformedBody(e) => {
                tracing::debug!(error = %e, "Malformed briefing request body");
            }
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::bad_request(err.to_string()).with_label("Invalid request")
    }
}

impl From<BriefingError> for AppError {
    fn from(err: BriefingError) -> Self {
        match err {
            BriefingError::Admission(e) => AppError::from(e),
            BriefingError::RateLimited(e) => AppError::from(e),
            BriefingError::Validation(e) => AppError::from(e),
            BriefingError::MalformedBody(e) => AppError::from(e),
        }
    }
}

impl IntoResponse for BriefingError {
    fn into_response(self) -> Response {
        self.log();
        AppError::from(self).into_response()
    }
}

/// Model backend failure. Display text may contain raw upstream detail
/// and is only ever logged.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model call timed out")]
    Timeout,

    #[error("Model returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Model request failed: {0}")]
    Transport(String),

    #[error("Unreadable model response: {0}")]
    Decode(String),

    /// Response had no candidate (e.g. blocked by safety filters)
    #[error("Model returned no answer: {0}")]
    Empty(String),
}

impl ModelError {
    /// Whether this looks like a provider quota or rate limit
    pub fn is_quota(&self) -> bool {
        match self {
            ModelError::Http { status: 429, .. } => true,
            other => looks_like_quota(&other.to_string()),
        }
    }
}

/// Phrasing providers use for quota exhaustion
pub fn looks_like_quota(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["quota", "resource_exhausted", "429", "rate limit"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Tool collaborator failure; turned into text for the model
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("timeout")]
    Timeout,

    #[error("HTTP {0}")]
    Http(u16),

    #[error("request failed")]
    Transport(String),

    #[error("unreadable response")]
    Decode(String),

    #[error("missing argument `{0}`")]
    MissingArgument(&'static str),
}

/// Failures after the stream has opened
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("No final answer after {max} model calls")]
    IterationLimit { max: u32 },

    /// Client went away; nothing more is sent
    #[error("Client disconnected")]
    Cancelled,
}
