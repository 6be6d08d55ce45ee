//! Admission Error Types
//!
//! This module provides admission-specific error variants that integrate
//! with the unified `kernel::error::AppError` system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::kv::KvError;
use platform::rate_limit::RateLimitError;
use thiserror::Error;

use crate::application::issue_challenge::IssuedChallenge;

/// Admission-specific result type alias
pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// Why a request was sent back to the PoW path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredReason {
    /// Neither a session token nor a solution was presented
    NoCredential,
    /// The presented session token is unknown, expired or forged
    SessionExpired,
}

/// Admission-specific error variants
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// No usable credential; carries the fresh challenge to solve
    #[error("Proof of work required")]
    Required {
        reason: RequiredReason,
        challenge: IssuedChallenge,
    },

    /// Solution did not verify; carries a fresh challenge, never the failed one
    #[error("Proof of work solution rejected")]
    Invalid { challenge: IssuedChallenge },

    /// Challenge issuance throttled
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    /// Session store unreachable
    #[error("Session store error: {0}")]
    Store(#[from] KvError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdmissionError::Required { .. } | AdmissionError::Invalid { .. } => {
                ErrorKind::Unauthorized
            }
            AdmissionError::RateLimited(RateLimitError::StoreUnavailable(_))
            | AdmissionError::Store(_) => ErrorKind::ServiceUnavailable,
            AdmissionError::RateLimited(_) => ErrorKind::TooManyRequests,
            AdmissionError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            AdmissionError::Store(e) => {
                tracing::error!(error = %e, "Admission store error");
            }
            AdmissionError::Internal(msg) => {
                tracing::error!(message = %msg, "Admission internal error");
            }
            AdmissionError::Invalid { .. } => {
                tracing::warn!("Invalid PoW solution");
            }
            AdmissionError::RateLimited(e) => {
                tracing::warn!(error = %e, "Challenge issuance rate limited");
            }
            AdmissionError::Required { reason, .. } => {
                tracing::debug!(?reason, "PoW required");
            }
        }
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Required { reason, challenge } => {
                let message = match reason {
                    RequiredReason::NoCredential => "Please complete the verification challenge",
                    RequiredReason::SessionExpired => {
                        "Your session has expired, please complete a new verification challenge"
                    }
                };
                challenge_error(AppError::unauthorized(message), challenge)
            }
            AdmissionError::Invalid { challenge } => challenge_error(
                AppError::unauthorized("Verification failed, please solve the new challenge"),
                challenge,
            ),
            AdmissionError::RateLimited(e) => AppError::from(e),
            AdmissionError::Store(e) => AppError::from(e),
            AdmissionError::Internal(msg) => {
                AppError::internal("Internal server error").with_source(AdmissionError::Internal(msg))
            }
        }
    }
}

fn challenge_error(err: AppError, challenge: IssuedChallenge) -> AppError {
    err.with_label("Proof of work required")
        .with_detail("requiresPow", true)
        .with_detail("challenge", challenge.challenge)
        .with_detail("difficulty", challenge.difficulty.bits())
        .with_detail("expiresAtMs", challenge.expires_at_ms)
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        self.log();
        AppError::from(self).into_response()
    }
}
