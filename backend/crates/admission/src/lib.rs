//! PoW Admission Control
//!
//! Clean Architecture structure:
//! - `domain/` - Challenge and session entities, PoW digest, repository traits
//! - `application/` - Use cases and the admission controller
//! - `infra/` - Shared-store implementations
//! - `presentation/` - HTTP handlers
//!
//! ## Security Model
//! - The server alone chooses difficulty; clients never supply it
//! - Challenges are stateless and HMAC-signed, so they cannot be invented
//! - Every rejection hands out a fresh challenge, never the failed one
//! - Session tokens are signed, stored with a TTL and bound to the caller's identity

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::admit::{Admission, AdmissionController, AdmissionRequest, AdmissionState};
pub use application::config::AdmissionConfig;
pub use application::issue_challenge::IssuedChallenge;
pub use domain::repository::PowSessionRepository;
pub use domain::value_objects::{Difficulty, PowSolution};
pub use error::{AdmissionError, AdmissionResult, RequiredReason};
pub use infra::kv::KvPowSessionRepository;
pub use presentation::dto::PowSolutionDto;
pub use presentation::handlers::AdmissionAppState;
pub use presentation::router::admission_router;
