//! Admission Router

use axum::{Router, routing::get};

use crate::domain::repository::PowSessionRepository;
use crate::presentation::handlers::{self, AdmissionAppState};
use platform::kv::KvStore;

/// Create the `/api/pow` router for any repository and store implementation
pub fn admission_router<S, K>(state: AdmissionAppState<S, K>) -> Router
where
    S: PowSessionRepository + Sync + 'static,
    K: KvStore + Sync + 'static,
{
    Router::new()
        .route("/challenge", get(handlers::issue_challenge::<S, K>))
        .route("/status", get(handlers::check_status::<S, K>))
        .with_state(state)
}
