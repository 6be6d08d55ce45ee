//! Briefing Router

use admission::PowSessionRepository;
use axum::{Router, routing::post};
use platform::kv::KvStore;

use crate::domain::repository::{ModelBackend, ToolExecutor, UsageRecorder};
use crate::presentation::handlers::{self, BriefingAppState};

/// Create the `/api/briefing` router
pub fn briefing_router<S, K, M, T, R>(state: BriefingAppState<S, K, M, T, R>) -> Router
where
    S: PowSessionRepository + Sync + 'static,
    K: KvStore + Sync + 'static,
    M: ModelBackend + Sync + 'static,
    T: ToolExecutor + Sync + 'static,
    R: UsageRecorder + Sync + 'static,
{
    Router::new()
        .route("/", post(handlers::create_briefing::<S, K, M, T, R>))
        .with_state(state)
}
