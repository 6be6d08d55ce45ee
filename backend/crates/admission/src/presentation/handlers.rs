//! HTTP Handlers

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use platform::client::{ClientIp, IdentityConfig, resolve_identity};
use platform::kv::KvStore;
use platform::rate_limit::RateLimiter;
use std::sync::Arc;

use crate::application::admit::AdmissionController;
use crate::domain::repository::PowSessionRepository;
use crate::error::AdmissionResult;
use crate::presentation::dto::{ChallengeResponse, SESSION_TOKEN_HEADER, StatusResponse};

/// Shared state for admission handlers
pub struct AdmissionAppState<S, K>
where
    S: PowSessionRepository,
    K: KvStore,
{
    pub controller: AdmissionController<S>,
    /// Per-identity limiter in front of challenge issuance
    pub challenge_limiter: RateLimiter<K>,
    pub identity: Arc<IdentityConfig>,
}

impl<S, K> Clone for AdmissionAppState<S, K>
where
    S: PowSessionRepository,
    K: KvStore,
{
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            challenge_limiter: self.challenge_limiter.clone(),
            identity: self.identity.clone(),
        }
    }
}

/// GET /api/pow/challenge
pub async fn issue_challenge<S, K>(
    State(state): State<AdmissionAppState<S, K>>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
) -> AdmissionResult<Json<ChallengeResponse>>
where
    S: PowSessionRepository + Sync + 'static,
    K: KvStore + Sync + 'static,
{
    let identity = resolve_identity(&headers, client_ip, &state.identity);
    state.challenge_limiter.check(&identity).await?;

    let issued = state.controller.issue_challenge();

    tracing::info!(
        identity = %identity,
        difficulty = %issued.difficulty,
        "Issued challenge"
    );

    Ok(Json(ChallengeResponse::from(issued)))
}

/// GET /api/pow/status
pub async fn check_status<S, K>(
    State(state): State<AdmissionAppState<S, K>>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
) -> AdmissionResult<Json<StatusResponse>>
where
    S: PowSessionRepository + Sync + 'static,
    K: KvStore + Sync + 'static,
{
    let identity = resolve_identity(&headers, client_ip, &state.identity);
    let token = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let passed = match token {
        Some(token) => state.controller.session_valid(token, &identity.key).await?,
        None => false,
    };

    Ok(Json(StatusResponse { passed }))
}
