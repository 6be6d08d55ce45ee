//! HTTP Handlers

use admission::{AdmissionController, AdmissionRequest, PowSessionRepository};
use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, header};
use axum::response::{IntoResponse, Response};
use kernel::error::app_error::AppError;
use kernel::id::RequestId;
use platform::client::{ClientIdentity, ClientIp, IdentityConfig, resolve_identity};
use platform::kv::KvStore;
use platform::rate_limit::RateLimiter;
use std::convert::Infallible;
use std::sync::Arc;

use crate::application::config::ValidationLimits;
use crate::application::stream::BriefingStream;
use crate::application::validate::validate;
use crate::domain::conversation::{BriefingRequest, UncheckedBriefing};
use crate::domain::repository::{ModelBackend, ToolExecutor, UsageRecorder};
use crate::error::{BriefingError, BriefingResult};
use crate::presentation::dto::BriefingRequestDto;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Shared state for the briefing handler
pub struct BriefingAppState<S, K, M, T, R>
where
    S: PowSessionRepository,
    K: KvStore,
    M: ModelBackend,
    T: ToolExecutor,
    R: UsageRecorder,
{
    pub admission: AdmissionController<S>,
    /// Global and per-identity gates
    pub limiter: RateLimiter<K>,
    pub stream: BriefingStream<M, T, R>,
    pub identity: Arc<IdentityConfig>,
    pub limits: Arc<ValidationLimits>,
}

impl<S, K, M, T, R> Clone for BriefingAppState<S, K, M, T, R>
where
    S: PowSessionRepository,
    K: KvStore,
    M: ModelBackend,
    T: ToolExecutor,
    R: UsageRecorder,
{
    fn clone(&self) -> Self {
        Self {
            admission: self.admission.clone(),
            limiter: self.limiter.clone(),
            stream: self.stream.clone(),
            identity: self.identity.clone(),
            limits: self.limits.clone(),
        }
    }
}

/// POST /api/briefing
///
/// Admission, rate limiting and validation answer with plain HTTP errors.
/// Once they pass, the response is a 200 event stream.
pub async fn create_briefing<S, K, M, T, R>(
    State(state): State<BriefingAppState<S, K, M, T, R>>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> BriefingResult<Response>
where
    S: PowSessionRepository + Sync + 'static,
    K: KvStore + Sync + 'static,
    M: ModelBackend + Sync + 'static,
    T: ToolExecutor + Sync + 'static,
    R: UsageRecorder + Sync + 'static,
{
    let dto: BriefingRequestDto = serde_json::from_slice(&body)?;
    let identity = resolve_identity(&headers, client_ip, &state.identity);
    let (credentials, unchecked) = dto.into_parts();

    let admission = state
        .admission
        .admit(AdmissionRequest {
            session_token: credentials.session_token.as_deref(),
            solution: credentials.solution.as_ref(),
            identity_key: &identity.key,
        })
        .await?;

    let request = match gate(&state, &identity, unchecked).await {
        Ok(request) => request,
        Err(e) => return Ok(reject_after_admission(e, admission.minted_token)),
    };

    let request_id = RequestId::new();
    let span = tracing::info_span!("briefing", request_id = %request_id, identity = %identity);
    let mut events = span.in_scope(|| {
        tracing::info!(
            event_id = %request.context.id,
            admission = ?admission.state,
            history = request.history.len(),
            "Briefing started"
        );
        state.stream.start(request, admission.minted_token)
    });

    let body = stream! {
        while let Some(event) = events.recv().await {
            yield Ok::<_, Infallible>(Bytes::from(event.encode()));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

/// Checks that run after admission and before any model cost
async fn gate<S, K, M, T, R>(
    state: &BriefingAppState<S, K, M, T, R>,
    identity: &ClientIdentity,
    unchecked: UncheckedBriefing,
) -> BriefingResult<BriefingRequest>
where
    S: PowSessionRepository + Sync,
    K: KvStore + Sync,
    M: ModelBackend,
    T: ToolExecutor,
    R: UsageRecorder,
{
    let status = state.limiter.check(identity).await?;
    tracing::debug!(
        identity = %identity,
        limit = status.limit,
        remaining = ?status.remaining,
        "Rate limit passed"
    );
    Ok(validate(unchecked, &state.limits)?)
}

/// A token minted by this request still reaches the client when a later
/// check rejects it.
fn reject_after_admission(error: BriefingError, minted_token: Option<String>) -> Response {
    error.log();
    let mut app_error = AppError::from(error);
    if let Some(token) = minted_token {
        app_error = app_error.with_detail("sessionToken", token);
    }
    app_error.into_response()
}
