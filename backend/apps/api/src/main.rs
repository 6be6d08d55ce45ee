//! API Server Entry Point
//!
//! Builds every collaborator once, wires the admission and briefing
//! routers, and serves them. Uses `anyhow` for startup errors only;
//! request-level errors render through `kernel::error::AppError`.

use admission::{
    AdmissionAppState, AdmissionConfig, AdmissionController, KvPowSessionRepository,
    admission_router,
};
use anyhow::{Context, bail};
use axum::{
    Router, http,
    http::{HeaderName, Method, header},
};
use briefing::infra::{
    GeminiClient, GeminiConfig, GraphConfig, HttpGraphClient, KvUsageRecorder, TavilyConfig,
    TavilySearchClient,
};
use briefing::{
    AgentOrchestrator, BriefingAppState, BriefingConfig, BriefingStream, ToolDispatcher,
    briefing_router,
};
use platform::client::IdentityConfig;
use platform::config::{env_or, env_string};
use platform::crypto::from_base64;
use platform::kv::{KvStore, MemoryKvStore, UpstashConfig, UpstashKvStore};
use platform::rate_limit::{RateLimitConfig, RateLimiter};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "api=info,admission=info,briefing=info,platform=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Shared store: Upstash when configured, process memory otherwise
    match UpstashConfig::from_env() {
        Some(config) => {
            tracing::info!(url = %config.rest_url, "Using Upstash store");
            serve(Arc::new(UpstashKvStore::new(config)?)).await
        }
        None => {
            if !cfg!(debug_assertions) {
                bail!("UPSTASH_REDIS_REST_URL and UPSTASH_REDIS_REST_TOKEN must be set in production");
            }
            tracing::warn!("No shared store configured, using in-memory store");
            serve(Arc::new(MemoryKvStore::new())).await
        }
    }
}

async fn serve<K>(store: Arc<K>) -> anyhow::Result<()>
where
    K: KvStore + Sync + 'static,
{
    let identity = Arc::new(IdentityConfig::from_env());
    if identity.trust_user_header {
        tracing::info!("Trusting X-User-Id / X-User-Tier from the proxy");
    }

    // Admission
    let admission_config = Arc::new(AdmissionConfig::from_env(session_secret()?));
    tracing::info!(
        difficulty = %admission_config.difficulty,
        session_ttl_secs = admission_config.session_ttl.as_secs(),
        "Admission configured"
    );
    let controller = AdmissionController::new(
        Arc::new(KvPowSessionRepository::new(store.clone())),
        admission_config,
    );

    // Collaborators
    let gemini_config = GeminiConfig::from_env().context("GEMINI_API_KEY must be set")?;
    let model = Arc::new(GeminiClient::new(gemini_config)?);
    tracing::info!(model = model.model(), "Model backend configured");

    let search = TavilyConfig::from_env()
        .map(TavilySearchClient::new)
        .transpose()?
        .map(Arc::new);
    let graph = GraphConfig::from_env()
        .map(HttpGraphClient::new)
        .transpose()?
        .map(Arc::new);
    tracing::info!(
        web_search = search.is_some(),
        graph = graph.is_some(),
        "Tool collaborators configured"
    );

    let briefing_config = Arc::new(BriefingConfig::from_env());
    let tools = Arc::new(ToolDispatcher::new(
        search,
        graph,
        briefing_config.tool_timeout,
    ));
    let limits = Arc::new(briefing_config.limits.clone());
    let stream = BriefingStream::new(
        AgentOrchestrator::new(model, tools, briefing_config),
        Arc::new(KvUsageRecorder::new(store.clone())),
    );

    let admission_state = AdmissionAppState {
        controller: controller.clone(),
        challenge_limiter: RateLimiter::new(
            store.clone(),
            Arc::new(RateLimitConfig::challenge_from_env()),
        ),
        identity: identity.clone(),
    };
    let briefing_state = BriefingAppState {
        admission: controller,
        limiter: RateLimiter::new(store, Arc::new(RateLimitConfig::briefing_from_env())),
        stream,
        identity,
        limits,
    };

    // Build router
    let app = Router::new()
        .nest("/api/pow", admission_router(admission_state))
        .nest("/api/briefing", briefing_router(briefing_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors());

    // Start server
    let addr: SocketAddr = env_or("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 31113)));
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// `SESSION_SECRET` (base64, 32 bytes); random in debug builds when unset
fn session_secret() -> anyhow::Result<[u8; 32]> {
    let Some(encoded) = env_string("SESSION_SECRET") else {
        if cfg!(debug_assertions) {
            tracing::warn!("SESSION_SECRET not set, tokens will not survive a restart");
            return Ok(AdmissionConfig::with_random_secret().session_secret);
        }
        bail!("SESSION_SECRET must be set in production");
    };

    let bytes = from_base64(&encoded).context("SESSION_SECRET is not valid base64")?;
    let secret: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("SESSION_SECRET must be 32 bytes, got {}", b.len()))?;
    Ok(secret)
}

fn cors() -> CorsLayer {
    let frontend_origins = env_string("FRONTEND_ORIGINS")
        .unwrap_or_else(|| "http://localhost:40922,http://127.0.0.1:40922".to_string());

    let allowed_origins: Vec<http::HeaderValue> = frontend_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-session-token"),
        ]))
}
