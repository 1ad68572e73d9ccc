//! HTTP gateway for Touchline.
//!
//! Exposes the chat endpoint the UI polls each turn, conversation
//! inspection and removal, the agent roster, and a health probe.
//!
//! Built on Axum; a background task evicts idle conversations.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use touchline_agent::Orchestrator;
use touchline_config::AppConfig;
use touchline_core::error::Error;
use touchline_tools::{GoogleSearchBackend, SearchClient};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router.
///
/// Layers applied:
/// - CORS restricted to the configured origins
/// - Request body size limit
/// - HTTP trace logging
pub fn build_router(state: SharedState, config: &AppConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(api::api_router(state))
        .layer(DefaultBodyLimit::max(config.gateway.body_limit_bytes))
        .layer(cors_layer(&config.gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Wire the language model, search client, and session store from
/// `config` into an orchestrator.
pub async fn build_orchestrator(config: &AppConfig) -> Result<Arc<Orchestrator>, Error> {
    let provider = touchline_providers::build_from_config(&config.llm);
    let backend = Arc::new(GoogleSearchBackend::from_config(&config.search)?);
    let search = Arc::new(SearchClient::new(backend, &config.search));
    if !search.is_configured() {
        warn!("Search credentials missing; grounded replies will report search unavailable");
    }
    let store = touchline_memory::build_from_config(&config.session).await?;
    info!(store = store.name(), provider = provider.name(), "Session store ready");
    Ok(Arc::new(Orchestrator::from_config(config, provider, search, store)?))
}

/// Evict idle conversations now and then every `interval`.
pub fn spawn_eviction(
    orchestrator: Arc<Orchestrator>,
    retention: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        // The first tick completes immediately: startup cleanup
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match orchestrator.evict_idle(retention).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Evicted idle conversations"),
                Err(e) => error!(error = %e, "Idle eviction failed"),
            }
        }
    })
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    for missing in config.missing_credentials() {
        warn!(credential = missing, "Credential not set; running degraded");
    }

    let orchestrator = build_orchestrator(&config).await?;
    let eviction = spawn_eviction(
        orchestrator.clone(),
        config.session.retention(),
        Duration::from_secs(config.session.eviction_interval_secs.max(1)),
    );

    let state = Arc::new(GatewayState {
        orchestrator: orchestrator.clone(),
    });
    let app = build_router(state, &config);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    eviction.abort();
    orchestrator.store().teardown().await?;
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
