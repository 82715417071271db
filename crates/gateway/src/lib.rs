//! HTTP gateway for Steward.
//!
//! Exposes a health check and the v1 API: the tool catalog, ticket-gated
//! tool calls, streamed chat turns and saved sessions.
//!
//! Built on Axum.

pub mod api_v1;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, extract::State, response::Json, routing::get};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use steward_config::AppConfig;
use steward_providers::ResolvedProvider;
use steward_session::FileSessionStore;
use steward_telemetry::EventLog;

pub use api_v1::{GatewayState, SharedState};

/// Build the full router.
///
/// Layers applied:
/// - CORS limited to the local UI origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_static(
            "http://localhost:8080",
        )))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// A missing provider key is not fatal: tools and sessions still work and
/// chat answers 503.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let tools = Arc::new(steward_tools::default_registry(&config.storage.workspace_dir));
    let sessions = Arc::new(FileSessionStore::new(&config.storage.history_dir));
    let log = Arc::new(EventLog::from_config(&config.storage));
    let resolved = ResolvedProvider::resolve(&config, None, &|var| std::env::var(var).ok());

    let mut state = GatewayState::new(config.clone(), tools, sessions).with_event_log(log);
    match resolved.build() {
        Ok(provider) => {
            info!(provider = %resolved.provider, model = %resolved.model, "Provider ready");
            state = state.with_provider(&resolved.provider, &resolved.model, provider);
        }
        Err(e) => warn!(error = %e, "No provider; chat is disabled"),
    }

    let app = build_router(Arc::new(state));
    info!(%addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
    model: String,
    chat_ready: bool,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider_name.clone(),
        model: state.model.clone(),
        chat_ready: state.provider.is_some(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}
