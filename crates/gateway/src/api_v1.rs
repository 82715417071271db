//! v1 REST API.
//!
//! Endpoints:
//! - `GET  /v1/tools`: tool catalog with risk flags
//! - `POST /v1/tools/{name}/call`: ticket-gated tool execution
//! - `POST /v1/chat/stream`: one agent turn, streamed as SSE
//! - `GET  /v1/sessions`: saved sessions, newest first
//! - `GET  /v1/sessions/{id}`: one saved session
//! - `DELETE /v1/sessions/{id}`: remove a saved session

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use steward_agent::AgentLoop;
use steward_config::AppConfig;
use steward_core::error::SessionError;
use steward_core::event::{EventBus, RuntimeEvent};
use steward_core::provider::Provider;
use steward_core::session::{Session, SessionStore, SessionSummary};
use steward_core::tool::ToolRegistry;
use steward_core::ExecutionMode;
use steward_security::{
    ApprovalDecision, ApprovalGate, ApprovalPayload, AuditLogger, RiskPolicy, TicketStore,
    ToolCallResponse, ToolExecutor, ToolInfo,
};
use steward_telemetry::{EventLog, PricingTable, RuntimeBus};

/// Everything the v1 handlers share.
pub struct GatewayState {
    pub config: AppConfig,
    /// `None` when no provider could be built; chat answers 503.
    pub provider: Option<Arc<dyn Provider>>,
    pub provider_name: String,
    pub model: String,
    pub tools: Arc<ToolRegistry>,
    pub policy: Arc<RiskPolicy>,
    pub executor: ToolExecutor,
    pub audit: Arc<AuditLogger>,
    pub sessions: Arc<dyn SessionStore>,
    pub pricing: Arc<PricingTable>,
    pub event_log: Option<Arc<EventLog>>,
    pub start_time: DateTime<Utc>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// State without a provider or event log.
    pub fn new(config: AppConfig, tools: Arc<ToolRegistry>, sessions: Arc<dyn SessionStore>) -> Self {
        let policy = Arc::new(RiskPolicy::from_config(&config));
        let audit = Arc::new(AuditLogger::traced());
        let tickets = Arc::new(TicketStore::new(config.approval.ticket_ttl_secs));
        let executor = ToolExecutor::new(tools.clone(), policy.clone(), tickets, audit.clone());
        let pricing = Arc::new(PricingTable::from_config(&config.pricing));
        Self {
            provider_name: config.agent.provider.clone(),
            model: config.agent.model.clone().unwrap_or_default(),
            config,
            provider: None,
            tools,
            policy,
            executor,
            audit,
            sessions,
            pricing,
            event_log: None,
            start_time: Utc::now(),
        }
    }

    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        model: impl Into<String>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        self.provider_name = name.into();
        self.model = model.into();
        self.provider = Some(provider);
        self
    }

    pub fn with_event_log(mut self, log: Arc<EventLog>) -> Self {
        self.event_log = Some(log);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn session_error(e: SessionError) -> ApiError {
    match e {
        SessionError::InvalidId(_) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        other => {
            warn!(error = %other, "Session store failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Build the v1 router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/{name}/call", post(call_tool))
        .route("/chat/stream", post(chat_stream))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .with_state(state)
}

// ── Tools ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolInfo>,
    pub count: usize,
}

async fn list_tools(State(state): State<SharedState>) -> Json<ToolsResponse> {
    let tools = state.executor.list_tools();
    Json(ToolsResponse {
        count: tools.len(),
        tools,
    })
}

/// `{"args": {...}, "dry_run": bool, "confirm": bool, "approval_id": "...", "actor": "..."}`
#[derive(Debug, Deserialize)]
pub struct ToolCallBody {
    #[serde(default)]
    pub args: Value,
    #[serde(flatten)]
    pub approval: ApprovalPayload,
}

async fn call_tool(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(body): Json<ToolCallBody>,
) -> Result<Json<ToolCallResponse>, ApiError> {
    if !(body.args.is_null() || body.args.is_object()) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "args must be a JSON object",
        ));
    }
    Ok(Json(state.executor.call(&name, body.args, body.approval).await))
}

// ── Chat ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Empty starts a new session.
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub auto_approve: bool,
    #[serde(default)]
    pub mode: Option<ExecutionMode>,
}

/// Run one turn and stream its runtime events.
///
/// The first SSE event is `session` with the session id; the stream ends
/// after `runtime.finished`.
async fn chat_stream(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message is required"));
    }
    let Some(provider) = state.provider.clone() else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "no provider configured; set an API key and restart the gateway",
        ));
    };

    let existing = if req.session_id.is_empty() {
        None
    } else {
        state.sessions.load(&req.session_id).await.map_err(session_error)?
    };
    let mode = req
        .mode
        .or(existing.as_ref().map(|s| s.mode))
        .unwrap_or(state.config.agent.mode);

    let events = EventBus::default();
    let rx = events.subscribe();
    let mut builder = RuntimeBus::builder(&state.provider_name, &state.model)
        .mode(mode)
        .events(events);
    if !req.session_id.is_empty() {
        builder = builder.session_id(req.session_id.clone());
    }
    if let Some(log) = &state.event_log {
        builder = builder.log(log.clone());
    }
    let bus = Arc::new(builder.build());

    let gate = ApprovalGate::new(state.policy.clone())
        .with_audit(state.audit.clone())
        .with_actor("gateway")
        .with_auto_approve(req.auto_approve)
        .with_decider(Arc::new(remote_decider(bus.clone())));

    let mut settings = state.config.agent.clone();
    settings.auto_approve = req.auto_approve;
    let mut agent = AgentLoop::builder(provider, state.tools.clone(), bus.clone(), state.sessions.clone())
        .gate(Arc::new(gate))
        .settings(settings)
        .pricing(state.pricing.clone());
    if let Some(session) = existing {
        agent = agent.session(session);
    }
    let mut agent = agent.build();
    let session_id = agent.session().id.clone();
    info!(session = %session_id, auto_approve = req.auto_approve, "Chat turn started");

    let message = req.message;
    tokio::spawn(async move {
        let reason = match agent.run_turn(&message).await {
            Ok(report) => report.outcome.reason(),
            Err(e) => {
                warn!(error = %e, "Session save failed after chat turn");
                bus.system_message(format!("Session save failed: {e}"));
                "error"
            }
        };
        bus.finish(reason);
    });

    let opening = SseEvent::default()
        .event("session")
        .data(json!({ "session_id": session_id }).to_string());
    let updates = BroadcastStream::new(rx)
        .filter_map(|item| item.ok())
        .map(|event| Ok(to_sse(&event)));
    let stream = tokio_stream::once(Ok(opening)).chain(updates);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Remote chat has nobody to ask: risky calls are refused and announced.
fn remote_decider(
    bus: Arc<RuntimeBus>,
) -> impl Fn(&str, &Value) -> ApprovalDecision + Send + Sync + 'static {
    move |tool: &str, _args: &Value| {
        bus.system_message(format!("approval_required: {tool}"));
        ApprovalDecision::reject(format!(
            "{tool} requires approval. Confirm it via POST /v1/tools/{tool}/call or resend with auto_approve."
        ))
    }
}

fn to_sse(event: &RuntimeEvent) -> SseEvent {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".into());
    SseEvent::default().event(event.kind.name()).data(data)
}

// ── Sessions ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub count: usize,
}

async fn list_sessions(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = state.sessions.list(params.limit).await.map_err(session_error)?;
    Ok(Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    }))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    match state.sessions.load(&id).await.map_err(session_error)? {
        Some(session) => Ok(Json(session)),
        None => Err(api_error(StatusCode::NOT_FOUND, "session not found")),
    }
}

async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.sessions.delete(&id).await.map_err(session_error)? {
        info!(session = %id, "Session deleted");
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "session not found"))
    }
}
