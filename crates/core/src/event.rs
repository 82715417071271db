//! Runtime events: the typed record of everything an agent session does.
//!
//! Events are produced by the runtime bus (the sole writer) and fanned out
//! to subscribers over a broadcast channel. Subscribers that lag or go away
//! never hold the loop back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A timestamped runtime event.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RuntimeEvent {
    pub fn now(kind: EventKind) -> Self {
        Self { at: Utc::now(), kind }
    }
}

/// Every kind of event a session can emit.
///
/// Serialized as `{"event": "<dotted.name>", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum EventKind {
    #[serde(rename = "runtime.started")]
    RuntimeStarted {
        session_id: String,
        provider: String,
        model: String,
        build_mode: String,
    },

    #[serde(rename = "turn.user")]
    TurnUser { text: String },

    #[serde(rename = "status.stage")]
    StatusStage { label: String, detail: String },

    #[serde(rename = "status.clear")]
    StatusClear,

    #[serde(rename = "assistant.stream.start")]
    StreamStart { model: String },

    #[serde(rename = "assistant.stream.token")]
    StreamToken { token: String },

    #[serde(rename = "assistant.stream.end")]
    StreamEnd,

    #[serde(rename = "assistant.reasoning.start")]
    ReasoningStart,

    #[serde(rename = "assistant.reasoning.token")]
    ReasoningToken { token: String },

    #[serde(rename = "assistant.reasoning.end")]
    ReasoningEnd,

    #[serde(rename = "system.message")]
    SystemMessage { text: String },

    #[serde(rename = "tool.plan")]
    ToolPlan { count: usize },

    #[serde(rename = "tool.call")]
    ToolCall {
        name: String,
        args: serde_json::Value,
        risky: bool,
    },

    #[serde(rename = "tool.result")]
    ToolResult {
        name: String,
        result: String,
        success: bool,
        elapsed_ms: f64,
    },

    #[serde(rename = "agent.limit")]
    StepLimit { max_steps: u32 },

    #[serde(rename = "agent.step")]
    AgentStep { step: u32, max_steps: u32 },

    #[serde(rename = "runtime.provider.changed")]
    ProviderChanged { provider: String },

    #[serde(rename = "runtime.model.changed")]
    ModelChanged { model: String },

    #[serde(rename = "runtime.mode.changed")]
    ModeChanged { build_mode: String, max_steps: u32 },

    #[serde(rename = "usage.tokens")]
    UsageTokens {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        cost_usd: f64,
    },

    #[serde(rename = "session.switched")]
    SessionSwitched { session_id: String, title: String },

    #[serde(rename = "runtime.finished")]
    RuntimeFinished { reason: String, stats: RuntimeStats },
}

impl EventKind {
    /// The dotted wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RuntimeStarted { .. } => "runtime.started",
            Self::TurnUser { .. } => "turn.user",
            Self::StatusStage { .. } => "status.stage",
            Self::StatusClear => "status.clear",
            Self::StreamStart { .. } => "assistant.stream.start",
            Self::StreamToken { .. } => "assistant.stream.token",
            Self::StreamEnd => "assistant.stream.end",
            Self::ReasoningStart => "assistant.reasoning.start",
            Self::ReasoningToken { .. } => "assistant.reasoning.token",
            Self::ReasoningEnd => "assistant.reasoning.end",
            Self::SystemMessage { .. } => "system.message",
            Self::ToolPlan { .. } => "tool.plan",
            Self::ToolCall { .. } => "tool.call",
            Self::ToolResult { .. } => "tool.result",
            Self::StepLimit { .. } => "agent.limit",
            Self::AgentStep { .. } => "agent.step",
            Self::ProviderChanged { .. } => "runtime.provider.changed",
            Self::ModelChanged { .. } => "runtime.model.changed",
            Self::ModeChanged { .. } => "runtime.mode.changed",
            Self::UsageTokens { .. } => "usage.tokens",
            Self::SessionSwitched { .. } => "session.switched",
            Self::RuntimeFinished { .. } => "runtime.finished",
        }
    }

    /// The payload object alone, `{}` for payload-less events.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => map
                .remove("payload")
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            _ => serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Snapshot of a session's running counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeStats {
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub turns: u64,
    /// Steps taken across every turn of this bus.
    pub steps: u64,
    /// Step number within the running turn.
    pub current_step: u32,
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub input_chars: u64,
    pub stream_chars: u64,
    pub reasoning_chars: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub uptime_s: f64,
}

/// A broadcast-based fan-out for runtime events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Clones share
/// the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<RuntimeEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: Arc<RuntimeEvent>) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RuntimeEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
