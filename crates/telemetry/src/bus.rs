//! Runtime event bus: the sole writer of runtime events for one session.
//!
//! Every emit helper first updates the running counters, then appends a
//! record (event plus counter snapshot) to the event log, then broadcasts
//! the event. Counters only grow; a fresh bus starts from zero.

use rand::Rng;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use steward_core::agent::ExecutionMode;
use steward_core::event::{EventBus, EventKind, RuntimeEvent, RuntimeStats};
use tokio::sync::broadcast;
use tracing::debug;

use crate::event_log::{EventLog, LogRecord};

#[derive(Debug, Default)]
struct Counters {
    provider: String,
    model: String,
    mode: ExecutionMode,
    turns: u64,
    steps: u64,
    current_step: u32,
    tool_calls: u64,
    tool_failures: u64,
    input_chars: u64,
    stream_chars: u64,
    reasoning_chars: u64,
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    total_cost_usd: f64,
}

pub struct RuntimeBus {
    session_id: String,
    started: Instant,
    state: Mutex<Counters>,
    log: Option<Arc<EventLog>>,
    events: EventBus,
}

pub struct RuntimeBusBuilder {
    provider: String,
    model: String,
    mode: ExecutionMode,
    log: Option<Arc<EventLog>>,
    events: Option<EventBus>,
    session_id: Option<String>,
}

impl RuntimeBusBuilder {
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append every event to `log`; several buses may share one log.
    pub fn log(mut self, log: impl Into<Arc<EventLog>>) -> Self {
        self.log = Some(log.into());
        self
    }

    /// Publish into an existing channel, so subscribers made before `build`
    /// also see `runtime.started`.
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn build(self) -> RuntimeBus {
        let bus = RuntimeBus {
            session_id: self.session_id.unwrap_or_else(new_session_id),
            started: Instant::now(),
            state: Mutex::new(Counters {
                provider: self.provider,
                model: self.model,
                mode: self.mode,
                ..Counters::default()
            }),
            log: self.log,
            events: self.events.unwrap_or_default(),
        };
        let (provider, model, mode) = {
            let s = bus.state();
            (s.provider.clone(), s.model.clone(), s.mode)
        };
        bus.emit(EventKind::RuntimeStarted {
            session_id: bus.session_id.clone(),
            provider,
            model,
            build_mode: mode.as_str().to_string(),
        });
        bus
    }
}

/// `sess_{unix_secs}_{1000..9999}`
fn new_session_id() -> String {
    let secs = chrono::Utc::now().timestamp();
    let suffix: u16 = rand::rng().random_range(1000..=9999);
    format!("sess_{secs}_{suffix}")
}

fn clamp(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

fn char_len(s: &str) -> u64 {
    s.chars().count() as u64
}

impl RuntimeBus {
    pub fn builder(provider: impl Into<String>, model: impl Into<String>) -> RuntimeBusBuilder {
        RuntimeBusBuilder {
            provider: provider.into(),
            model: model.into(),
            mode: ExecutionMode::default(),
            log: None,
            events: None,
            session_id: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, Counters> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RuntimeEvent>> {
        self.events.subscribe()
    }

    pub fn provider(&self) -> String {
        self.state().provider.clone()
    }

    pub fn model(&self) -> String {
        self.state().model.clone()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.state().mode
    }

    pub fn max_steps(&self) -> u32 {
        self.state().mode.max_steps()
    }

    /// Log and broadcast one event.
    pub fn emit(&self, kind: EventKind) {
        let event = Arc::new(RuntimeEvent::now(kind));
        if let Some(log) = &self.log {
            log.append(&LogRecord::new(&self.session_id, &event, self.stats()));
        }
        debug!(event = event.kind.name(), "runtime event");
        self.events.publish(event);
    }

    pub fn user_turn(&self, text: &str) {
        {
            let mut s = self.state();
            s.turns += 1;
            s.input_chars += char_len(text);
        }
        self.emit(EventKind::TurnUser { text: text.into() });
    }

    pub fn stage(&self, label: &str, detail: &str) {
        self.emit(EventKind::StatusStage {
            label: label.into(),
            detail: detail.into(),
        });
    }

    pub fn clear_stage(&self) {
        self.emit(EventKind::StatusClear);
    }

    pub fn stream_start(&self) {
        let model = self.model();
        self.emit(EventKind::StreamStart { model });
    }

    pub fn stream_token(&self, token: &str) {
        self.state().stream_chars += char_len(token);
        self.emit(EventKind::StreamToken { token: token.into() });
    }

    pub fn stream_end(&self) {
        self.emit(EventKind::StreamEnd);
    }

    pub fn reasoning_start(&self) {
        self.emit(EventKind::ReasoningStart);
    }

    pub fn reasoning_token(&self, token: &str) {
        self.state().reasoning_chars += char_len(token);
        self.emit(EventKind::ReasoningToken { token: token.into() });
    }

    pub fn reasoning_end(&self) {
        self.emit(EventKind::ReasoningEnd);
    }

    pub fn system_message(&self, text: impl Into<String>) {
        self.emit(EventKind::SystemMessage { text: text.into() });
    }

    pub fn tool_plan(&self, count: usize) {
        self.emit(EventKind::ToolPlan { count });
    }

    pub fn tool_call(&self, name: &str, args: &Value, risky: bool) {
        self.state().tool_calls += 1;
        self.emit(EventKind::ToolCall {
            name: name.into(),
            args: args.clone(),
            risky,
        });
    }

    pub fn tool_result(&self, name: &str, result: &str, success: bool, elapsed_ms: f64) {
        if !success {
            self.state().tool_failures += 1;
        }
        self.emit(EventKind::ToolResult {
            name: name.into(),
            result: result.into(),
            success,
            elapsed_ms,
        });
    }

    pub fn step_limit(&self) {
        let max_steps = self.max_steps();
        self.emit(EventKind::StepLimit { max_steps });
    }

    pub fn set_agent_step(&self, step: u32) {
        let max_steps = {
            let mut s = self.state();
            s.steps += 1;
            s.current_step = step;
            s.mode.max_steps()
        };
        self.emit(EventKind::AgentStep { step, max_steps });
    }

    pub fn set_provider(&self, provider: &str) {
        self.state().provider = provider.into();
        self.emit(EventKind::ProviderChanged {
            provider: provider.into(),
        });
    }

    pub fn set_model(&self, model: &str) {
        self.state().model = model.into();
        self.emit(EventKind::ModelChanged { model: model.into() });
    }

    pub fn set_build_mode(&self, mode: ExecutionMode) {
        self.state().mode = mode;
        self.emit(EventKind::ModeChanged {
            build_mode: mode.as_str().into(),
            max_steps: mode.max_steps(),
        });
    }

    /// Accumulate usage. Negative inputs count as zero; a non-positive
    /// total is derived from prompt plus completion.
    pub fn add_usage(&self, prompt: i64, completion: i64, total: i64, cost_usd: f64) {
        let prompt = clamp(prompt);
        let completion = clamp(completion);
        let total = match clamp(total) {
            0 => prompt + completion,
            t => t,
        };
        let cost = if cost_usd.is_finite() { cost_usd.max(0.0) } else { 0.0 };
        {
            let mut s = self.state();
            s.prompt_tokens += prompt;
            s.completion_tokens += completion;
            s.total_tokens += total;
            s.total_cost_usd += cost;
        }
        self.emit(EventKind::UsageTokens {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
            cost_usd: cost,
        });
    }

    pub fn session_switched(&self, session_id: &str, title: &str) {
        self.emit(EventKind::SessionSwitched {
            session_id: session_id.into(),
            title: title.into(),
        });
    }

    /// Snapshot of every counter.
    pub fn stats(&self) -> RuntimeStats {
        let s = self.state();
        RuntimeStats {
            session_id: self.session_id.clone(),
            provider: s.provider.clone(),
            model: s.model.clone(),
            turns: s.turns,
            steps: s.steps,
            current_step: s.current_step,
            tool_calls: s.tool_calls,
            tool_failures: s.tool_failures,
            input_chars: s.input_chars,
            stream_chars: s.stream_chars,
            reasoning_chars: s.reasoning_chars,
            prompt_tokens: s.prompt_tokens,
            completion_tokens: s.completion_tokens,
            total_tokens: s.total_tokens,
            total_cost_usd: (s.total_cost_usd * 1e8).round() / 1e8,
            uptime_s: (self.started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0,
        }
    }

    pub fn finish(&self, reason: &str) {
        let stats = self.stats();
        self.emit(EventKind::RuntimeFinished {
            reason: reason.into(),
            stats,
        });
    }
}
