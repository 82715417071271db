//! The agent step loop.
//!
//! One `AgentLoop` owns one active session and runs one turn at a time:
//! stream a reply, and while the model asks for tools, pass each call
//! through the approval gate and the dispatcher, append the results and
//! stream again. A turn ends when the model answers without tools, the
//! cancel flag is raised, the provider fails, or the mode's step ceiling
//! is reached. The session is persisted before every return.

use std::sync::Arc;
use std::time::Instant;

use steward_config::AgentSettings;
use steward_core::agent::{ExecutionMode, TurnOutcome, TurnReport};
use steward_core::cancel::CancelFlag;
use steward_core::error::{Error, ProviderError, SessionError};
use steward_core::message::{Message, Role, ToolCallRequest};
use steward_core::provider::{Provider, ProviderRequest, Usage};
use steward_core::session::{Session, SessionStore, derive_title};
use steward_core::tool::ToolRegistry;
use steward_security::{ApprovalGate, RiskPolicy, Verdict};
use steward_telemetry::{PricingTable, RuntimeBus};
use tracing::{info, warn};

use crate::aggregator::{StreamOutcome, aggregate};
use crate::dispatcher::ToolDispatcher;

/// A ready-to-use provider together with the names it runs under.
pub struct ProviderHandle {
    pub name: String,
    pub model: String,
    pub provider: Arc<dyn Provider>,
}

/// Builds a provider by name; used for `/provider` and session switches.
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> Result<ProviderHandle, ProviderError> + Send + Sync>;

/// Keep the system message plus the last `rounds * 2` messages.
///
/// Tool messages left at the head of the window lost the assistant message
/// that requested them and are dropped too.
pub fn trim_history(messages: &mut Vec<Message>, rounds: usize) {
    let max_messages = rounds.max(1) * 2 + 1;
    if messages.len() <= max_messages {
        return;
    }
    let tail_start = messages.len() - (max_messages - 1);
    let mut kept = Vec::with_capacity(max_messages);
    kept.push(messages[0].clone());
    kept.extend(
        messages[tail_start..]
            .iter()
            .skip_while(|m| m.role == Role::Tool)
            .cloned(),
    );
    *messages = kept;
}

pub struct AgentLoopBuilder {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    bus: Arc<RuntimeBus>,
    store: Arc<dyn SessionStore>,
    gate: Option<Arc<ApprovalGate>>,
    settings: AgentSettings,
    pricing: Option<Arc<PricingTable>>,
    cancel: CancelFlag,
    session: Option<Session>,
    factory: Option<ProviderFactory>,
}

impl AgentLoopBuilder {
    pub fn gate(mut self, gate: Arc<ApprovalGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn pricing(mut self, pricing: Arc<PricingTable>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start from an existing session instead of a fresh one.
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn build(self) -> AgentLoop {
        let session = self.session.unwrap_or_else(|| {
            Session::new(
                self.bus.session_id(),
                self.bus.provider(),
                self.bus.model(),
                self.bus.mode(),
                self.settings.system_prompt.clone(),
            )
        });
        let gate = self.gate.unwrap_or_else(|| {
            Arc::new(
                ApprovalGate::new(Arc::new(RiskPolicy::default()))
                    .with_auto_approve(self.settings.auto_approve),
            )
        });
        AgentLoop {
            provider: self.provider,
            dispatcher: ToolDispatcher::from_settings(self.registry, &self.settings),
            gate,
            bus: self.bus,
            store: self.store,
            pricing: self
                .pricing
                .unwrap_or_else(|| Arc::new(PricingTable::with_defaults())),
            cancel: self.cancel,
            settings: self.settings,
            session,
            new_session_seq: 1,
            factory: self.factory,
        }
    }
}

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    dispatcher: ToolDispatcher,
    gate: Arc<ApprovalGate>,
    bus: Arc<RuntimeBus>,
    store: Arc<dyn SessionStore>,
    pricing: Arc<PricingTable>,
    cancel: CancelFlag,
    settings: AgentSettings,
    session: Session,
    new_session_seq: u32,
    factory: Option<ProviderFactory>,
}

impl AgentLoop {
    pub fn builder(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        bus: Arc<RuntimeBus>,
        store: Arc<dyn SessionStore>,
    ) -> AgentLoopBuilder {
        AgentLoopBuilder {
            provider,
            registry,
            bus,
            store,
            gate: None,
            settings: AgentSettings::default(),
            pricing: None,
            cancel: CancelFlag::new(),
            session: None,
            factory: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn bus(&self) -> &Arc<RuntimeBus> {
        &self.bus
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn pricing(&self) -> &Arc<PricingTable> {
        &self.pricing
    }

    /// A handle that cancels the running turn.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run one user turn to completion.
    pub async fn run_turn(&mut self, input: &str) -> Result<TurnReport, SessionError> {
        let text = input.trim_start_matches('\u{feff}').trim();
        if text.is_empty() {
            return Ok(TurnReport {
                outcome: TurnOutcome::Done,
                steps: 0,
            });
        }

        self.session.push(Message::user(text));
        self.bus.user_turn(text);
        self.bus.stage("preparing request", "building context");
        self.cancel.reset();

        let max_steps = self.bus.max_steps();
        let mut steps = 0;
        let mut outcome = None;

        while steps < max_steps {
            steps += 1;
            self.bus.set_agent_step(steps);
            self.bus
                .stage("model reasoning", &format!("step {steps}/{max_steps}"));
            trim_history(&mut self.session.messages, self.settings.max_history_rounds);

            let request = ProviderRequest {
                model: self.bus.model(),
                messages: self.session.messages.clone(),
                temperature: self.settings.temperature,
                tools: self.registry().definitions(),
                stream: true,
            };

            match aggregate(self.provider.as_ref(), request, &self.bus, &self.cancel).await {
                Err(e) => {
                    warn!(session_id = %self.session.id, error = %e, "Provider call failed");
                    self.bus.clear_stage();
                    self.bus.system_message(format!("API call failed: {e}"));
                    outcome = Some(TurnOutcome::Error(e.to_string()));
                    break;
                }
                Ok(StreamOutcome::Cancelled { usage }) => {
                    self.record_usage(usage);
                    self.bus.clear_stage();
                    self.bus.system_message("Generation cancelled");
                    outcome = Some(TurnOutcome::Cancelled);
                    break;
                }
                Ok(StreamOutcome::Complete(aggregated)) => {
                    self.record_usage(aggregated.usage);
                    if !aggregated.has_tool_calls() {
                        self.session.push(aggregated.message);
                        outcome = Some(TurnOutcome::Done);
                        break;
                    }
                    let calls = aggregated.message.tool_calls.clone();
                    self.session.push(aggregated.message);
                    self.run_tool_calls(&calls).await;
                    self.bus
                        .stage("continuing", &format!("{} tool(s) done", calls.len()));
                }
            }
        }

        let outcome = outcome.unwrap_or_else(|| {
            self.bus.step_limit();
            TurnOutcome::StepLimitReached
        });
        info!(
            session_id = %self.session.id,
            steps,
            outcome = outcome.reason(),
            "Turn finished"
        );

        self.persist().await?;
        Ok(TurnReport { outcome, steps })
    }

    fn record_usage(&self, usage: Usage) {
        let model = self.bus.model();
        let cost = self.pricing.compute_cost(
            &model,
            u64::from(usage.prompt_tokens),
            u64::from(usage.completion_tokens),
        );
        self.bus.add_usage(
            i64::from(usage.prompt_tokens),
            i64::from(usage.completion_tokens),
            i64::from(usage.total_tokens),
            cost,
        );
    }

    async fn run_tool_calls(&mut self, calls: &[ToolCallRequest]) {
        self.bus.tool_plan(calls.len());

        for call in calls {
            let args = call.parsed_arguments();
            let risky = self.gate.is_risky(&call.name);
            self.bus.tool_call(&call.name, &args, risky);

            let started = Instant::now();
            let result = match self.gate.check(&call.name, args).await {
                Verdict::Run(args) => self.dispatcher.dispatch(&call.name, args, &self.bus).await,
                Verdict::Skip(message) => message,
            };
            self.bus.clear_stage();
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            let success = !result.starts_with("Error");
            self.bus.tool_result(&call.name, &result, success, elapsed_ms);
            self.session
                .push(Message::tool_result(&call.id, &call.name, result));
        }
    }

    /// Save the active session.
    pub async fn persist(&mut self) -> Result<(), SessionError> {
        self.session.provider = self.bus.provider();
        self.session.model = self.bus.model();
        self.session.mode = self.bus.mode();
        self.store.save(&self.session).await
    }

    /// Start an empty session with id `{bus_id}_c{n}`.
    pub async fn new_session(&mut self) -> Result<String, SessionError> {
        let id = format!("{}_c{}", self.bus.session_id(), self.new_session_seq);
        self.new_session_seq += 1;
        self.session = Session::new(
            id.clone(),
            self.bus.provider(),
            self.bus.model(),
            self.bus.mode(),
            self.settings.system_prompt.clone(),
        );
        self.bus.system_message(format!("New session: {id}"));
        self.bus.session_switched(&id, "new session");
        self.persist().await?;
        Ok(id)
    }

    /// Make a stored session the active one. `Ok(false)` when it does not
    /// exist or holds no messages.
    pub async fn switch_session(&mut self, id: &str) -> Result<bool, SessionError> {
        let loaded = match self.store.load(id).await {
            Ok(loaded) => loaded,
            Err(SessionError::InvalidId(_)) => None,
            Err(e) => return Err(e),
        };
        let Some(session) = loaded else {
            self.bus.system_message(format!("Session not found: {id}"));
            return Ok(false);
        };
        if session.messages.is_empty() {
            self.bus
                .system_message(format!("Session is empty or corrupt: {id}"));
            return Ok(false);
        }
        self.adopt(session);
        let title = self.session.summary().title;
        self.bus
            .system_message(format!("Switched to session {} · {title}", self.session.id));
        self.bus.session_switched(&self.session.id, &title);
        self.persist().await?;
        Ok(true)
    }

    /// Continue the most recently saved session, if it has any history.
    pub async fn resume_latest(&mut self) -> Result<bool, SessionError> {
        let Some(id) = self.store.latest_id().await? else {
            return Ok(false);
        };
        let Some(session) = self.store.load(&id).await? else {
            return Ok(false);
        };
        if session.messages.len() <= 1 {
            return Ok(false);
        }
        self.adopt(session);
        self.bus.system_message(format!(
            "Restored {} messages · session={}",
            self.session.messages.len() - 1,
            self.session.id
        ));
        let title = derive_title(&self.session.messages);
        self.bus.session_switched(&self.session.id, &title);
        Ok(true)
    }

    /// Take over a loaded session along with its provider, model and mode.
    fn adopt(&mut self, session: Session) {
        if !session.provider.is_empty() && session.provider != self.bus.provider() {
            match self.factory.as_ref().map(|f| f(&session.provider)) {
                Some(Ok(handle)) => {
                    self.provider = handle.provider;
                    self.bus.set_provider(&handle.name);
                }
                Some(Err(e)) => {
                    self.bus
                        .system_message(format!("Could not restore provider, keeping current: {e}"));
                }
                None => {}
            }
        }
        if !session.model.is_empty() && session.model != self.bus.model() {
            self.bus.set_model(&session.model);
        }
        if session.mode != self.bus.mode() {
            self.bus.set_build_mode(session.mode);
        }
        self.session = session;
    }

    /// Switch to another provider by name and adopt its default model.
    pub async fn switch_provider(&mut self, name: &str) -> Result<String, Error> {
        let factory = self
            .factory
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("provider switching is unavailable".into()))?;
        let handle = factory(name)?;
        self.provider = handle.provider;
        self.bus.set_provider(&handle.name);
        if !handle.model.is_empty() {
            self.bus.set_model(&handle.model);
        }
        self.persist().await?;
        Ok(handle.name)
    }

    /// Change the model; announces the rates it will be billed at.
    pub async fn set_model(&mut self, model: &str) -> Result<(), SessionError> {
        self.bus.set_model(model);
        let snap = self.pricing.snapshot(model);
        self.bus.system_message(format!(
            "pricing: prompt=${}/1M, completion=${}/1M",
            snap.prompt_usd_per_1m, snap.completion_usd_per_1m
        ));
        self.persist().await
    }

    pub async fn set_mode(&mut self, mode: ExecutionMode) -> Result<(), SessionError> {
        self.bus.set_build_mode(mode);
        self.persist().await
    }

    /// Persist and close the runtime log for this loop.
    pub async fn shutdown(&mut self, reason: &str) -> Result<(), SessionError> {
        let saved = self.persist().await;
        self.bus.finish(reason);
        saved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedProvider, ScriptedReply};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use steward_core::error::ToolError;
    use steward_core::event::EventKind;
    use steward_core::tool::Tool;
    use steward_security::ApprovalDecision;
    use steward_session::InMemorySessionStore;
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo the text argument"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
            Ok(arguments["text"].as_str().unwrap_or("<none>").to_string())
        }
    }

    struct Harness {
        agent: AgentLoop,
        provider: Arc<ScriptedProvider>,
        store: InMemorySessionStore,
        events: tokio::sync::broadcast::Receiver<Arc<steward_core::RuntimeEvent>>,
    }

    /// Reads files under a fixed directory.
    struct ReadFixture {
        root: std::path::PathBuf,
    }

    #[async_trait]
    impl Tool for ReadFixture {
        fn name(&self) -> &str {
            "read_file"
        }
        fn description(&self) -> &str {
            "read a file"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
            let name = arguments["filename"].as_str().unwrap_or_default();
            std::fs::read_to_string(self.root.join(name))
                .map_err(|e| ToolError::failed("read_file", e.to_string()))
        }
    }

    fn registry(dir: &TempDir) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry.register(ReadFixture {
            root: dir.path().to_path_buf(),
        });
        Arc::new(registry)
    }

    fn harness(dir: &TempDir, replies: Vec<ScriptedReply>, gate: ApprovalGate) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(replies));
        let bus = Arc::new(RuntimeBus::builder("scripted", "mock-model").build());
        let events = bus.subscribe();
        let store = InMemorySessionStore::new();
        let mut settings = AgentSettings::default();
        settings.retry_delay_ms = 0;
        settings.max_tool_retries = 2;
        let agent = AgentLoop::builder(
            provider.clone(),
            registry(dir),
            bus,
            Arc::new(store.clone()),
        )
        .gate(Arc::new(gate))
        .settings(settings)
        .build();
        Harness {
            agent,
            provider,
            store,
            events,
        }
    }

    fn gate(risky: &[&str]) -> ApprovalGate {
        ApprovalGate::new(Arc::new(RiskPolicy::new(risky.iter().copied())))
    }

    fn names(rx: &mut tokio::sync::broadcast::Receiver<Arc<steward_core::RuntimeEvent>>) -> Vec<EventKind> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.kind.clone());
        }
        out
    }

    #[tokio::test]
    async fn read_file_then_answer_is_done_in_two_steps() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "buy milk").unwrap();
        let mut h = harness(
            &dir,
            vec![
                ScriptedReply::tool_call("call_1", "read_file", json!({"filename": "notes.txt"})),
                ScriptedReply::text("The note says: buy milk"),
            ],
            gate(&["delete_file"]),
        );

        let report = h.agent.run_turn("what is in notes.txt?").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Done);
        assert_eq!(report.steps, 2);

        let msgs = &h.agent.session().messages;
        let roles: Vec<Role> = msgs.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(msgs[2].tool_calls[0].arguments, r#"{"filename":"notes.txt"}"#);
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msgs[3].content, "buy milk");
        assert_eq!(msgs[4].content, "The note says: buy milk");

        // Second request carries the tool result.
        let requests = h.provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].tools.len(), 2);

        let saved = h.store.load(&h.agent.session().id).await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 5);
        assert_eq!(saved.title, "what is in notes.txt?");

        let stats = h.agent.bus().stats();
        assert_eq!(stats.turns, 1);
        assert_eq!(stats.steps, 2);
        assert_eq!(stats.tool_calls, 1);
        assert_eq!(stats.tool_failures, 0);
        assert!(stats.total_tokens > 0);
    }

    #[tokio::test]
    async fn step_counter_grows_across_turns() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "buy milk").unwrap();
        let mut h = harness(
            &dir,
            vec![
                ScriptedReply::tool_call("call_1", "read_file", json!({"filename": "notes.txt"})),
                ScriptedReply::text("The note says: buy milk"),
                ScriptedReply::text("You're welcome."),
            ],
            gate(&[]),
        );

        h.agent.run_turn("what is in notes.txt?").await.unwrap();
        let after_first = h.agent.bus().stats();
        h.agent.run_turn("thanks").await.unwrap();
        let after_second = h.agent.bus().stats();

        assert_eq!(after_first.steps, 2);
        assert_eq!(after_second.steps, 3);
        assert_eq!(after_second.current_step, 1);
        assert!(after_second.total_tokens >= after_first.total_tokens);
    }

    #[tokio::test]
    async fn step_limit_is_reported() {
        let dir = TempDir::new().unwrap();
        let replies = (0..8)
            .map(|i| ScriptedReply::tool_call(&format!("c{i}"), "echo", json!({"text": "again"})))
            .collect();
        let mut h = harness(&dir, replies, gate(&[]));
        h.agent.set_mode(ExecutionMode::Fast).await.unwrap();

        let report = h.agent.run_turn("loop forever").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::StepLimitReached);
        assert_eq!(report.steps, 8);
        assert_eq!(h.provider.remaining(), 0);

        let events = names(&mut h.events);
        assert!(events.contains(&EventKind::StepLimit { max_steps: 8 }));
    }

    #[tokio::test]
    async fn provider_error_ends_turn_and_still_persists() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(
            &dir,
            vec![ScriptedReply::Fail(ProviderError::AuthenticationFailed(
                "bad key".into(),
            ))],
            gate(&[]),
        );

        let report = h.agent.run_turn("hi").await.unwrap();
        assert!(matches!(report.outcome, TurnOutcome::Error(ref e) if e.contains("bad key")));
        assert_eq!(report.steps, 1);

        let events = names(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            EventKind::SystemMessage { text } if text.starts_with("API call failed")
        )));
        assert!(!events.iter().any(|e| matches!(e, EventKind::StepLimit { .. })));

        let saved = h.store.load(&h.agent.session().id).await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 2);
    }

    #[tokio::test]
    async fn cancel_appends_nothing() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelFlag::new();
        let provider = Arc::new(
            ScriptedProvider::new(vec![ScriptedReply::chunks(vec![
                steward_core::StreamChunk::text("partial"),
                steward_core::StreamChunk::text(" answer"),
            ])])
            .cancel_at(1, cancel.clone()),
        );
        let bus = Arc::new(RuntimeBus::builder("scripted", "mock-model").build());
        let store = InMemorySessionStore::new();
        let mut agent = AgentLoop::builder(provider, registry(&dir), bus, Arc::new(store.clone()))
            .cancel_flag(cancel)
            .build();

        let report = agent.run_turn("start").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Cancelled);
        let roles: Vec<Role> = agent.session().messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User]);
        assert!(store.load(&agent.session().id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn risky_call_without_approver_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(
            &dir,
            vec![
                ScriptedReply::tool_call("c1", "echo", json!({"text": "x"})),
                ScriptedReply::text("ok"),
            ],
            gate(&["echo"]),
        );

        h.agent.run_turn("go").await.unwrap();
        let tool_msg = &h.agent.session().messages[3];
        assert!(tool_msg.content.contains("/approve on"));

        let events = names(&mut h.events);
        assert!(events.contains(&EventKind::ToolCall {
            name: "echo".into(),
            args: json!({"text": "x"}),
            risky: true
        }));
    }

    #[tokio::test]
    async fn approver_can_edit_arguments() {
        let dir = TempDir::new().unwrap();
        let decider = |_tool: &str, _args: &Value| ApprovalDecision::allow_with(json!({"text": "edited"}));
        let mut h = harness(
            &dir,
            vec![
                ScriptedReply::tool_call("c1", "echo", json!({"text": "original"})),
                ScriptedReply::text("ok"),
            ],
            gate(&["echo"]).with_decider(Arc::new(decider)),
        );

        h.agent.run_turn("go").await.unwrap();
        assert_eq!(h.agent.session().messages[3].content, "edited");
        assert_eq!(h.agent.gate().audit().count(), 1);
    }

    #[tokio::test]
    async fn invalid_json_arguments_become_empty_object() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(
            &dir,
            vec![
                ScriptedReply::chunks(vec![steward_core::StreamChunk::fragment(
                    steward_core::ToolCallFragment {
                        index: 0,
                        id: Some("c1".into()),
                        name: Some("echo".into()),
                        arguments: Some("{not json".into()),
                    },
                )]),
                ScriptedReply::text("done"),
            ],
            gate(&[]),
        );

        h.agent.run_turn("go").await.unwrap();
        assert_eq!(h.agent.session().messages[3].content, "<none>");
    }

    #[tokio::test]
    async fn failing_tool_reports_error_result() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(
            &dir,
            vec![
                ScriptedReply::tool_call("c1", "read_file", json!({"filename": "missing.txt"})),
                ScriptedReply::tool_call("c2", "nope", json!({})),
                ScriptedReply::text("sorry"),
            ],
            gate(&[]),
        );

        let report = h.agent.run_turn("read it").await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Done);
        let msgs = &h.agent.session().messages;
        assert!(msgs[3].content.starts_with("Error (retried 2 times)"));
        assert_eq!(msgs[5].content, "Error: Tool nope not found");
        assert_eq!(h.agent.bus().stats().tool_failures, 2);
    }

    #[tokio::test]
    async fn sessions_new_and_switch() {
        let dir = TempDir::new().unwrap();
        let mut h = harness(&dir, vec![ScriptedReply::text("hello")], gate(&[]));
        h.agent.run_turn("first").await.unwrap();
        let first_id = h.agent.session().id.clone();

        let new_id = h.agent.new_session().await.unwrap();
        assert_eq!(new_id, format!("{}_c1", h.agent.bus().session_id()));
        assert_eq!(h.agent.session().messages.len(), 1);

        assert!(h.agent.switch_session(&first_id).await.unwrap());
        assert_eq!(h.agent.session().messages.len(), 3);
        assert!(!h.agent.switch_session("ghost").await.unwrap());
        assert!(!h.agent.switch_session("../etc").await.unwrap());
        assert_eq!(h.agent.session().id, first_id);

        assert_eq!(h.store.latest_id().await.unwrap().as_deref(), Some(first_id.as_str()));
    }

    #[tokio::test]
    async fn resume_latest_restores_history() {
        let dir = TempDir::new().unwrap();
        let store = InMemorySessionStore::new();
        let mut saved = Session::new("old", "scripted", "mock-model", ExecutionMode::Deep, "sys");
        saved.push(Message::user("earlier"));
        saved.push(Message::assistant("reply"));
        store.save(&saved).await.unwrap();

        let bus = Arc::new(RuntimeBus::builder("scripted", "mock-model").build());
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut agent = AgentLoop::builder(provider, registry(&dir), bus, Arc::new(store)).build();

        assert!(agent.resume_latest().await.unwrap());
        assert_eq!(agent.session().id, "old");
        assert_eq!(agent.bus().mode(), ExecutionMode::Deep);
    }

    #[tokio::test]
    async fn provider_switch_uses_factory() {
        let dir = TempDir::new().unwrap();
        let store = InMemorySessionStore::new();
        let bus = Arc::new(RuntimeBus::builder("scripted", "mock-model").build());
        let factory: ProviderFactory = Arc::new(|name: &str| {
            if name == "other" {
                Ok(ProviderHandle {
                    name: "other".into(),
                    model: "other-model".into(),
                    provider: Arc::new(ScriptedProvider::new(vec![]).named("other")),
                })
            } else {
                Err(ProviderError::NotConfigured(format!("{name} has no key")))
            }
        });
        let mut agent = AgentLoop::builder(
            Arc::new(ScriptedProvider::new(vec![])),
            registry(&dir),
            bus,
            Arc::new(store.clone()),
        )
        .provider_factory(factory)
        .build();

        assert_eq!(agent.switch_provider("other").await.unwrap(), "other");
        assert_eq!(agent.bus().provider(), "other");
        assert_eq!(agent.bus().model(), "other-model");
        assert!(agent.switch_provider("broken").await.is_err());

        let saved = store.load(&agent.session().id).await.unwrap().unwrap();
        assert_eq!(saved.model, "other-model");
    }

    #[test]
    fn trim_keeps_system_and_recent_rounds() {
        let mut msgs = vec![Message::system("sys")];
        for i in 0..10 {
            msgs.push(Message::user(format!("u{i}")));
            msgs.push(Message::assistant(format!("a{i}")));
        }
        trim_history(&mut msgs, 2);
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["sys", "u8", "a8", "u9", "a9"]);
    }

    #[test]
    fn trim_drops_orphaned_tool_messages() {
        let mut msgs = vec![
            Message::system("sys"),
            Message::user("u"),
            Message::assistant_with_tools(
                "",
                vec![ToolCallRequest {
                    id: "c".into(),
                    name: "echo".into(),
                    arguments: "{}".into(),
                }],
            ),
            Message::tool_result("c", "echo", "r"),
            Message::assistant("a"),
            Message::user("u2"),
            Message::assistant("a2"),
        ];
        trim_history(&mut msgs, 2);
        let roles: Vec<Role> = msgs.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::Assistant, Role::User, Role::Assistant]);
    }
}
