//! Tool dispatcher: runs an approved call with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use steward_config::AgentSettings;
use steward_core::tool::ToolRegistry;
use steward_telemetry::RuntimeBus;
use tracing::{debug, warn};

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    max_retries: u32,
    retry_delay: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    /// Attempts per call (at least one) and the pause between failures.
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn from_settings(registry: Arc<ToolRegistry>, settings: &AgentSettings) -> Self {
        Self::new(registry).with_retries(
            settings.max_tool_retries,
            Duration::from_millis(settings.retry_delay_ms),
        )
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `name` and return its result text. Never fails: errors come back
    /// as text starting with `Error`.
    pub async fn dispatch(&self, name: &str, args: Value, bus: &RuntimeBus) -> String {
        let Some(tool) = self.registry.get(name) else {
            warn!(tool = name, "Model requested an unknown tool");
            return format!("Error: Tool {name} not found");
        };

        let max = self.max_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            bus.stage("tool running", &format!("{name} · try {attempt}/{max}"));
            match tool.execute(args.clone()).await {
                Ok(result) => {
                    bus.clear_stage();
                    debug!(tool = name, attempt, "Tool succeeded");
                    return result;
                }
                Err(e) if attempt >= max => {
                    warn!(tool = name, attempts = max, error = %e, "Tool failed");
                    bus.system_message(format!("{name} failed after {max} attempts"));
                    return format!("Error (retried {max} times): {e}");
                }
                Err(e) => {
                    debug!(tool = name, attempt, error = %e, "Tool failed, retrying");
                    bus.system_message(format!("{name} failed, retrying ({attempt}/{max})"));
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}
