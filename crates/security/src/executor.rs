//! Ticket-gated tool execution for remote callers.
//!
//! A risky tool is never executed on the first request. The caller first
//! gets a ticket and a preview, then repeats the call with `confirm` and the
//! ticket id. Non-risky tools run directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use steward_core::error::ApprovalError;
use steward_core::tool::ToolRegistry;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::risk::RiskPolicy;
use crate::tickets::TicketStore;

pub const APPROVAL_PENDING_RESULT: &str = "Approval required before execution.";

/// Approval options attached to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalPayload {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub approval_id: Option<String>,
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_actor() -> String {
    "ui".into()
}

impl Default for ApprovalPayload {
    fn default() -> Self {
        Self {
            dry_run: false,
            confirm: false,
            approval_id: None,
            actor: default_actor(),
        }
    }
}

impl ApprovalPayload {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn confirm(approval_id: impl Into<String>) -> Self {
        Self {
            confirm: true,
            approval_id: Some(approval_id.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ok,
    NeedsApproval,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub success: bool,
    pub status: CallStatus,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub duration_ms: f64,
}

impl ToolCallResponse {
    fn base(tool: &str, status: CallStatus, started: Instant) -> Self {
        Self {
            success: status == CallStatus::Ok,
            status,
            tool: tool.to_string(),
            result: None,
            error: None,
            approval_id: None,
            preview: None,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    fn failed(tool: &str, error: impl Into<String>, started: Instant) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(tool, CallStatus::Error, started)
        }
    }
}

/// Catalog entry for listing tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub risky: bool,
    pub parameters: Value,
}

#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    policy: Arc<RiskPolicy>,
    tickets: Arc<TicketStore>,
    audit: Arc<AuditLogger>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: Arc<RiskPolicy>,
        tickets: Arc<TicketStore>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            registry,
            policy,
            tickets,
            audit,
        }
    }

    pub fn tickets(&self) -> &Arc<TicketStore> {
        &self.tickets
    }

    /// Every registered tool with its risk flag, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.registry
            .definitions()
            .into_iter()
            .map(|def| ToolInfo {
                risky: self.policy.is_risky(&def.name),
                name: def.name,
                description: def.description,
                parameters: def.parameters,
            })
            .collect()
    }

    /// Run `tool` under the ticket protocol.
    pub async fn call(&self, tool: &str, args: Value, approval: ApprovalPayload) -> ToolCallResponse {
        let started = Instant::now();
        let args = if args.is_null() { Value::Object(Default::default()) } else { args };

        if !self.registry.contains(tool) {
            return ToolCallResponse::failed(
                tool,
                ApprovalError::UnknownTool(tool.to_string()).to_string(),
                started,
            );
        }

        if self.policy.is_risky(tool) {
            if approval.dry_run || !approval.confirm {
                let preview = serde_json::to_string_pretty(&args).unwrap_or_default();
                let approval_id = self.tickets.create(tool, args.clone(), &approval.actor);
                self.audit.log(
                    AuditEvent::TicketIssued {
                        approval_id: approval_id.clone(),
                    },
                    &approval.actor,
                    tool,
                    AuditOutcome::Pending,
                    Some(&args),
                    None,
                );
                info!(tool, approval_id = %approval_id, "Approval ticket issued");
                return ToolCallResponse {
                    result: Some(APPROVAL_PENDING_RESULT.to_string()),
                    approval_id: Some(approval_id),
                    preview: Some(preview),
                    ..ToolCallResponse::base(tool, CallStatus::NeedsApproval, started)
                };
            }

            let approval_id = approval.approval_id.as_deref();
            let redeemed = self.tickets.redeem(approval_id, tool, &args);
            self.audit.log(
                AuditEvent::TicketRedeemed {
                    approval_id: approval_id.unwrap_or_default().to_string(),
                },
                &approval.actor,
                tool,
                if redeemed.is_ok() { AuditOutcome::Success } else { AuditOutcome::Denied },
                Some(&args),
                redeemed.as_ref().err().map(ToString::to_string),
            );
            if let Err(e) = redeemed {
                warn!(tool, error = %e, "Approval confirmation refused");
                return ToolCallResponse::failed(tool, e.to_string(), started);
            }
        }

        let outcome = self.registry.execute(tool, args).await;
        self.audit.log(
            AuditEvent::ToolExecution,
            &approval.actor,
            tool,
            if outcome.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failure },
            None,
            outcome.as_ref().err().map(ToString::to_string),
        );
        match outcome {
            Ok(result) => ToolCallResponse {
                result: Some(result),
                ..ToolCallResponse::base(tool, CallStatus::Ok, started)
            },
            Err(e) => ToolCallResponse::failed(tool, e.to_string(), started),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use steward_core::error::ToolError;
    use steward_core::tool::Tool;

    struct CountingDelete(Arc<AtomicUsize>);

    #[async_trait]
    impl Tool for CountingDelete {
        fn name(&self) -> &str {
            "delete_file"
        }
        fn description(&self) -> &str {
            "Delete a file"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"filename": {"type": "string"}}})
        }
        async fn execute(&self, args: Value) -> Result<String, ToolError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            match args["filename"].as_str() {
                Some("missing.txt") => Err(ToolError::failed("delete_file", "no such file")),
                Some(name) => Ok(format!("deleted {name}")),
                None => Err(ToolError::InvalidArguments("filename required".into())),
            }
        }
    }

    struct Ping;

    #[async_trait]
    impl Tool for Ping {
        fn name(&self) -> &str {
            "ping"
        }
        fn description(&self) -> &str {
            "pong"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Ok("pong".into())
        }
    }

    fn executor() -> (ToolExecutor, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(CountingDelete(runs.clone()));
        registry.register(Ping);
        let exec = ToolExecutor::new(
            Arc::new(registry),
            Arc::new(RiskPolicy::new(["delete_file"])),
            Arc::new(TicketStore::default()),
            Arc::new(AuditLogger::new()),
        );
        (exec, runs)
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let (exec, _) = executor();
        let resp = exec.call("nope", json!({}), ApprovalPayload::default()).await;
        assert_eq!(resp.status, CallStatus::Error);
        assert_eq!(resp.error.as_deref(), Some("Tool not found: nope"));
    }

    #[tokio::test]
    async fn safe_tool_runs_directly() {
        let (exec, _) = executor();
        let resp = exec.call("ping", Value::Null, ApprovalPayload::default()).await;
        assert!(resp.success);
        assert_eq!(resp.status, CallStatus::Ok);
        assert_eq!(resp.result.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn dry_run_then_confirm_executes_once() {
        let (exec, runs) = executor();
        let args = json!({"filename": "a.txt"});

        let preview = exec.call("delete_file", args.clone(), ApprovalPayload::dry_run()).await;
        assert_eq!(preview.status, CallStatus::NeedsApproval);
        assert!(!preview.success);
        assert_eq!(preview.result.as_deref(), Some(APPROVAL_PENDING_RESULT));
        assert!(preview.preview.as_deref().unwrap().contains("\"filename\": \"a.txt\""));
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let id = preview.approval_id.unwrap();
        let done = exec
            .call("delete_file", args.clone(), ApprovalPayload::confirm(&id))
            .await;
        assert_eq!(done.status, CallStatus::Ok);
        assert_eq!(done.result.as_deref(), Some("deleted a.txt"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let replay = exec.call("delete_file", args, ApprovalPayload::confirm(&id)).await;
        assert_eq!(replay.error.as_deref(), Some("Approval ticket not found or expired."));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfirmed_call_only_issues_ticket() {
        let (exec, runs) = executor();
        let resp = exec
            .call("delete_file", json!({"filename": "a"}), ApprovalPayload::default())
            .await;
        assert_eq!(resp.status, CallStatus::NeedsApproval);
        assert_eq!(exec.tickets().len(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mismatched_args_never_execute() {
        let (exec, runs) = executor();
        let preview = exec
            .call("delete_file", json!({"filename": "a.txt"}), ApprovalPayload::dry_run())
            .await;
        let id = preview.approval_id.unwrap();

        let resp = exec
            .call("delete_file", json!({"filename": "b.txt"}), ApprovalPayload::confirm(id))
            .await;
        assert_eq!(resp.status, CallStatus::Error);
        assert_eq!(
            resp.error.as_deref(),
            Some("Approval ticket args mismatch. Re-run dry-run to get a fresh ticket.")
        );
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confirm_without_id() {
        let (exec, _) = executor();
        let payload = ApprovalPayload {
            confirm: true,
            ..ApprovalPayload::default()
        };
        let resp = exec.call("delete_file", json!({}), payload).await;
        assert_eq!(
            resp.error.as_deref(),
            Some("Missing approval_id for risky tool confirmation.")
        );
    }

    #[tokio::test]
    async fn tool_failure_reported_as_error() {
        let (exec, _) = executor();
        let args = json!({"filename": "missing.txt"});
        let id = exec
            .call("delete_file", args.clone(), ApprovalPayload::dry_run())
            .await
            .approval_id
            .unwrap();
        let resp = exec.call("delete_file", args, ApprovalPayload::confirm(id)).await;
        assert_eq!(resp.status, CallStatus::Error);
        assert_eq!(resp.error.as_deref(), Some("no such file"));
    }

    #[test]
    fn list_marks_risky_tools() {
        let (exec, _) = executor();
        let tools = exec.list_tools();
        assert_eq!(tools[0].name, "delete_file");
        assert!(tools[0].risky);
        assert_eq!(tools[1].name, "ping");
        assert!(!tools[1].risky);
    }

    #[test]
    fn payload_defaults() {
        let payload: ApprovalPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.actor, "ui");
        assert!(!payload.dry_run && !payload.confirm);
    }
}
