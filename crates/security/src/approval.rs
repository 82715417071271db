//! Synchronous approval gate used by the agent loop.
//!
//! Non-risky tools always run. Risky tools run when auto-approval is on or
//! when the configured decider allows them; with neither, they are rejected
//! with a message pointing at `/approve on`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::audit::{AuditEvent, AuditLogger, AuditOutcome};
use crate::risk::RiskPolicy;

pub const APPROVAL_REQUIRED_MESSAGE: &str =
    "Risky tool requires approval (use /approve on to auto-approve for now).";
const REJECTED_MESSAGE: &str = "Tool call rejected by user.";

/// What a decider answered for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDecision {
    pub allow: bool,
    pub message: Option<String>,
    /// Replacement arguments, when the reviewer edited them
    pub arguments: Option<Value>,
}

impl ApprovalDecision {
    pub fn allow() -> Self {
        Self {
            allow: true,
            message: None,
            arguments: None,
        }
    }

    pub fn allow_with(arguments: Value) -> Self {
        Self {
            allow: true,
            message: None,
            arguments: Some(arguments),
        }
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self {
            allow: false,
            message: Some(message.into()),
            arguments: None,
        }
    }
}

/// Asks someone (a terminal user, a UI) whether a risky call may run.
#[async_trait]
pub trait ApprovalDecider: Send + Sync {
    async fn decide(&self, tool: &str, args: &Value) -> ApprovalDecision;
}

#[async_trait]
impl<F> ApprovalDecider for F
where
    F: Fn(&str, &Value) -> ApprovalDecision + Send + Sync,
{
    async fn decide(&self, tool: &str, args: &Value) -> ApprovalDecision {
        self(tool, args)
    }
}

/// Outcome of the gate for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Run with these (possibly edited) arguments.
    Run(Value),
    /// Skip the call; the message becomes the tool result.
    Skip(String),
}

pub struct ApprovalGate {
    policy: Arc<RiskPolicy>,
    auto_approve: AtomicBool,
    decider: Option<Arc<dyn ApprovalDecider>>,
    audit: Arc<AuditLogger>,
    actor: String,
}

impl ApprovalGate {
    pub fn new(policy: Arc<RiskPolicy>) -> Self {
        Self {
            policy,
            auto_approve: AtomicBool::new(false),
            decider: None,
            audit: Arc::new(AuditLogger::new()),
            actor: "agent".into(),
        }
    }

    pub fn with_decider(mut self, decider: Arc<dyn ApprovalDecider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_auto_approve(self, on: bool) -> Self {
        self.set_auto_approve(on);
        self
    }

    pub fn set_auto_approve(&self, on: bool) {
        self.auto_approve.store(on, Ordering::SeqCst);
    }

    pub fn auto_approve(&self) -> bool {
        self.auto_approve.load(Ordering::SeqCst)
    }

    pub fn is_risky(&self, tool: &str) -> bool {
        self.policy.is_risky(tool)
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    /// Decide whether `tool` may run with `args`.
    pub async fn check(&self, tool: &str, args: Value) -> Verdict {
        if !self.is_risky(tool) {
            return Verdict::Run(args);
        }

        let (verdict, details) = if self.auto_approve() {
            (Verdict::Run(args), "auto-approved")
        } else if let Some(decider) = &self.decider {
            let decision = decider.decide(tool, &args).await;
            if decision.allow {
                let edited = decision.arguments.is_some();
                let args = decision.arguments.unwrap_or(args);
                (Verdict::Run(args), if edited { "approved with edits" } else { "approved" })
            } else {
                let message = decision.message.unwrap_or_else(|| REJECTED_MESSAGE.to_string());
                (Verdict::Skip(message), "rejected")
            }
        } else {
            (Verdict::Skip(APPROVAL_REQUIRED_MESSAGE.to_string()), "no approver")
        };

        let (outcome, digest_args) = match &verdict {
            Verdict::Run(a) => (AuditOutcome::Success, Some(a)),
            Verdict::Skip(_) => (AuditOutcome::Denied, None),
        };
        debug!(tool, details, "Approval decision");
        self.audit.log(
            AuditEvent::GateDecision,
            &self.actor,
            tool,
            outcome,
            digest_args,
            Some(details.to_string()),
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate() -> ApprovalGate {
        ApprovalGate::new(Arc::new(RiskPolicy::new(["delete_file"])))
    }

    #[tokio::test]
    async fn safe_tools_always_run() {
        let gate = gate();
        assert_eq!(
            gate.check("read_file", json!({"path": "a"})).await,
            Verdict::Run(json!({"path": "a"}))
        );
        assert_eq!(gate.audit().count(), 0);
    }

    #[tokio::test]
    async fn risky_without_approver_is_rejected() {
        let gate = gate();
        let verdict = gate.check("delete_file", json!({"filename": "a"})).await;
        match verdict {
            Verdict::Skip(msg) => assert!(msg.contains("/approve on")),
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(gate.audit().entries_by_outcome(&AuditOutcome::Denied).len(), 1);
    }

    #[tokio::test]
    async fn auto_approve_skips_decider() {
        let decider = |_: &str, _: &Value| -> ApprovalDecision { panic!("decider must not be called") };
        let gate = gate().with_decider(Arc::new(decider)).with_auto_approve(true);
        assert!(matches!(gate.check("delete_file", json!({})).await, Verdict::Run(_)));

        gate.set_auto_approve(false);
        assert!(!gate.auto_approve());
    }

    #[tokio::test]
    async fn decider_can_edit_or_reject() {
        let decider = |_: &str, args: &Value| {
            if args["filename"] == "keep.txt" {
                ApprovalDecision::reject("no way")
            } else {
                ApprovalDecision::allow_with(json!({"filename": "safe.txt"}))
            }
        };
        let gate = gate().with_decider(Arc::new(decider));

        assert_eq!(
            gate.check("delete_file", json!({"filename": "keep.txt"})).await,
            Verdict::Skip("no way".into())
        );
        assert_eq!(
            gate.check("delete_file", json!({"filename": "x.txt"})).await,
            Verdict::Run(json!({"filename": "safe.txt"}))
        );
    }

    #[tokio::test]
    async fn bare_rejection_gets_default_message() {
        let decider = |_: &str, _: &Value| ApprovalDecision {
            allow: false,
            message: None,
            arguments: None,
        };
        let gate = gate().with_decider(Arc::new(decider));
        assert_eq!(
            gate.check("delete_file", json!({})).await,
            Verdict::Skip(REJECTED_MESSAGE.into())
        );
    }
}
