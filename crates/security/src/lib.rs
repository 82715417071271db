//! Security layer for Steward: risk policy, approval and audit logging.
//!
//! Provides:
//! - **Risk policy**: which tools need a human in the loop
//! - **Approval gate**: synchronous allow/reject decisions for the agent loop
//! - **Tickets**: the two-step dry-run/confirm protocol for remote callers
//! - **Path confinement**: file tools stay inside the workspace
//! - **Audit logging**: every approval decision, with an argument digest

pub mod approval;
pub mod audit;
pub mod executor;
pub mod path;
pub mod risk;
pub mod tickets;

pub use approval::{ApprovalDecider, ApprovalDecision, ApprovalGate, Verdict};
pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink, args_digest};
pub use executor::{ApprovalPayload, CallStatus, ToolCallResponse, ToolExecutor, ToolInfo};
pub use path::{PathValidationError, confine_path};
pub use risk::RiskPolicy;
pub use tickets::{ApprovalTicket, TicketStore};
