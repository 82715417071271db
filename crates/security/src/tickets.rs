//! Approval tickets for the two-step dry-run/confirm protocol.
//!
//! A dry run stores a snapshot of the tool name and arguments under a fresh
//! id. A confirm call pops the ticket, so each ticket authorizes at most one
//! execution. Expired tickets are purged lazily on every access.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use steward_core::error::ApprovalError;

const DEFAULT_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalTicket {
    pub id: String,
    pub tool: String,
    pub args: serde_json::Value,
    pub actor: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TicketStore {
    ttl: Duration,
    items: Mutex<HashMap<String, ApprovalTicket>>,
}

impl Default for TicketStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}

impl TicketStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000)),
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the map and drop every ticket whose expiry has passed.
    fn purged(&self) -> MutexGuard<'_, HashMap<String, ApprovalTicket>> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        items.retain(|_, t| t.expires_at > now);
        items
    }

    /// Store a snapshot and return the new ticket id (16 hex chars).
    pub fn create(&self, tool: &str, args: serde_json::Value, actor: &str) -> String {
        let mut items = self.purged();
        let id = uuid::Uuid::new_v4().simple().to_string()[..16].to_string();
        let now = Utc::now();
        items.insert(
            id.clone(),
            ApprovalTicket {
                id: id.clone(),
                tool: tool.to_string(),
                args,
                actor: actor.to_string(),
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
        id
    }

    pub fn get(&self, approval_id: &str) -> Option<ApprovalTicket> {
        self.purged().get(approval_id).cloned()
    }

    pub fn pop(&self, approval_id: &str) -> Option<ApprovalTicket> {
        self.purged().remove(approval_id)
    }

    /// Consume the ticket for a confirm call.
    ///
    /// Checks run in a fixed order: id present, ticket live, tool equal,
    /// arguments equal. The ticket is consumed once found, even when a later
    /// check fails.
    pub fn redeem(
        &self,
        approval_id: Option<&str>,
        tool: &str,
        args: &serde_json::Value,
    ) -> Result<ApprovalTicket, ApprovalError> {
        let approval_id = approval_id
            .filter(|id| !id.is_empty())
            .ok_or(ApprovalError::MissingApprovalId)?;
        let ticket = self.pop(approval_id).ok_or_else(|| ApprovalError::TicketNotFound {
            approval_id: approval_id.to_string(),
        })?;
        if ticket.tool != tool {
            return Err(ApprovalError::ToolMismatch {
                expected: ticket.tool,
                actual: tool.to_string(),
            });
        }
        if &ticket.args != args {
            return Err(ApprovalError::ArgsMismatch {
                tool: tool.to_string(),
            });
        }
        Ok(ticket)
    }

    /// Number of live tickets.
    pub fn len(&self) -> usize {
        self.purged().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
