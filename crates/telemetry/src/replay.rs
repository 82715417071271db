//! Reading the runtime event log back: per-session digests and replay.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::TelemetryError;
use crate::event_log::{LogRecord, read_records};

/// Events a truncated replay may start on.
const BOUNDARY_EVENTS: &[&str] = &[
    "turn.user",
    "assistant.stream.start",
    "tool.call",
    "runtime.started",
    "system.message",
];

/// Per-session summary derived from the log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionDigest {
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub started_at: f64,
    pub finished_at: f64,
    pub events: u64,
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub reason: String,
}

impl SessionDigest {
    pub fn duration_s(&self) -> f64 {
        (self.finished_at - self.started_at).max(0.0)
    }
}

/// Records chosen for replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySession {
    pub session_id: String,
    pub truncated: bool,
    pub records: Vec<LogRecord>,
}

fn digest(records: &[LogRecord], limit: usize) -> Vec<SessionDigest> {
    let mut sessions: HashMap<&str, SessionDigest> = HashMap::new();
    for rec in records {
        if rec.session_id.is_empty() {
            continue;
        }
        let info = sessions.entry(rec.session_id.as_str()).or_insert_with(|| SessionDigest {
            session_id: rec.session_id.clone(),
            started_at: rec.at,
            ..SessionDigest::default()
        });

        info.events += 1;
        info.started_at = info.started_at.min(rec.at);
        info.finished_at = info.finished_at.max(rec.at);

        match rec.event.as_str() {
            "runtime.started" => {
                let provider = rec.payload_str("provider");
                if !provider.is_empty() {
                    info.provider = provider.to_string();
                }
                let model = rec.payload_str("model");
                if !model.is_empty() {
                    info.model = model.to_string();
                }
            }
            "runtime.finished" => {
                let reason = rec.payload_str("reason");
                if !reason.is_empty() {
                    info.reason = reason.to_string();
                }
                let stats = &rec.payload["stats"];
                if let Some(n) = stats["tool_calls"].as_u64().filter(|n| *n > 0) {
                    info.tool_calls = n;
                }
                if let Some(n) = stats["tool_failures"].as_u64().filter(|n| *n > 0) {
                    info.tool_failures = n;
                }
            }
            _ => {}
        }

        if info.tool_calls == 0 {
            info.tool_calls = info.tool_calls.max(rec.stats.tool_calls);
            info.tool_failures = info.tool_failures.max(rec.stats.tool_failures);
        }
    }

    let mut ordered: Vec<_> = sessions.into_values().collect();
    ordered.sort_by(|a, b| b.started_at.total_cmp(&a.started_at));
    if limit > 0 {
        ordered.truncate(limit);
    }
    ordered
}

/// One digest per session, newest first. `limit == 0` means all.
pub fn summarize_sessions(log_path: &Path, limit: usize) -> Result<Vec<SessionDigest>, TelemetryError> {
    Ok(digest(&read_records(log_path)?, limit))
}

/// Records of one session (or `latest`) in time order.
///
/// With more than `max_events` records the window is cut to the tail, then
/// widened back to the nearest boundary event (never more than three times
/// `max_events` from the end), and leading stream fragments are dropped.
pub fn replay(
    log_path: &Path,
    session_id: Option<&str>,
    max_events: usize,
) -> Result<ReplaySession, TelemetryError> {
    let records = read_records(log_path)?;
    if records.is_empty() {
        return Err(TelemetryError::EmptyLog(log_path.display().to_string()));
    }

    let session_id = match session_id.filter(|id| !id.is_empty() && *id != "latest") {
        Some(id) => id.to_string(),
        None => digest(&records, 1)
            .into_iter()
            .next()
            .map(|d| d.session_id)
            .ok_or_else(|| TelemetryError::SessionNotFound("latest".into()))?,
    };

    let mut chosen: Vec<LogRecord> = records
        .into_iter()
        .filter(|r| r.session_id == session_id)
        .collect();
    if chosen.is_empty() {
        return Err(TelemetryError::SessionNotFound(session_id));
    }
    chosen.sort_by(|a, b| a.at.total_cmp(&b.at));

    let mut truncated = false;
    if max_events > 0 && chosen.len() > max_events {
        truncated = true;
        let floor = chosen.len().saturating_sub(max_events.saturating_mul(3));
        let mut start = chosen.len() - max_events;
        if let Some(i) = (floor..=start)
            .rev()
            .find(|&i| BOUNDARY_EVENTS.contains(&chosen[i].event.as_str()))
        {
            start = i;
        }
        while start < chosen.len()
            && matches!(
                chosen[start].event.as_str(),
                "assistant.stream.token" | "assistant.stream.end"
            )
        {
            start += 1;
        }
        chosen.drain(..start);
    }

    Ok(ReplaySession {
        session_id,
        truncated,
        records: chosen,
    })
}
