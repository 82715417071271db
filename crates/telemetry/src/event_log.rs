//! Append-only JSONL event log with size-based rotation.
//!
//! One record per line. Every `check_every` writes the file size is
//! compared against `rotate_bytes`; an oversized log is renamed to
//! `{stem}.{YYYYmmdd_HHMMSS}{ext}` and a fresh file is started. Write and
//! rotation failures are logged and swallowed so the agent loop never
//! stalls on telemetry.

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use steward_config::StorageConfig;
use steward_core::event::{RuntimeEvent, RuntimeStats};
use tracing::{debug, warn};

use crate::TelemetryError;

/// One line of the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub session_id: String,
    /// Seconds since the Unix epoch
    pub at: f64,
    #[serde(default)]
    pub at_iso: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub stats: RuntimeStats,
}

impl LogRecord {
    pub fn new(session_id: &str, event: &RuntimeEvent, stats: RuntimeStats) -> Self {
        Self {
            session_id: session_id.to_string(),
            at: unix_seconds(event.at),
            at_iso: event.at.to_rfc3339_opts(SecondsFormat::Secs, true),
            event: event.kind.name().to_string(),
            payload: event.kind.payload(),
            stats,
        }
    }

    /// String field of the payload, empty when absent.
    pub fn payload_str(&self, key: &str) -> &str {
        self.payload.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }
}

fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

pub struct EventLog {
    path: PathBuf,
    rotate_bytes: u64,
    check_every: u64,
    writes: Mutex<u64>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, rotate_bytes: u64, check_every: u64) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(path = %parent.display(), error = %e, "Cannot create event log directory");
        }
        Self {
            path,
            rotate_bytes,
            check_every: check_every.max(1),
            writes: Mutex::new(0),
        }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(&storage.event_log, storage.rotate_bytes, storage.rotate_check_every)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Never fails.
    pub fn append(&self, record: &LogRecord) {
        let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        *writes += 1;
        if *writes % self.check_every == 0 {
            self.maybe_rotate();
        }

        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, event = %record.event, "Cannot encode runtime event");
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            debug!(path = %self.path.display(), error = %e, "Event log write failed");
        }
    }

    fn maybe_rotate(&self) {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size <= self.rotate_bytes {
            return;
        }
        let archived = rotated_name(&self.path, Local::now());
        match std::fs::rename(&self.path, &archived) {
            Ok(()) => debug!(archived = %archived.display(), size, "Event log rotated"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Event log rotation failed"),
        }
    }
}

/// `{stem}.{YYYYmmdd_HHMMSS}{ext}`, with `.jsonl` when the log has no extension.
pub fn rotated_name(path: &Path, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".jsonl".to_string());
    let stem = path.with_extension("");
    PathBuf::from(format!("{}.{stamp}{ext}", stem.display()))
}

/// Read every well-formed record; blank and malformed lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<LogRecord>, TelemetryError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(raw) {
            Ok(rec) => records.push(rec),
            Err(e) => debug!(error = %e, "Skipping malformed event log line"),
        }
    }
    Ok(records)
}
