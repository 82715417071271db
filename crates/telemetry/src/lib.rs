//! Runtime telemetry for Steward.
//!
//! The [`RuntimeBus`] is the single writer of runtime events for one agent
//! session. It keeps running counters, appends every event to a rotating
//! JSONL log and fans events out to subscribers. [`replay`] reads the log
//! back; [`PricingTable`] turns token counts into dollars.

pub mod bus;
pub mod event_log;
pub mod pricing;
pub mod replay;

pub use bus::RuntimeBus;
pub use event_log::{EventLog, LogRecord};
pub use pricing::{ModelPricing, PricingSnapshot, PricingTable};
pub use replay::{ReplaySession, SessionDigest, replay, summarize_sessions};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("event log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("no runtime session found: {0}")]
    SessionNotFound(String),

    #[error("event log is empty: {0}")]
    EmptyLog(String),
}
