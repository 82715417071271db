//! The Steward step loop.
//!
//! A turn follows a **Stream → Approve → Dispatch** cycle:
//!
//! 1. **Stream** the model's reply, folding deltas into one assistant message
//! 2. **Approve** each requested tool call through the approval gate
//! 3. **Dispatch** approved calls with bounded retries and append the results
//! 4. Repeat until the model answers without tools, the turn is cancelled,
//!    the provider fails, or the execution mode's step ceiling is reached
//!
//! Every state change is reported on the session's [`RuntimeBus`](steward_telemetry::RuntimeBus).

pub mod aggregator;
pub mod dispatcher;
pub mod loop_runner;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use aggregator::{Aggregated, FragmentMap, StreamOutcome, aggregate, estimate_tokens};
pub use dispatcher::ToolDispatcher;
pub use loop_runner::{AgentLoop, AgentLoopBuilder, ProviderFactory, ProviderHandle, trim_history};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{ScriptedProvider, ScriptedReply};
