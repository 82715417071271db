//! # Steward Core
//!
//! Domain types, traits, and error definitions shared by every Steward crate.
//! Nothing in here performs I/O; providers, stores and tools implement the
//! traits declared here in their own crates.

pub mod agent;
pub mod cancel;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

pub use agent::{ExecutionMode, TurnOutcome, TurnReport};
pub use cancel::CancelFlag;
pub use error::{ApprovalError, Error, ProviderError, Result, SessionError, ToolError};
pub use event::{EventBus, EventKind, RuntimeEvent, RuntimeStats};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{Provider, ProviderRequest, StreamChunk, ToolCallFragment, ToolDefinition, Usage};
pub use session::{Session, SessionStore, SessionSummary};
pub use tool::{Tool, ToolRegistry};
