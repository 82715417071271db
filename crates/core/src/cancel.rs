//! Cooperative cancellation.
//!
//! The agent polls the flag between stream deltas only. A tool call that is
//! already running always completes before the cancel takes effect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable cancel flag shared between the loop and whoever drives it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current turn.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request; called at the start of each turn.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
