//! Session stores for Steward.

pub mod file_store;
pub mod in_memory;

pub use file_store::FileSessionStore;
pub use in_memory::InMemorySessionStore;

use steward_core::error::SessionError;

/// Reject ids that could escape the store directory.
pub(crate) fn check_id(id: &str) -> Result<(), SessionError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(SessionError::InvalidId(id.to_string()));
    }
    Ok(())
}
