//! Built-in tool implementations for Steward.
//!
//! Every tool works on paths inside a single workspace directory. Writes
//! and deletes are listed in the default risk set, so the agent loop asks
//! for approval before running them.

pub mod delete_file;
pub mod list_dir;
pub mod read_file;
pub mod workspace;
pub mod write_file;

use std::path::PathBuf;
use steward_core::tool::ToolRegistry;

pub use workspace::Workspace;

/// Registry with every built-in tool, confined to `workspace_root`.
pub fn default_registry(workspace_root: impl Into<PathBuf>) -> ToolRegistry {
    let workspace = Workspace::new(workspace_root);
    let mut registry = ToolRegistry::new();
    registry.register(read_file::ReadFileTool::new(workspace.clone()));
    registry.register(list_dir::ListDirTool::new(workspace.clone()));
    registry.register(write_file::WriteFileTool::new(workspace.clone()));
    registry.register(delete_file::DeleteFileTool::new(workspace));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_builtin_tools() {
        let registry = default_registry(".");
        assert_eq!(
            registry.names(),
            vec!["delete_file", "list_dir", "read_file", "write_file"]
        );
    }
}
