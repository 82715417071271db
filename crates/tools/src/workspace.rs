//! The directory file tools are confined to.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use steward_core::error::ToolError;
use tracing::warn;

/// Files no tool may modify, relative to the workspace root.
const PROTECTED: &[&str] = &[".env"];

#[derive(Debug, Clone)]
pub struct Workspace {
    root: Arc<PathBuf>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool argument to a path inside the workspace.
    pub fn resolve(&self, tool: &str, requested: &str) -> Result<PathBuf, ToolError> {
        steward_security::confine_path(&self.root, requested).map_err(|e| {
            warn!(tool, path = requested, error = %e, "Path rejected");
            ToolError::PermissionDenied {
                tool_name: tool.into(),
                reason: e.to_string(),
            }
        })
    }

    /// Like [`resolve`](Self::resolve), also refusing protected files.
    pub fn resolve_for_write(&self, tool: &str, requested: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve(tool, requested)?;
        let rel = self.display(&path).to_lowercase();
        if PROTECTED.contains(&rel.as_str()) {
            return Err(ToolError::PermissionDenied {
                tool_name: tool.into(),
                reason: format!("'{rel}' is protected"),
            });
        }
        Ok(path)
    }

    /// Path relative to the workspace root when possible.
    pub fn display(&self, path: &Path) -> String {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.to_path_buf());
        path.strip_prefix(&root)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string())
    }
}

/// Required string argument, or `InvalidArguments`.
pub(crate) fn required_str<'a>(
    args: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    args[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn env_file_is_protected() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        assert!(ws.resolve("read_file", ".env").is_ok());
        assert!(matches!(
            ws.resolve_for_write("write_file", ".env"),
            Err(ToolError::PermissionDenied { .. })
        ));
        assert!(ws.resolve_for_write("write_file", "notes.txt").is_ok());
    }

    #[test]
    fn escape_is_permission_denied() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        assert!(matches!(
            ws.resolve("read_file", "../secret"),
            Err(ToolError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn display_is_relative() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        let path = ws.resolve("read_file", "a/b.txt").unwrap();
        assert_eq!(ws.display(&path), "a/b.txt");
    }
}
