//! Write file tool: create or overwrite a text file.

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::Tool;

use crate::workspace::{Workspace, required_str};

pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates parent directories and the file if needed, overwrites it if it exists."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "File to write, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "The full new content"
                }
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let filename = required_str(&arguments, "filename")?;
        let content = required_str(&arguments, "content")?;
        let path = self.workspace.resolve_for_write(self.name(), filename)?;
        let shown = self.workspace.display(&path);

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Err(ToolError::failed(
                self.name(),
                format!("Failed to create directory for '{shown}': {e}"),
            ));
        }

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to write '{shown}': {e}")))?;
        Ok(format!("Wrote {} bytes to {shown}", content.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(Workspace::new(dir.path()));

        let out = tool
            .execute(serde_json::json!({"filename": "notes/today.md", "content": "hello"}))
            .await
            .unwrap();
        assert_eq!(out, "Wrote 5 bytes to notes/today.md");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes/today.md")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn overwrites_existing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();
        let tool = WriteFileTool::new(Workspace::new(dir.path()));
        tool.execute(serde_json::json!({"filename": "a.txt", "content": "new"}))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn missing_content_and_protected_files() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(Workspace::new(dir.path()));
        assert!(matches!(
            tool.execute(serde_json::json!({"filename": "a.txt"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(serde_json::json!({"filename": ".env", "content": "X=1"})).await,
            Err(ToolError::PermissionDenied { .. })
        ));
        assert!(!dir.path().join(".env").exists());
    }
}
