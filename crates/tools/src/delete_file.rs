//! Delete file tool: remove a file or directory.

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::Tool;

use crate::workspace::{Workspace, required_str};

pub struct DeleteFileTool {
    workspace: Workspace,
}

impl DeleteFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file or an empty directory in the workspace. Set recursive=true to delete a non-empty directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filepath": {
                    "type": "string",
                    "description": "File or directory to delete, relative to the workspace"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Delete non-empty directories, default false"
                }
            },
            "required": ["filepath"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let filepath = required_str(&arguments, "filepath")?;
        let recursive = arguments["recursive"].as_bool().unwrap_or(false);
        let path = self.workspace.resolve_for_write(self.name(), filepath)?;
        let shown = self.workspace.display(&path);

        if path == self.workspace.resolve(self.name(), ".")? {
            return Err(ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: "refusing to delete the workspace root".into(),
            });
        }

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| ToolError::failed(self.name(), format!("Path does not exist: {shown}")))?;
        let fail = |e: std::io::Error| ToolError::failed("delete_file", format!("Failed to delete '{shown}': {e}"));

        if meta.is_file() {
            tokio::fs::remove_file(&path).await.map_err(fail)?;
            return Ok(format!("Deleted file {shown} ({} bytes)", meta.len()));
        }

        if recursive {
            tokio::fs::remove_dir_all(&path).await.map_err(fail)?;
            return Ok(format!("Deleted directory {shown} recursively"));
        }

        let mut entries = tokio::fs::read_dir(&path).await.map_err(fail)?;
        if entries.next_entry().await.map_err(fail)?.is_some() {
            return Err(ToolError::failed(
                self.name(),
                format!("Directory not empty: {shown}. Set recursive=true to delete it."),
            ));
        }
        tokio::fs::remove_dir(&path).await.map_err(fail)?;
        Ok(format!("Deleted empty directory {shown}"))
    }
}
