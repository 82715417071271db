//! Read file tool: return a text file's contents.

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::Tool;

use crate::workspace::{Workspace, required_str};

/// Longer files are cut to keep the context window in check.
const MAX_CHARS: usize = 8000;

pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file in the workspace. Use it before analysing code, summarising documents or fixing bugs."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "File to read, relative to the workspace (e.g. src/main.rs)"
                }
            },
            "required": ["filename"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let filename = required_str(&arguments, "filename")?;
        let path = self.workspace.resolve(self.name(), filename)?;
        let shown = self.workspace.display(&path);

        if path.is_dir() {
            return Err(ToolError::failed(
                self.name(),
                format!("'{shown}' is a directory; use list_dir instead"),
            ));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ToolError::failed(self.name(), format!("Failed to read '{shown}': {e}")))?;
        let content = String::from_utf8(bytes).map_err(|_| {
            ToolError::failed(self.name(), format!("'{shown}' is not UTF-8 text"))
        })?;

        let total = content.chars().count();
        if total > MAX_CHARS {
            let head: String = content.chars().take(MAX_CHARS).collect();
            return Ok(format!(
                "[{shown}: {total} chars, showing the first {MAX_CHARS}]\n{head}\n[truncated]"
            ));
        }
        Ok(content)
    }
}
