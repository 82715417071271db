//! List directory tool: directories first, then files, by name.

use async_trait::async_trait;
use steward_core::error::ToolError;
use steward_core::tool::Tool;

use crate::workspace::Workspace;

const DEFAULT_MAX_ENTRIES: u64 = 200;
const HARD_MAX_ENTRIES: u64 = 1000;

pub struct ListDirTool {
    workspace: Workspace,
}

impl ListDirTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory with their kind and size."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the workspace, default '.'"
                },
                "max_entries": {
                    "type": "integer",
                    "description": "Maximum entries to show (1-1000, default 200)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let requested = arguments["path"].as_str().unwrap_or(".");
        let limit = arguments["max_entries"]
            .as_u64()
            .unwrap_or(DEFAULT_MAX_ENTRIES)
            .clamp(1, HARD_MAX_ENTRIES) as usize;

        let path = self.workspace.resolve(self.name(), requested)?;
        let shown = self.workspace.display(&path);
        let fail = |e: std::io::Error| ToolError::failed("list_dir", format!("Failed to list '{shown}': {e}"));

        if !path.is_dir() {
            return Err(ToolError::failed(self.name(), format!("Not a directory: {shown}")));
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path).await.map_err(fail)?;
        while let Some(entry) = dir.next_entry().await.map_err(fail)? {
            let meta = entry.metadata().await.ok();
            let is_dir = meta.as_ref().is_some_and(|m| m.is_dir());
            let size = meta.filter(|m| m.is_file()).map(|m| m.len()).unwrap_or(0);
            entries.push((is_dir, entry.file_name().to_string_lossy().into_owned(), size));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase())));

        let total = entries.len();
        let heading = if shown.is_empty() { "." } else { shown.as_str() };
        let mut lines = vec![format!("{heading}/")];
        for (is_dir, name, size) in entries.iter().take(limit) {
            let kind = if *is_dir { "DIR " } else { "FILE" };
            let suffix = if *is_dir { "/" } else { "" };
            lines.push(format!("{kind}\t{size:>8}\t{name}{suffix}"));
        }
        if total > limit {
            lines.push(format!("... (truncated, showing {limit}/{total})"));
        } else {
            lines.push(format!("{total} entries"));
        }
        Ok(lines.join("\n"))
    }
}
