//! File write tool: create or overwrite a file.

use ancient_core::error::ToolError;
use ancient_core::tool::{Tool, ToolInvocation, ToolKind, ToolResult};
use async_trait::async_trait;
use tracing::debug;

use crate::resolve_path;

#[derive(Default)]
pub struct FileWriteTool;

impl FileWriteTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file (and parent directories) if it doesn't exist, overwrites if it does."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to, relative to the working directory"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Write
    }

    async fn execute(&self, invocation: ToolInvocation) -> Result<ToolResult, ToolError> {
        let params = &invocation.params;
        let raw_path = params["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = params["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let path = resolve_path(&invocation.cwd, raw_path);
        debug!(path = %path.display(), bytes = content.len(), "Writing file");

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolResult::failure(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                )));
            }
        }

        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        match tokio::fs::write(&path, content).await {
            Ok(()) => Ok(ToolResult::success(format!(
                "{} {} bytes to {}",
                if existed { "Overwrote" } else { "Wrote" },
                content.len(),
                path.display()
            ))
            .with_metadata("bytes", serde_json::json!(content.len()))
            .with_metadata("created", serde_json::json!(!existed))),
            Err(e) => Ok(ToolResult::failure(format!("Failed to write file: {e}"))),
        }
    }
}
