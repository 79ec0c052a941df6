//! File read tool: read file contents, optionally a window of lines.

use ancient_core::error::ToolError;
use ancient_core::tool::{Tool, ToolInvocation, ToolKind, ToolResult};
use async_trait::async_trait;
use tracing::debug;

use crate::resolve_path;

/// Files larger than this are refused rather than streamed into context.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

pub struct FileReadTool {
    max_bytes: u64,
}

impl FileReadTool {
    pub fn new() -> Self {
        Self {
            max_bytes: MAX_FILE_BYTES,
        }
    }

    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Use offset and limit to read a range of lines."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read, relative to the working directory"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-based line to start reading from"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return"
                }
            },
            "required": ["path"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    async fn execute(&self, invocation: ToolInvocation) -> Result<ToolResult, ToolError> {
        let params = &invocation.params;
        let raw_path = params["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let offset = params["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let limit = params["limit"].as_u64().map(|l| l as usize);

        let path = resolve_path(&invocation.cwd, raw_path);
        debug!(path = %path.display(), offset, ?limit, "Reading file");

        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) => return Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
        };
        if meta.is_dir() {
            return Ok(ToolResult::failure(format!(
                "{} is a directory",
                path.display()
            )));
        }
        if meta.len() > self.max_bytes {
            return Ok(ToolResult::failure(format!(
                "File is {} bytes, larger than the {} byte limit",
                meta.len(),
                self.max_bytes
            )));
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
        };

        let total_lines = content.lines().count();
        let output = if offset == 1 && limit.is_none() {
            content
        } else {
            let lines = content.lines().skip(offset - 1);
            let selected: Vec<&str> = match limit {
                Some(limit) => lines.take(limit).collect(),
                None => lines.collect(),
            };
            selected.join("\n")
        };

        Ok(ToolResult::success(output)
            .with_metadata("path", serde_json::json!(path.display().to_string()))
            .with_metadata("total_lines", serde_json::json!(total_lines)))
    }
}
