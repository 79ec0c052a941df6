//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! read and write files, run commands, reach the network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::schema;

/// Coarse category of what a tool touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Read,
    Write,
    Shell,
    Network,
    Memory,
    Mcp,
}

/// Everything a tool gets when it runs.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Working directory relative paths resolve against
    pub cwd: PathBuf,

    /// Validated arguments
    pub params: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// What went wrong, when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Text handed back to the model as the tool message content.
    pub fn to_model_content(&self) -> String {
        match (&self.error, self.success) {
            (Some(error), false) if self.output.is_empty() => format!("Error: {error}"),
            (Some(error), false) => format!("{}\nError: {error}", self.output),
            _ => self.output.clone(),
        }
    }
}

/// The core Tool trait.
///
/// Each capability implements this and is registered in the
/// [`ToolRegistry`]. Whether a tool mutates state drives autonomy gating.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    fn kind(&self) -> ToolKind;

    /// Whether running this tool changes anything outside the process.
    fn is_mutating(&self) -> bool {
        matches!(self.kind(), ToolKind::Write | ToolKind::Shell)
    }

    /// Whether a supervised session must refuse this tool.
    fn requires_confirmation(&self) -> bool {
        self.is_mutating()
    }

    /// Execute the tool.
    async fn execute(&self, invocation: ToolInvocation) -> std::result::Result<ToolResult, ToolError>;

    /// Check parameters against the schema; empty means valid.
    fn validate_params(&self, params: &serde_json::Value) -> Vec<String> {
        schema::validate_params(&self.parameters_schema(), params)
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up and execute tools when the LLM requests them
///
/// Ordered by name so repeated requests carry identical schemas.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Validate and execute a call by name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
        cwd: PathBuf,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let errors = tool.validate_params(&arguments);
        if !errors.is_empty() {
            tracing::debug!(tool = name, ?errors, "Rejected tool arguments");
            return Err(ToolError::InvalidArguments(errors.join("; ")));
        }

        tracing::debug!(tool = name, kind = ?tool.kind(), "Executing tool");
        tool.execute(ToolInvocation {
            cwd,
            params: arguments,
        })
        .await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Read
        }
        async fn execute(
            &self,
            invocation: ToolInvocation,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = invocation.params["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::success(text))
        }
    }

    struct WriterTool;

    #[async_trait]
    impl Tool for WriterTool {
        fn name(&self) -> &str {
            "writer"
        }
        fn description(&self) -> &str {
            "Pretends to write"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Write
        }
        async fn execute(
            &self,
            _invocation: ToolInvocation,
        ) -> std::result::Result<ToolResult, ToolError> {
            Ok(ToolResult::success("written"))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_definitions_are_name_ordered() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(WriterTool));
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[1].name, "writer");
    }

    #[test]
    fn mutating_follows_kind() {
        assert!(!EchoTool.is_mutating());
        assert!(!EchoTool.requires_confirmation());
        assert!(WriterTool.is_mutating());
        assert!(WriterTool.requires_confirmation());
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry
            .execute(
                "echo",
                serde_json::json!({"text": "hello world"}),
                PathBuf::from("."),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
    }

    #[tokio::test]
    async fn registry_rejects_invalid_params() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let err = registry
            .execute("echo", serde_json::json!({}), PathBuf::from("."))
            .await
            .unwrap_err();
        match err {
            ToolError::InvalidArguments(msg) => assert!(msg.contains("text")),
            other => panic!("Expected InvalidArguments, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nonexistent", serde_json::json!({}), PathBuf::from("."))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn model_content_reports_errors() {
        assert_eq!(ToolResult::success("ok").to_model_content(), "ok");
        assert_eq!(
            ToolResult::failure("boom").to_model_content(),
            "Error: boom"
        );
        let partial = ToolResult {
            output: "half".into(),
            ..ToolResult::failure("boom")
        };
        assert_eq!(partial.to_model_content(), "half\nError: boom");
    }
}
