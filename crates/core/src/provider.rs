//! Provider trait: the transport boundary to the LLM API.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as one aggregate message or as an ordered sequence of raw
//! [`WireChunk`]s. Interpreting those chunks is the agent's job, not the
//! transport's: a provider only frames and delivers them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "mistralai/devstral-2512:free", "gpt-4o")
    pub model: String,

    /// The conversation messages, in transmission order
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// How the model may pick tools (only sent when tools are present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// Tool selection mode sent alongside tool schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message, including any tool calls
    pub message: Message,

    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Token usage statistics
    pub usage: Option<TokenUsage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
///
/// Combinable element-wise with `+`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
}

impl TokenUsage {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
            cached_tokens: self.cached_tokens + other.cached_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// One raw unit of a streaming response, as delivered by the transport.
///
/// For SSE transports this is the payload of a single `data:` event. The
/// transport does not parse it; delivery order equals emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireChunk {
    pub data: String,
}

impl WireChunk {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

impl From<serde_json::Value> for WireChunk {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value.to_string())
    }
}

/// Receiving half of an open stream.
///
/// Channel close without an error is stream exhaustion; an `Err` item is a
/// transport failure and is always the last item sent.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<WireChunk, ProviderError>>;

/// The core Provider trait.
///
/// The agent calls `stream()` (or `complete()` in non-streaming mode)
/// without knowing which backend is behind it. Dropping the returned
/// receiver must release the underlying connection.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Open a streaming request and hand back the raw chunk sequence.
    async fn stream(&self, request: ProviderRequest)
    -> std::result::Result<ChunkReceiver, ProviderError>;

    /// Send a request and get a complete response.
    ///
    /// Default implementation reports that the provider is stream-only.
    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' only supports streaming",
            self.name()
        )))
    }

    /// Release any held connection resources. Safe to call more than once;
    /// a later request re-acquires them.
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_defaults() {
        let json = r#"{"model":"gpt-4o","messages":[]}"#;
        let req: ProviderRequest = serde_json::from_str(json).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!req.stream);
        assert!(req.tool_choice.is_none());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "file_read".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "The file to read" }
                },
                "required": ["path"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("file_read"));
        assert!(json.contains("path"));
    }

    #[test]
    fn tool_choice_is_lowercase() {
        assert_eq!(serde_json::to_string(&ToolChoice::Auto).unwrap(), r#""auto""#);
    }

    #[test]
    fn usage_adds_element_wise() {
        let a = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            cached_tokens: 2,
        };
        let mut b = TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
            cached_tokens: 0,
        };
        b += a;
        assert_eq!(
            b,
            TokenUsage {
                prompt_tokens: 11,
                completion_tokens: 7,
                total_tokens: 18,
                cached_tokens: 2,
            }
        );
        assert!(TokenUsage::default().is_empty());
        assert!(!b.is_empty());
    }

    #[test]
    fn wire_chunk_from_json() {
        let chunk = WireChunk::from(serde_json::json!({"choices": []}));
        assert_eq!(chunk.data, r#"{"choices":[]}"#);
    }
}
