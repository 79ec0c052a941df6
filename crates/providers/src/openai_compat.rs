//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenRouter, OpenAI, Ollama, vLLM, llama.cpp, Groq,
//! Together AI, DeepSeek, and any endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Streaming SSE responses, delivered as raw [`WireChunk`]s
//! - Non-streaming completions
//! - Tool use / function calling
//!
//! The HTTP client is created lazily on first use and released by
//! [`Provider::close`]; a later request builds a fresh one.

use std::sync::Mutex;
use std::time::Duration;

use ancient_config::AppConfig;
use ancient_core::error::ProviderError;
use ancient_core::message::{Message, MessageToolCall};
use ancient_core::provider::*;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::sse::{SseFrame, SseParser};

/// Capacity of the chunk channel between the SSE reader task and the agent.
const CHUNK_BUFFER: usize = 64;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    /// Lazily built; `None` after `close()`.
    client: Mutex<Option<reqwest::Client>>,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(60),
            client: Mutex::new(None),
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            Some(api_key.into()),
        )
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            None,
        )
    }

    /// Build a provider from application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.provider.clone(),
            config.resolved_base_url(),
            config.api_key.clone(),
        )
        .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether an HTTP client is currently held.
    pub fn is_connected(&self) -> bool {
        self.lock_client().is_some()
    }

    fn lock_client(&self) -> std::sync::MutexGuard<'_, Option<reqwest::Client>> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The single acquisition point for the HTTP client.
    fn client(&self) -> Result<reqwest::Client, ProviderError> {
        let mut slot = self.lock_client();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;
        debug!(provider = %self.name, "HTTP client created");
        *slot = Some(client.clone());
        Ok(client)
    }

    fn build_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] =
                serde_json::json!(request.tool_choice.unwrap_or(ToolChoice::Auto));
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let client = self.client()?;

        let mut builder = client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder = if stream {
            builder.header("Accept", "text/event-stream")
        } else {
            builder.timeout(self.timeout)
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
        Err(map_status(status, error_body, retry_after))
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

/// Map a non-success HTTP status onto a provider error.
fn map_status(status: u16, body: String, retry_after: Option<u64>) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(0),
        },
        401 | 403 => ProviderError::AuthenticationFailed(if body.is_empty() {
            "Invalid API key or insufficient permissions".into()
        } else {
            body
        }),
        404 => ProviderError::ModelNotFound(body),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let body = self.build_body(&request, true);
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post(&body, true).await?;

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        let provider_name = self.name.clone();
        let idle_timeout = self.timeout;

        // Read the SSE byte stream until [DONE], EOF, an error, a silence
        // longer than `idle_timeout`, or until the receiver goes away.
        // Dropping `response` releases the connection.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut parser = SseParser::new();

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        trace!(provider = %provider_name, "Chunk receiver dropped");
                        return;
                    }
                    next = tokio::time::timeout(idle_timeout, byte_stream.next()) => next,
                };
                let Ok(next) = next else {
                    warn!(
                        provider = %provider_name,
                        idle_ms = idle_timeout.as_millis() as u64,
                        "Stream stalled"
                    );
                    let _ = tx
                        .send(Err(ProviderError::Timeout(format!(
                            "no data received for {}ms",
                            idle_timeout.as_millis()
                        ))))
                        .await;
                    return;
                };

                let exhausted = next.is_none();
                let frames = match next {
                    Some(Ok(bytes)) => parser.feed(&bytes),
                    Some(Err(e)) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                    None => parser.finish().into_iter().collect(),
                };

                for frame in frames {
                    match frame {
                        SseFrame::Done => return,
                        SseFrame::Data(data) => {
                            trace!(provider = %provider_name, data = %data, "SSE chunk");
                            if tx.send(Ok(WireChunk::new(data))).await.is_err() {
                                return;
                            }
                        }
                    }
                }

                if exhausted {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = self.build_body(&request, false);
        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.post(&body, false).await?;
        let text = response.text().await.map_err(map_reqwest_error)?;
        let api_response: ApiResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Decode(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("No choices in response".into()))?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let message =
            Message::assistant_with_tool_calls(choice.message.content.unwrap_or_default(), tool_calls);

        let usage = api_response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            cached_tokens: u
                .prompt_tokens_details
                .map(|d| d.cached_tokens)
                .unwrap_or(0),
        });

        Ok(ProviderResponse {
            message,
            finish_reason: choice.finish_reason,
            usage,
            model: api_response.model.unwrap_or(request.model),
        })
    }

    async fn close(&self) {
        if self.lock_client().take().is_some() {
            debug!(provider = %self.name, "HTTP client released");
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<ApiPromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiPromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}
