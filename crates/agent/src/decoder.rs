//! Wire event decoder.
//!
//! Turns one raw OpenAI-style streaming chunk into zero or more normalized
//! signals. Stateless: the same chunk always decodes to the same signals.
//!
//! Only the first choice is considered. Usage is looked for in every chunk,
//! not just the last one, and a finish reason is reported as a signal but
//! never ends the stream by itself.

use ancient_core::error::ProviderError;
use ancient_core::provider::{TokenUsage, WireChunk};
use serde::Deserialize;

/// Role reported when a text delta does not name one.
pub const DEFAULT_ROLE: &str = "assistant";

/// A low-level signal extracted from one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireSignal {
    Text { content: String, role: String },
    ToolCallFragment(ToolCallFragment),
    FinishReason(String),
    Usage(TokenUsage),
}

/// One partial tool call. Fragments sharing an index belong to the same call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub arguments_chunk: Option<String>,
}

/// Decode one chunk.
///
/// A chunk that is not valid JSON of the expected shape yields
/// [`ProviderError::Decode`]. A chunk carrying an `error` object yields the
/// provider error it describes, so it is classified like an HTTP failure.
pub fn decode_chunk(chunk: &WireChunk) -> Result<Vec<WireSignal>, ProviderError> {
    let payload: ChunkPayload = serde_json::from_str(&chunk.data)
        .map_err(|e| ProviderError::Decode(format!("{e} in chunk {}", excerpt(&chunk.data))))?;

    if let Some(error) = payload.error {
        return Err(error.into_provider_error());
    }

    let mut signals = Vec::new();

    if let Some(choice) = payload.choices.into_iter().next() {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                signals.push(WireSignal::Text {
                    content,
                    role: delta
                        .role
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
                });
            }

            for (position, call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
                let (name, arguments_chunk) = match call.function {
                    Some(function) => (function.name, function.arguments),
                    None => (None, None),
                };
                signals.push(WireSignal::ToolCallFragment(ToolCallFragment {
                    index: call.index.unwrap_or(position as u32),
                    call_id: call.id,
                    name,
                    arguments_chunk,
                }));
            }
        }

        if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
            signals.push(WireSignal::FinishReason(reason));
        }
    }

    if let Some(usage) = payload.usage {
        signals.push(WireSignal::Usage(usage.into()));
    }

    Ok(signals)
}

fn excerpt(data: &str) -> String {
    const MAX: usize = 120;
    match data.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{:?}...", &data[..cut]),
        None => format!("{data:?}"),
    }
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChoicePayload>,
    #[serde(default)]
    usage: Option<UsagePayload>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct ChoicePayload {
    #[serde(default)]
    delta: Option<DeltaPayload>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDeltaPayload>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDeltaPayload {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDeltaPayload>,
}

#[derive(Debug, Deserialize)]
struct FunctionDeltaPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl From<UsagePayload> for TokenUsage {
    fn from(u: UsagePayload) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            cached_tokens: u.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ErrorPayload {
    fn into_provider_error(self) -> ProviderError {
        let message = self
            .message
            .unwrap_or_else(|| "provider reported an error".into());

        match self.code {
            Some(serde_json::Value::Number(n)) => match n.as_u64().and_then(|c| u16::try_from(c).ok()) {
                Some(429) => ProviderError::RateLimited { retry_after_secs: 0 },
                Some(status_code) => ProviderError::ApiError { status_code, message },
                None => ProviderError::ApiError { status_code: 500, message },
            },
            Some(serde_json::Value::String(code)) if code.to_lowercase().contains("rate") => {
                ProviderError::RateLimited { retry_after_secs: 0 }
            }
            _ => ProviderError::ApiError {
                status_code: 500,
                message,
            },
        }
    }
}
