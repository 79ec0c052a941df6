//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Close enough
//! for budgeting and logging; the provider's usage report is authoritative.

use crate::message::Message;
use crate::provider::ToolDefinition;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for role name, delimiters,
/// and formatting markers in the API wire format.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let overhead = 4;
    let tool_calls: usize = message
        .tool_calls
        .iter()
        .map(|tc| estimate_tokens(&tc.name) + estimate_tokens(&tc.arguments))
        .sum();
    overhead + estimate_tokens(&message.content) + tool_calls
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimate tokens for a slice of tool definitions (serialized as JSON).
pub fn estimate_tools_tokens(tools: &[ToolDefinition]) -> usize {
    tools
        .iter()
        .map(|t| estimate_tokens(&serde_json::to_string(t).unwrap_or_default()))
        .sum()
}
