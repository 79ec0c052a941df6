//! Conversation history store.
//!
//! Holds the optional system prompt and the append-only message history that
//! is sent, in order, with every request.

use crate::message::{Message, MessageToolCall};
use crate::token;

/// Built-in system prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Ancient, a terminal coding assistant. \
Answer concisely. When a tool can answer a question more reliably than memory, call it. \
Never invent file contents you have not read.";

/// Ordered conversation state for one agent session.
#[derive(Debug, Clone)]
pub struct ContextManager {
    system_prompt: Option<String>,
    history: Vec<Message>,
}

impl ContextManager {
    /// Create a store with the given system prompt (or none).
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
            history: Vec::new(),
        }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.history.push(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.history.push(Message::assistant(content));
    }

    /// Record an assistant turn that asked for tool calls.
    pub fn add_assistant_tool_calls(
        &mut self,
        content: impl Into<String>,
        tool_calls: Vec<MessageToolCall>,
    ) {
        self.history
            .push(Message::assistant_with_tool_calls(content, tool_calls));
    }

    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.history.push(Message::tool_result(tool_call_id, content));
    }

    /// Messages to send: system prompt first (if any), then history in
    /// insertion order.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(self.history.iter().cloned());
        messages
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Rough token count of everything [`messages`](Self::messages) returns.
    pub fn estimated_tokens(&self) -> usize {
        let system = self
            .system_prompt
            .as_deref()
            .map(|p| 4 + token::estimate_tokens(p))
            .unwrap_or(0);
        system + token::estimate_messages_tokens(&self.history)
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(Some(DEFAULT_SYSTEM_PROMPT.to_string()))
    }
}
