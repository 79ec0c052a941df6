//! Stream-level and agent-level events.
//!
//! [`StreamEvent`] is what one request attempt produces, in order.
//! [`AgentEvent`] is what a caller of [`Agent::run`](crate::Agent::run)
//! consumes: always `AgentStart` first and exactly one `AgentEnd` last.

use ancient_core::error::ErrorKind;
use ancient_core::message::MessageToolCall;
use ancient_core::provider::TokenUsage;
use serde::{Deserialize, Serialize};

/// Why a finished tool call's arguments could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolArgumentError {
    #[error("tool call at index {index} never received a name")]
    MissingName { index: u32 },

    #[error("arguments are not valid JSON ({message}): {raw}")]
    Malformed { raw: String, message: String },
}

/// A fully assembled tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub index: u32,
    pub call_id: String,
    pub name: String,
    /// Concatenated argument chunks exactly as received
    pub raw_arguments: String,
    /// Parsed arguments, or why they could not be parsed
    pub arguments: Result<serde_json::Value, ToolArgumentError>,
}

impl ToolCallRecord {
    /// The call as it is recorded in the assistant message sent back to
    /// the model.
    pub fn to_message_tool_call(&self) -> MessageToolCall {
        let arguments = if self.raw_arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            self.raw_arguments.clone()
        };
        MessageToolCall {
            id: self.call_id.clone(),
            name: self.name.clone(),
            arguments,
        }
    }
}

/// Events emitted by a single stream attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Partial text from the model.
    TextDelta { content: String, role: String },

    /// A tool call's name is known; arguments may still be streaming.
    ToolCallStarted { call_id: String, name: String },

    /// Another piece of a started tool call's arguments.
    ToolCallArgumentsDelta {
        call_id: String,
        name: String,
        arguments_chunk: String,
    },

    /// A tool call is fully received. Emitted at stream exhaustion, in
    /// ascending index order.
    ToolCallCompleted { record: ToolCallRecord },

    /// The stream ended normally.
    StreamCompleted {
        finish_reason: Option<String>,
        usage: TokenUsage,
    },

    /// The attempt failed; nothing else follows.
    StreamFailed { kind: ErrorKind, message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::StreamCompleted { .. } | Self::StreamFailed { .. }
        )
    }
}

/// Events emitted by the agent to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Processing of the user message has begun.
    AgentStart { message: String },

    /// Partial text from the model.
    TextDelta { content: String },

    /// All text of one model turn.
    TextComplete { content: String },

    /// The agent is about to run a tool.
    ToolCallStart {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// A tool finished (or was refused).
    ToolCallComplete {
        call_id: String,
        name: String,
        success: bool,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// The run failed. `AgentEnd` still follows.
    AgentError {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },

    /// Always the last event of a run.
    AgentEnd { response: String, usage: TokenUsage },
}

impl AgentEvent {
    /// Event name, as used in the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentStart { .. } => "agent_start",
            Self::TextDelta { .. } => "text_delta",
            Self::TextComplete { .. } => "text_complete",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallComplete { .. } => "tool_call_complete",
            Self::AgentError { .. } => "agent_error",
            Self::AgentEnd { .. } => "agent_end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_event_serialization_text_delta() {
        let event = AgentEvent::TextDelta {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"text_delta""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn agent_event_serialization_end() {
        let event = AgentEvent::AgentEnd {
            response: "done".into(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
                cached_tokens: 0,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"agent_end""#));
        assert!(json.contains(r#""total_tokens":30"#));
    }

    #[test]
    fn agent_error_omits_missing_details() {
        let event = AgentEvent::AgentError {
            error: "boom".into(),
            details: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"agent_error""#));
        assert!(!json.contains("details"));
    }

    #[test]
    fn event_type_matches_tag() {
        let events = [
            AgentEvent::AgentStart {
                message: "x".into(),
            },
            AgentEvent::TextComplete {
                content: "x".into(),
            },
            AgentEvent::ToolCallStart {
                call_id: "c".into(),
                name: "n".into(),
                arguments: serde_json::Value::Null,
            },
        ];
        for event in events {
            let json: serde_json::Value = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn stream_failed_serializes_kind() {
        let event = StreamEvent::StreamFailed {
            kind: ErrorKind::RateLimited,
            message: "429".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""kind":"rate_limited""#));
        assert!(event.is_terminal());
    }

    #[test]
    fn empty_arguments_become_empty_object_on_the_wire() {
        let record = ToolCallRecord {
            index: 0,
            call_id: "call_0".into(),
            name: "list".into(),
            raw_arguments: String::new(),
            arguments: Ok(serde_json::json!({})),
        };
        assert_eq!(record.to_message_tool_call().arguments, "{}");
    }

    #[test]
    fn argument_error_messages() {
        let err = ToolArgumentError::Malformed {
            raw: "{\"q\":".into(),
            message: "EOF while parsing".into(),
        };
        assert!(err.to_string().contains("not valid JSON"));
        assert!(ToolArgumentError::MissingName { index: 2 }
            .to_string()
            .contains("index 2"));
    }
}
