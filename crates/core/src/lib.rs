//! # Ancient Core
//!
//! Domain types, traits, and error definitions for the Ancient terminal agent.
//! This crate has **no transport or UI dependencies**: it defines the model
//! that the provider, tool, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait or plain value type here:
//! - `Provider` is the transport boundary to the LLM API
//! - `Tool` / `ToolRegistry` is the capability boundary
//! - `ContextManager` is the ordered history handed to each request

pub mod agent;
pub mod context;
pub mod error;
pub mod message;
pub mod provider;
pub mod schema;
pub mod token;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::AutonomyLevel;
pub use context::ContextManager;
pub use error::{Error, ErrorKind, ProviderError, Result, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, TokenUsage, ToolChoice,
    ToolDefinition, WireChunk,
};
pub use tool::{Tool, ToolInvocation, ToolKind, ToolRegistry, ToolResult};
