//! LLM provider implementations for Ancient.
//!
//! All providers implement the `ancient_core::Provider` trait. A provider
//! owns the wire connection and frames the response; it never interprets
//! chunk contents.

pub mod openai_compat;
pub mod sse;

pub use openai_compat::OpenAiCompatProvider;
pub use sse::{SseFrame, SseParser};
