//! The streaming turn engine for Ancient.
//!
//! One user turn flows through these stages:
//!
//! 1. **Decode** each raw provider chunk into text, tool-call fragments,
//!    finish reasons and usage ([`decoder`])
//! 2. **Assemble** fragmented tool calls per index ([`assembler`])
//! 3. **Stream** one attempt as a [`StreamSession`], ending in exactly one
//!    terminal event
//! 4. **Retry** failed attempts with backoff ([`RetryPolicy`])
//! 5. **Loop** through tool calls until the model answers in text ([`Agent`])
//! 6. **Render** the resulting [`AgentEvent`] stream ([`render_stream`])

pub mod assembler;
pub mod decoder;
pub mod loop_runner;
pub mod renderer;
pub mod retry;
pub mod session;
pub mod stream_event;

pub use assembler::ToolCallAssembler;
pub use decoder::{ToolCallFragment, WireSignal, decode_chunk};
pub use loop_runner::{Agent, AgentRun};
pub use renderer::{RenderOutcome, Renderer, render_stream};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::{SessionOutcome, SessionState, StreamSession};
pub use stream_event::{AgentEvent, StreamEvent, ToolArgumentError, ToolCallRecord};
