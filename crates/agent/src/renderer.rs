//! Display boundary.
//!
//! A [`Renderer`] paints agent events; [`render_stream`] drives one from an
//! event stream and reports how the run ended.

use ancient_core::provider::TokenUsage;
use futures::{Stream, StreamExt};

use crate::stream_event::AgentEvent;

/// Something that shows a conversation to a person. Calls arrive in event
/// order, one at a time.
pub trait Renderer {
    fn show_banner(&mut self);

    fn begin_assistant_turn(&mut self);

    fn append_text(&mut self, delta: &str);

    fn end_assistant_turn(&mut self);

    fn report_error(&mut self, message: &str);

    fn tool_call_started(&mut self, _name: &str, _arguments: &serde_json::Value) {}

    fn tool_call_finished(&mut self, _name: &str, _success: bool, _output: &str) {}
}

/// How a rendered run ended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutcome {
    pub response: String,
    pub usage: TokenUsage,
    pub had_error: bool,
}

/// Feed every event of one run to `renderer`.
///
/// An assistant turn opens on the first text delta and closes before any
/// tool call, error, or the end of the run.
pub async fn render_stream<S, R>(events: S, renderer: &mut R) -> RenderOutcome
where
    S: Stream<Item = AgentEvent>,
    R: Renderer + ?Sized,
{
    let mut events = std::pin::pin!(events);
    let mut outcome = RenderOutcome::default();
    let mut turn_open = false;

    while let Some(event) = events.next().await {
        match event {
            AgentEvent::AgentStart { .. } => {}
            AgentEvent::TextDelta { content } => {
                if !turn_open {
                    renderer.begin_assistant_turn();
                    turn_open = true;
                }
                renderer.append_text(&content);
            }
            AgentEvent::TextComplete { .. } => {
                close_turn(renderer, &mut turn_open);
            }
            AgentEvent::ToolCallStart {
                name, arguments, ..
            } => {
                close_turn(renderer, &mut turn_open);
                renderer.tool_call_started(&name, &arguments);
            }
            AgentEvent::ToolCallComplete {
                name,
                success,
                output,
                error,
                ..
            } => {
                let shown = if success {
                    output
                } else {
                    error.unwrap_or(output)
                };
                renderer.tool_call_finished(&name, success, &shown);
            }
            AgentEvent::AgentError { error, .. } => {
                close_turn(renderer, &mut turn_open);
                renderer.report_error(&error);
                outcome.had_error = true;
            }
            AgentEvent::AgentEnd { response, usage } => {
                close_turn(renderer, &mut turn_open);
                outcome.response = response;
                outcome.usage = usage;
            }
        }
    }

    close_turn(renderer, &mut turn_open);
    outcome
}

fn close_turn<R: Renderer + ?Sized>(renderer: &mut R, turn_open: &mut bool) {
    if *turn_open {
        renderer.end_assistant_turn();
        *turn_open = false;
    }
}
