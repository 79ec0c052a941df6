//! One request attempt.
//!
//! A [`StreamSession`] opens the provider stream, decodes every chunk,
//! feeds tool-call fragments to a fresh [`ToolCallAssembler`], and forwards
//! the resulting [`StreamEvent`]s to a sink as they happen. The terminal
//! event is returned as a [`SessionOutcome`] so the retry layer can decide
//! whether anyone should see a failure.
//!
//! ```text
//! Idle ──open──▶ Opened ──first chunk──▶ Streaming ──exhausted──▶ Completed
//!   │              │                        │
//!   └──────────────┴────────error───────────┴──────────────────▶ Failed
//! ```

use std::sync::Arc;

use ancient_core::error::{ErrorKind, ProviderError};
use ancient_core::provider::{Provider, ProviderRequest, TokenUsage};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::assembler::ToolCallAssembler;
use crate::decoder::{self, DEFAULT_ROLE, ToolCallFragment, WireSignal};
use crate::stream_event::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opened,
    Streaming,
    Completed,
    Failed,
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed {
        finish_reason: Option<String>,
        usage: TokenUsage,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl SessionOutcome {
    pub fn cancelled() -> Self {
        Self::Failed {
            kind: ErrorKind::Cancelled,
            message: "event consumer went away".into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                kind: ErrorKind::Cancelled,
                ..
            }
        )
    }

    /// The terminal stream event for this outcome.
    pub fn to_event(&self) -> StreamEvent {
        match self {
            Self::Completed {
                finish_reason,
                usage,
            } => StreamEvent::StreamCompleted {
                finish_reason: finish_reason.clone(),
                usage: *usage,
            },
            Self::Failed { kind, message } => StreamEvent::StreamFailed {
                kind: *kind,
                message: message.clone(),
            },
        }
    }
}

impl From<ProviderError> for SessionOutcome {
    fn from(e: ProviderError) -> Self {
        Self::Failed {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Drives a single attempt. Not reusable: a second `run` fails immediately.
pub struct StreamSession {
    provider: Arc<dyn Provider>,
    request: ProviderRequest,
    state: SessionState,
    assembler: ToolCallAssembler,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

impl StreamSession {
    pub fn new(provider: Arc<dyn Provider>, request: ProviderRequest) -> Self {
        Self {
            provider,
            request,
            state: SessionState::Idle,
            assembler: ToolCallAssembler::new(),
            finish_reason: None,
            usage: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the attempt, sending every non-terminal event to `sink`.
    ///
    /// If `sink` is closed the attempt stops at the next suspension point,
    /// dropping the open stream, and returns a `Cancelled` failure.
    pub async fn run(&mut self, sink: &mpsc::Sender<StreamEvent>) -> SessionOutcome {
        if self.state != SessionState::Idle {
            return SessionOutcome::Failed {
                kind: ErrorKind::Unexpected,
                message: "stream session already used".into(),
            };
        }

        let result = if self.request.stream {
            self.drive_stream(sink).await
        } else {
            self.drive_complete(sink).await
        };

        match result {
            Ok(()) => {
                self.state = SessionState::Completed;
                let outcome = SessionOutcome::Completed {
                    finish_reason: self.finish_reason.take(),
                    usage: self.usage.take().unwrap_or_default(),
                };
                debug!(?outcome, "Stream session completed");
                outcome
            }
            Err(outcome) => {
                self.state = SessionState::Failed;
                outcome
            }
        }
    }

    async fn drive_stream(&mut self, sink: &mpsc::Sender<StreamEvent>) -> Result<(), SessionOutcome> {
        let provider = Arc::clone(&self.provider);
        let opened = tokio::select! {
            _ = sink.closed() => return Err(SessionOutcome::cancelled()),
            opened = provider.stream(self.request.clone()) => opened,
        };
        let mut chunks = opened.map_err(SessionOutcome::from)?;
        self.state = SessionState::Opened;
        trace!(provider = %provider.name(), "Stream opened");

        loop {
            let item = tokio::select! {
                biased;
                _ = sink.closed() => return Err(SessionOutcome::cancelled()),
                item = chunks.recv() => item,
            };

            let chunk = match item {
                None => break,
                Some(Err(e)) => {
                    debug!(error = %e, kind = %e.kind(), "Transport failed mid-stream");
                    return Err(e.into());
                }
                Some(Ok(chunk)) => chunk,
            };
            self.state = SessionState::Streaming;

            let signals = decoder::decode_chunk(&chunk).map_err(|e| {
                warn!(error = %e, kind = %e.kind(), "Failed to decode stream chunk");
                SessionOutcome::from(e)
            })?;
            for signal in signals {
                self.apply(signal, sink).await?;
            }
        }

        self.finish(sink).await
    }

    /// Non-streaming mode: replay the aggregate response as the same event
    /// sequence a stream would have produced.
    async fn drive_complete(&mut self, sink: &mpsc::Sender<StreamEvent>) -> Result<(), SessionOutcome> {
        let provider = Arc::clone(&self.provider);
        let response = tokio::select! {
            _ = sink.closed() => return Err(SessionOutcome::cancelled()),
            response = provider.complete(self.request.clone()) => response,
        };
        let response = response.map_err(SessionOutcome::from)?;
        self.state = SessionState::Streaming;

        let message = response.message;
        if !message.content.is_empty() {
            self.apply(
                WireSignal::Text {
                    content: message.content,
                    role: DEFAULT_ROLE.to_string(),
                },
                sink,
            )
            .await?;
        }
        for (index, call) in message.tool_calls.into_iter().enumerate() {
            self.apply(
                WireSignal::ToolCallFragment(ToolCallFragment {
                    index: index as u32,
                    call_id: Some(call.id),
                    name: Some(call.name),
                    arguments_chunk: Some(call.arguments),
                }),
                sink,
            )
            .await?;
        }
        if let Some(reason) = response.finish_reason {
            self.finish_reason = Some(reason);
        }
        self.usage = response.usage;

        self.finish(sink).await
    }

    async fn apply(
        &mut self,
        signal: WireSignal,
        sink: &mpsc::Sender<StreamEvent>,
    ) -> Result<(), SessionOutcome> {
        match signal {
            WireSignal::Text { content, role } => {
                emit(sink, StreamEvent::TextDelta { content, role }).await
            }
            WireSignal::ToolCallFragment(fragment) => {
                for event in self.assembler.ingest(fragment) {
                    emit(sink, event).await?;
                }
                Ok(())
            }
            WireSignal::FinishReason(reason) => {
                self.finish_reason = Some(reason);
                Ok(())
            }
            WireSignal::Usage(usage) => {
                self.usage = Some(usage);
                Ok(())
            }
        }
    }

    /// Finalize pending tool calls once the transport is exhausted.
    async fn finish(&mut self, sink: &mpsc::Sender<StreamEvent>) -> Result<(), SessionOutcome> {
        let assembler = std::mem::take(&mut self.assembler);
        for record in assembler.finalize() {
            if let Err(e) = &record.arguments {
                warn!(index = record.index, name = %record.name, error = %e, "Tool call arguments unusable");
            }
            emit(sink, StreamEvent::ToolCallCompleted { record }).await?;
        }
        Ok(())
    }
}

async fn emit(sink: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<(), SessionOutcome> {
    sink.send(event)
        .await
        .map_err(|_| SessionOutcome::cancelled())
}
