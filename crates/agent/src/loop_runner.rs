//! The agent loop.
//!
//! One call to [`Agent::run`] processes one user message:
//!
//! 1. Record the message in the context store
//! 2. Send the history to the provider, retried per [`RetryPolicy`]
//! 3. Forward text deltas to the caller as they stream in
//! 4. If the model asked for tools: run them, record the results, go to 2
//! 5. Finish with `AgentEnd`, whatever happened
//!
//! The returned event stream is lazy and single-pass. Dropping it stops the
//! run at the next suspension point and releases the open connection.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use ancient_config::AppConfig;
use ancient_core::agent::AutonomyLevel;
use ancient_core::context::ContextManager;
use ancient_core::error::ErrorKind;
use ancient_core::provider::{
    Provider, ProviderRequest, TokenUsage, ToolChoice, ToolDefinition,
};
use ancient_core::tool::{ToolRegistry, ToolResult};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;
use crate::session::SessionOutcome;
use crate::stream_event::{AgentEvent, StreamEvent, ToolCallRecord};

/// Capacity of the event channels between pipeline stages.
const EVENT_BUFFER: usize = 64;

/// Orchestrates provider requests, tool execution, and event delivery.
///
/// Cloning is cheap; clones share the provider, tools, and history.
#[derive(Clone)]
pub struct Agent {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Conversation history shared across runs
    context: Arc<Mutex<ContextManager>>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,

    /// Stream responses, or request one aggregate response per turn
    stream: bool,

    retry: RetryPolicy,

    /// Maximum request/tool rounds per user message
    max_tool_iterations: u32,

    autonomy: AutonomyLevel,

    /// Directory tools resolve relative paths against
    cwd: PathBuf,
}

/// What one request/response round produced.
struct Turn {
    text: String,
    tool_calls: Vec<ToolCallRecord>,
    outcome: SessionOutcome,
}

impl Agent {
    /// Create an agent with no tools and the built-in system prompt.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools: Arc::new(ToolRegistry::new()),
            context: Arc::new(Mutex::new(ContextManager::default())),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            stream: true,
            retry: RetryPolicy::default(),
            max_tool_iterations: 25,
            autonomy: AutonomyLevel::default(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Create an agent from application configuration.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        config: &AppConfig,
    ) -> Self {
        let system_prompt = config
            .agent
            .system_prompt
            .clone()
            .unwrap_or_else(|| ancient_core::context::DEFAULT_SYSTEM_PROMPT.to_string());

        Self::new(provider, config.model.clone())
            .with_tools(tools)
            .with_context(ContextManager::new(Some(system_prompt)))
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_stream(config.stream)
            .with_retry_policy(RetryPolicy::from_config(&config.retry))
            .with_max_tool_iterations(config.agent.max_tool_iterations)
            .with_autonomy(config.agent.autonomy)
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Replace the context store (and with it the system prompt).
    pub fn with_context(mut self, context: ContextManager) -> Self {
        self.context = Arc::new(Mutex::new(context));
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the maximum number of tool call iterations.
    pub fn with_max_tool_iterations(mut self, max: u32) -> Self {
        self.max_tool_iterations = max.max(1);
        self
    }

    pub fn with_autonomy(mut self, autonomy: AutonomyLevel) -> Self {
        self.autonomy = autonomy;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of messages in the history (system prompt excluded).
    pub fn history_len(&self) -> usize {
        self.lock_context().len()
    }

    /// Snapshot of the conversation as it would be sent next.
    pub fn messages(&self) -> Vec<ancient_core::message::Message> {
        self.lock_context().messages()
    }

    fn lock_context(&self) -> MutexGuard<'_, ContextManager> {
        self.context
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Process one user message.
    ///
    /// The returned stream is lazy: nothing is sent or recorded until it is
    /// first polled. It always starts with `AgentStart` and ends with
    /// exactly one `AgentEnd`, even after an `AgentError`. Dropping it
    /// cancels the run.
    pub fn run(&self, message: impl Into<String>) -> AgentRun {
        AgentRun {
            state: RunState::Pending {
                agent: self.clone(),
                message: message.into(),
            },
        }
    }

    fn spawn(self, message: String) -> ReceiverStream<AgentEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = tx.closed() => debug!("Agent event consumer dropped, run cancelled"),
                _ = self.process(message, &tx) => {}
            }
        });
        ReceiverStream::new(rx)
    }

    /// Release the provider's connection resources.
    pub async fn close(&self) {
        self.provider.close().await;
    }

    async fn process(&self, message: String, tx: &mpsc::Sender<AgentEvent>) {
        info!(
            model = %self.model,
            history = self.history_len(),
            "Processing user message"
        );
        let start = AgentEvent::AgentStart {
            message: message.clone(),
        };
        if tx.send(start).await.is_err() {
            return;
        }
        self.lock_context().add_user_message(message);

        let tool_definitions = self.tools.definitions();
        let mut usage = TokenUsage::default();
        let mut response = String::new();

        for iteration in 1..=self.max_tool_iterations {
            debug!(iteration, "Agent loop iteration");

            let request = self.build_request(tool_definitions.clone());
            let turn = self.run_turn(request, tx).await;

            match turn.outcome {
                SessionOutcome::Completed { usage: turn_usage, .. } => usage += turn_usage,
                SessionOutcome::Failed { kind, .. } if kind == ErrorKind::Cancelled => {
                    return;
                }
                SessionOutcome::Failed { kind, message } => {
                    emit(tx, AgentEvent::AgentError {
                        error: message,
                        details: Some(serde_json::json!({
                            "kind": kind,
                            "iteration": iteration,
                        })),
                    })
                    .await;
                    response = turn.text;
                    break;
                }
            }

            if !turn.text.is_empty() {
                emit(tx, AgentEvent::TextComplete {
                    content: turn.text.clone(),
                })
                .await;
            }

            if turn.tool_calls.is_empty() {
                if !turn.text.is_empty() {
                    self.lock_context().add_assistant_message(turn.text.clone());
                }
                response = turn.text;
                break;
            }

            debug!(tool_count = turn.tool_calls.len(), "Executing tool calls");
            let mut results = Vec::with_capacity(turn.tool_calls.len());
            for record in &turn.tool_calls {
                let result = self.execute_tool(record, tx).await;
                results.push((record.call_id.clone(), result.to_model_content()));
            }

            // Calls and their results land together or not at all
            {
                let mut context = self.lock_context();
                context.add_assistant_tool_calls(
                    turn.text.clone(),
                    turn.tool_calls
                        .iter()
                        .map(ToolCallRecord::to_message_tool_call)
                        .collect(),
                );
                for (call_id, content) in results {
                    context.add_tool_result(call_id, content);
                }
            }

            if iteration == self.max_tool_iterations {
                warn!(iterations = iteration, "Max tool iterations reached");
                emit(tx, AgentEvent::AgentError {
                    error: format!(
                        "Reached the maximum of {} tool iterations without a final answer",
                        self.max_tool_iterations
                    ),
                    details: Some(serde_json::json!({ "iterations": iteration })),
                })
                .await;
                response = turn.text;
            }
        }

        emit(tx, AgentEvent::AgentEnd { response, usage }).await;
    }

    fn build_request(&self, tools: Vec<ToolDefinition>) -> ProviderRequest {
        let tool_choice = (!tools.is_empty()).then_some(ToolChoice::Auto);
        ProviderRequest {
            model: self.model.clone(),
            messages: self.lock_context().messages(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
            tool_choice,
            stream: self.stream,
        }
    }

    /// Run one retried request, translating stream events as they arrive.
    async fn run_turn(&self, request: ProviderRequest, tx: &mpsc::Sender<AgentEvent>) -> Turn {
        let (stream_tx, mut stream_rx) = mpsc::channel(EVENT_BUFFER);
        let retry = &self.retry;
        let provider = &self.provider;

        let producer = async move {
            let outcome = retry.run(provider, &request, &stream_tx).await;
            drop(stream_tx);
            outcome
        };

        let consumer = async {
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            while let Some(event) = stream_rx.recv().await {
                match event {
                    StreamEvent::TextDelta { content, .. } => {
                        text.push_str(&content);
                        if tx.send(AgentEvent::TextDelta { content }).await.is_err() {
                            break;
                        }
                    }
                    StreamEvent::ToolCallStarted { call_id, name } => {
                        debug!(%call_id, %name, "Model started a tool call");
                    }
                    StreamEvent::ToolCallArgumentsDelta { .. } => {}
                    StreamEvent::ToolCallCompleted { record } => tool_calls.push(record),
                    StreamEvent::StreamCompleted { .. } | StreamEvent::StreamFailed { .. } => {}
                }
            }
            (text, tool_calls)
        };

        let (outcome, (text, tool_calls)) = tokio::join!(producer, consumer);
        Turn {
            text,
            tool_calls,
            outcome,
        }
    }

    /// Execute one assembled call, reporting start and completion.
    async fn execute_tool(
        &self,
        record: &ToolCallRecord,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> ToolResult {
        let arguments = match &record.arguments {
            Ok(value) => value.clone(),
            Err(_) => serde_json::Value::String(record.raw_arguments.clone()),
        };
        emit(tx, AgentEvent::ToolCallStart {
            call_id: record.call_id.clone(),
            name: record.name.clone(),
            arguments: arguments.clone(),
        })
        .await;

        let result = match &record.arguments {
            Err(e) => ToolResult::failure(format!("Invalid arguments for '{}': {e}", record.name)),
            Ok(_) => match self.tools.get(&record.name) {
                None => ToolResult::failure(format!("Unknown tool: {}", record.name)),
                Some(tool) if !self.autonomy.permits(tool) => {
                    info!(tool = %record.name, autonomy = ?self.autonomy, "Tool refused");
                    ToolResult::failure(format!(
                        "Tool '{}' is not permitted at the current autonomy level",
                        record.name
                    ))
                }
                Some(_) => {
                    let start = std::time::Instant::now();
                    let result = self
                        .tools
                        .execute(&record.name, arguments, self.cwd.clone())
                        .await;
                    let duration_ms = start.elapsed().as_millis() as u64;
                    match result {
                        Ok(result) => {
                            debug!(tool = %record.name, success = result.success, duration_ms, "Tool executed");
                            result
                        }
                        Err(e) => {
                            warn!(tool = %record.name, error = %e, duration_ms, "Tool execution failed");
                            ToolResult::failure(e.to_string())
                        }
                    }
                }
            },
        };

        emit(tx, AgentEvent::ToolCallComplete {
            call_id: record.call_id.clone(),
            name: record.name.clone(),
            success: result.success,
            output: result.output.clone(),
            error: result.error.clone(),
        })
        .await;

        result
    }
}

/// Event stream of one [`Agent::run`].
pub struct AgentRun {
    state: RunState,
}

enum RunState {
    Pending { agent: Agent, message: String },
    Running(ReceiverStream<AgentEvent>),
    Finished,
}

impl Stream for AgentRun {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<AgentEvent>> {
        if let RunState::Pending { .. } = self.state {
            if let RunState::Pending { agent, message } =
                std::mem::replace(&mut self.state, RunState::Finished)
            {
                self.state = RunState::Running(agent.spawn(message));
            }
        }

        match &mut self.state {
            RunState::Running(events) => Pin::new(events).poll_next(cx),
            RunState::Pending { .. } | RunState::Finished => Poll::Ready(None),
        }
    }
}

async fn emit(tx: &mpsc::Sender<AgentEvent>, event: AgentEvent) {
    let _ = tx.send(event).await;
}
