//! Ancient CLI: the main entry point.
//!
//! - `ancient "prompt"` runs one turn and exits (1 if the turn failed)
//! - `ancient` on a terminal opens an interactive session
//!
//! Ctrl-C during a turn cancels the request and exits cleanly.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ancient_agent::{Agent, RenderOutcome, Renderer, render_stream};
use ancient_config::AppConfig;
use ancient_core::TokenUsage;
use ancient_providers::OpenAiCompatProvider;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

mod terminal;

use terminal::TerminalRenderer;

type Terminal = TerminalRenderer<std::io::Stdout, std::io::Stderr>;

#[derive(Parser, Debug)]
#[command(
    name = "ancient",
    about = "Ancient: a streaming terminal coding agent",
    version
)]
struct Cli {
    /// Message to send. Omit to start an interactive session
    prompt: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the configured model
    #[arg(long)]
    model: Option<String>,

    /// Request whole responses instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Read configuration from this file instead of ~/.ancient/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// How a single turn ended.
enum TurnEnd {
    Finished(RenderOutcome),
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the answer
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("  [error] {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    if !config.has_api_key() {
        warn!(
            provider = %config.provider,
            "No API key configured; set ANCIENT_API_KEY or add api_key to {}",
            AppConfig::config_dir().join("config.toml").display()
        );
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config));
    info!(
        provider = %config.provider,
        base_url = %provider.base_url(),
        model = %config.model,
        stream = config.stream,
        "Provider ready"
    );
    let tools = Arc::new(ancient_tools::default_registry());
    let agent = Agent::from_config(provider, tools, &config);
    let mut terminal = TerminalRenderer::stdio(&config.model, &config.provider);

    let result = match cli.prompt {
        Some(prompt) => Ok(single_turn(&agent, &prompt, &mut terminal).await),
        None if std::io::stdin().is_terminal() => interactive(&agent, &mut terminal).await,
        None => {
            eprintln!("  [error] No prompt given and stdin is not a terminal");
            Ok(ExitCode::FAILURE)
        }
    };

    agent.close().await;
    result
}

fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    Ok(AppConfig::load_layered(&path, |config| apply_overrides(config, cli))?)
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if cli.no_stream {
        config.stream = false;
    }
}

async fn single_turn(agent: &Agent, prompt: &str, terminal: &mut Terminal) -> ExitCode {
    match turn(agent, prompt, terminal).await {
        TurnEnd::Finished(outcome) if outcome.had_error => ExitCode::FAILURE,
        TurnEnd::Finished(_) | TurnEnd::Interrupted => ExitCode::SUCCESS,
    }
}

async fn interactive(
    agent: &Agent,
    terminal: &mut Terminal,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    terminal.show_banner();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        terminal.prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        if let TurnEnd::Interrupted = turn(agent, input, terminal).await {
            return Ok(ExitCode::SUCCESS);
        }
    }

    terminal.goodbye();
    Ok(ExitCode::SUCCESS)
}

/// Run one message through the agent, rendering as events arrive.
/// Ctrl-C drops the event stream, which cancels the request.
async fn turn(agent: &Agent, message: &str, terminal: &mut Terminal) -> TurnEnd {
    let events = agent.run(message);
    let end = tokio::select! {
        outcome = render_stream(events, &mut *terminal) => TurnEnd::Finished(outcome),
        _ = tokio::signal::ctrl_c() => TurnEnd::Interrupted,
    };

    match &end {
        TurnEnd::Finished(outcome) => log_usage(&outcome.usage),
        TurnEnd::Interrupted => {
            debug!("Turn interrupted by user");
            terminal.interrupted();
        }
    }
    end
}

fn log_usage(usage: &TokenUsage) {
    if !usage.is_empty() {
        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cached_tokens = usage.cached_tokens,
            total_tokens = usage.total_tokens,
            "Turn usage"
        );
    }
}
