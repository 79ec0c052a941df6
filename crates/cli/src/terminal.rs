//! Terminal renderer: streamed answer on stdout, everything else on stderr.

use std::io::{self, Stderr, Stdout, Write};

use ancient_agent::Renderer;

/// Longest tool output line echoed to the terminal.
const TOOL_PREVIEW_CHARS: usize = 120;

pub struct TerminalRenderer<O: Write, E: Write> {
    out: O,
    err: E,
    banner: String,
}

impl TerminalRenderer<Stdout, Stderr> {
    pub fn stdio(model: &str, provider: &str) -> Self {
        Self::new(io::stdout(), io::stderr(), model, provider)
    }
}

impl<O: Write, E: Write> TerminalRenderer<O, E> {
    pub fn new(out: O, err: E, model: &str, provider: &str) -> Self {
        let banner = format!(
            "\n  Ancient: terminal coding agent\n\n  Provider:  {provider}\n  Model:     {model}\n\n  Type your message and press Enter. 'exit' or Ctrl+C to quit.\n"
        );
        Self { out, err, banner }
    }

    /// Print the interactive input prompt.
    pub fn prompt(&mut self) {
        let _ = write!(self.out, "\n> ");
        let _ = self.out.flush();
    }

    /// Finish the current line after a run was interrupted mid-answer.
    pub fn interrupted(&mut self) {
        let _ = writeln!(self.out);
        let _ = writeln!(self.err, "  [interrupted]");
    }

    pub fn goodbye(&mut self) {
        let _ = writeln!(self.out, "\n  Goodbye!");
    }

    #[cfg(test)]
    fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}

impl<O: Write, E: Write> Renderer for TerminalRenderer<O, E> {
    fn show_banner(&mut self) {
        let _ = writeln!(self.out, "{}", self.banner);
    }

    fn begin_assistant_turn(&mut self) {}

    fn append_text(&mut self, delta: &str) {
        let _ = self.out.write_all(delta.as_bytes());
        let _ = self.out.flush();
    }

    fn end_assistant_turn(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }

    fn report_error(&mut self, message: &str) {
        let _ = writeln!(self.err, "  [error] {message}");
    }

    fn tool_call_started(&mut self, name: &str, arguments: &serde_json::Value) {
        let _ = writeln!(self.err, "  > {name} {}", preview(&arguments.to_string()));
    }

    fn tool_call_finished(&mut self, name: &str, success: bool, output: &str) {
        let mark = if success { "ok" } else { "failed" };
        let _ = writeln!(self.err, "  < {name} {mark}: {}", preview(output));
    }
}

/// First line of `text`, cut to a readable length.
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > TOOL_PREVIEW_CHARS {
        let cut: String = line.chars().take(TOOL_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
