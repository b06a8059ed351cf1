//! Interactive shell.
//!
//! Reads lines with rustyline, handles the built-in commands and hands
//! everything else to the [`ChatSession`] as a query.

use std::fmt::Write as _;
use std::path::PathBuf;

use mcx_mcp_client::{McpManager, ToolOutcome, ToolRegistry};

use crate::session::{ChatSession, TurnReport};

pub const HELP: &str = "\
Commands:
  servers       List connected and unreachable servers
  tools         List every tool and the server that owns it
  help          Show this help
  quit, exit    Leave the shell (Ctrl+D works too)
Anything else is sent to the model as a query.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Command parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Servers,
    Tools,
    Help,
    Quit,
    Query(String),
    Empty,
}

impl ShellCommand {
    /// Commands match case-insensitively; anything else is a query.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Self::Empty,
            "servers" => Self::Servers,
            "tools" => Self::Tools,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Query(trimmed.to_string()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn render_servers(manager: &McpManager) -> String {
    let mut out = String::new();

    if manager.is_empty() {
        out.push_str("No connected servers.\n");
    } else {
        let _ = writeln!(out, "Connected servers ({}):", manager.server_count());
        for conn in manager.connections() {
            let _ = writeln!(
                out,
                "  - {}: {} ({} tools)",
                conn.name(),
                conn.description(),
                conn.tools().len()
            );
        }
    }

    if !manager.unreachable().is_empty() {
        let _ = writeln!(out, "Unreachable servers ({}):", manager.unreachable().len());
        for down in manager.unreachable() {
            let _ = writeln!(
                out,
                "  - {}: {} (failed after {} attempts: {})",
                down.name, down.description, down.attempts, down.last_error
            );
        }
    }

    out
}

pub fn render_tools(registry: &ToolRegistry) -> String {
    if registry.is_empty() {
        return "No tools available.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Available tools ({}):", registry.len());
    for (tool, server) in registry.listing() {
        let _ = writeln!(out, "  - {tool} -> {server}");
    }

    if !registry.conflicts().is_empty() {
        out.push_str("Conflicts:\n");
        for c in registry.conflicts() {
            let _ = writeln!(out, "  - {}: using {}, ignored {}", c.tool, c.kept, c.rejected);
        }
    }
    out
}

fn render_call(outcome: &ToolOutcome) -> String {
    let server = outcome.server.as_deref().unwrap_or("unknown server");
    let mut line = format!("[called {} on {} with {}]", outcome.tool_name, server, outcome.arguments);
    if outcome.is_error {
        let _ = write!(line, "\n  {}", outcome.content);
    }
    line
}

/// The text printed after a query: one line per call, then the answer.
pub fn render_report(report: &TurnReport) -> String {
    let mut lines: Vec<String> = report.tool_calls.iter().map(render_call).collect();
    if !report.answer.is_empty() {
        lines.push(report.answer.clone());
    }
    if report.limit_reached {
        lines.push(format!(
            "[stopped after {} tool rounds without a final answer]",
            report.rounds
        ));
    }
    lines.join("\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Read loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn history_path() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".mcx").join("history.txt")
}

/// Run the shell until `quit`, `exit` or end of input.
pub async fn run(session: &mut ChatSession) -> anyhow::Result<()> {
    let history_path = history_path();
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("Type a query, or 'help' for commands.");

    loop {
        match rl.readline("\nquery> ") {
            Ok(line) => {
                let command = ShellCommand::parse(&line);
                if command != ShellCommand::Empty {
                    rl.add_history_entry(line.trim()).ok();
                }

                match command {
                    ShellCommand::Empty => continue,
                    ShellCommand::Quit => break,
                    ShellCommand::Help => println!("{HELP}"),
                    ShellCommand::Servers => print!("{}", render_servers(session.manager())),
                    ShellCommand::Tools => print!("{}", render_tools(session.manager().registry())),
                    ShellCommand::Query(query) => match session.ask(&query).await {
                        Ok(report) => println!("\n{}", render_report(&report)),
                        Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                    },
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or 'quit' to exit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    Ok(())
}
