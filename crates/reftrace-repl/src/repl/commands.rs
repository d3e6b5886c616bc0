//! REPL command parsing and definitions
//!
//! Handles parsing of dot-commands (.help, .quit, etc.) and trace navigation
//! commands.

use anyhow::{anyhow, Result};
use reftrace_core::StepId;

/// Available REPL commands
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Show help information
    Help,
    /// Exit the REPL
    Quit,
    /// Toggle quiet mode
    Quiet,
    /// Toggle debug mode
    Debug,
    /// Jump to a step
    Step(StepId),
    Next,
    Prev,
    First,
    Last,
    /// Roots at the current step
    Roots,
    /// Every tracked object at the current step
    Objects,
    /// Delta events recorded during the current step
    Events,
    /// Call events tagged with the current step
    Calls,
    /// Current heap state as JSON
    Json,
    /// Original program with the current line marked
    Source,
    /// Program after instrumentation
    Instrumented,
    /// Show trace statistics
    Stats,
    /// Trace a script file
    Load(String),
}

impl ReplCommand {
    /// Whether the command reads the loaded trace
    pub fn needs_trace(&self) -> bool {
        !matches!(
            self,
            ReplCommand::Help
                | ReplCommand::Quit
                | ReplCommand::Quiet
                | ReplCommand::Debug
                | ReplCommand::Load(_)
        )
    }
}

/// Parse a command string into a ReplCommand
pub fn parse_command(input: &str) -> Result<ReplCommand> {
    let trimmed = input.trim();

    let Some(body) = trimmed.strip_prefix('.') else {
        return Err(anyhow!("Commands must start with '.'"));
    };

    let parts: Vec<&str> = body.split_whitespace().collect();

    if parts.is_empty() {
        return Err(anyhow!("Empty command"));
    }

    let no_args = |command: ReplCommand| {
        if parts.len() == 1 {
            Ok(command)
        } else {
            Err(anyhow!(".{} takes no arguments", parts[0]))
        }
    };

    match parts[0] {
        "help" | "h" => no_args(ReplCommand::Help),
        "quit" | "q" | "exit" => no_args(ReplCommand::Quit),
        "quiet" => no_args(ReplCommand::Quiet),
        "debug" => no_args(ReplCommand::Debug),
        "step" | "s" => {
            if parts.len() != 2 {
                return Err(anyhow!("Usage: .step <n>"));
            }
            let step = parts[1]
                .parse::<StepId>()
                .map_err(|_| anyhow!("Not a step number: {}", parts[1]))?;
            Ok(ReplCommand::Step(step))
        }
        "next" | "n" => no_args(ReplCommand::Next),
        "prev" | "p" => no_args(ReplCommand::Prev),
        "first" => no_args(ReplCommand::First),
        "last" => no_args(ReplCommand::Last),
        "roots" | "r" => no_args(ReplCommand::Roots),
        "objects" | "o" => no_args(ReplCommand::Objects),
        "events" | "e" => no_args(ReplCommand::Events),
        "calls" => no_args(ReplCommand::Calls),
        "json" => no_args(ReplCommand::Json),
        "source" => no_args(ReplCommand::Source),
        "instrumented" => no_args(ReplCommand::Instrumented),
        "stats" | "statistics" => no_args(ReplCommand::Stats),
        "load" => {
            if parts.len() != 2 {
                return Err(anyhow!("Usage: .load <file>"));
            }
            Ok(ReplCommand::Load(parts[1].to_string()))
        }
        _ => Err(anyhow!("Unknown command: .{}", parts[0])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_help() {
        assert_eq!(parse_command(".help").unwrap(), ReplCommand::Help);
        assert_eq!(parse_command(".h").unwrap(), ReplCommand::Help);
    }

    #[test]
    fn test_parse_quit() {
        assert_eq!(parse_command(".quit").unwrap(), ReplCommand::Quit);
        assert_eq!(parse_command(".q").unwrap(), ReplCommand::Quit);
        assert_eq!(parse_command(".exit").unwrap(), ReplCommand::Quit);
    }

    #[test]
    fn test_parse_step() {
        assert_eq!(parse_command(".step 12").unwrap(), ReplCommand::Step(12));
        assert_eq!(parse_command("  .s 0 ").unwrap(), ReplCommand::Step(0));
        assert!(parse_command(".step").is_err());
        assert!(parse_command(".step -1").is_err());
        assert!(parse_command(".step two").is_err());
    }

    #[test]
    fn test_parse_navigation_and_views() {
        assert_eq!(parse_command(".n").unwrap(), ReplCommand::Next);
        assert_eq!(parse_command(".prev").unwrap(), ReplCommand::Prev);
        assert_eq!(parse_command(".objects").unwrap(), ReplCommand::Objects);
        assert_eq!(parse_command(".instrumented").unwrap(), ReplCommand::Instrumented);
        assert!(parse_command(".roots now").is_err());
    }

    #[test]
    fn test_parse_load() {
        match parse_command(".load demo.js").unwrap() {
            ReplCommand::Load(path) => assert_eq!(path, "demo.js"),
            other => panic!("Expected Load command, got {other:?}"),
        }
        assert!(!ReplCommand::Load(String::new()).needs_trace());
        assert!(ReplCommand::Roots.needs_trace());
    }

    #[test]
    fn test_parse_invalid_command() {
        assert!(parse_command(".invalid").is_err());
        assert!(parse_command("help").is_err()); // Missing dot
        assert!(parse_command(".load").is_err()); // Missing argument
        assert!(parse_command(".").is_err());
    }
}
