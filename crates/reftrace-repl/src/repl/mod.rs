//! REPL (Read-Eval-Print Loop) functionality for reftrace
//!
//! This module wraps the core trace runtime with an interactive step-through
//! viewer:
//! - Command history and editing
//! - Multi-line program entry
//! - Trace navigation commands (.step, .next, .prev, ...)
//! - Heap views (.roots, .objects, .events, .json)
//! - Output formatting and notifications

use std::{fs, path::PathBuf, time::Instant};

use anyhow::{anyhow, Context, Result};
use reftrace_core::{get_state_at, HeapState, StepId, TraceConfig, TraceRun, TraceRuntime};
use tracing::debug;

pub mod commands;
pub mod multiline;
pub mod notifier;
pub mod render;

pub use commands::ReplCommand;
pub use multiline::{LineProcessResult, MultiLineCollector};
pub use notifier::{BufferedNotifier, DefaultNotifier, ReplNotifier};

/// A traced program and the step being viewed
pub struct Session {
    pub source: String,
    pub origin: Option<PathBuf>,
    pub run: TraceRun,
    pub step: StepId,
}

impl Session {
    fn last_step(&self) -> StepId {
        self.run.trace.last_step().unwrap_or(0)
    }

    fn state(&self) -> HeapState {
        get_state_at(&self.run.trace, self.step)
    }
}

/// Interactive trace viewer
pub struct Repl {
    /// Core trace runtime
    runtime: TraceRuntime,
    /// Current notifier for output
    notifier: Box<dyn ReplNotifier>,
    /// Most recently traced program
    session: Option<Session>,
    /// Whether the REPL is running
    running: bool,
    /// Quiet mode (suppress timing info)
    quiet: bool,
    /// Debug mode (show step events while navigating)
    debug: bool,
    traces: u64,
}

impl Repl {
    /// Create a new REPL with the given runtime
    pub fn new(runtime: TraceRuntime) -> Result<Self> {
        Ok(Self {
            runtime,
            notifier: Box::new(DefaultNotifier::new()),
            session: None,
            running: true,
            quiet: false,
            debug: false,
            traces: 0,
        })
    }

    /// Create a new REPL with a specific configuration
    pub fn with_config(config: TraceConfig) -> Result<Self> {
        Self::new(TraceRuntime::new(config))
    }

    /// Set the notifier for this REPL
    pub fn set_notifier(&mut self, notifier: Box<dyn ReplNotifier>) {
        self.notifier = notifier;
    }

    /// Get a reference to the current notifier
    pub fn notifier(&self) -> &dyn ReplNotifier {
        self.notifier.as_ref()
    }

    /// Check if the REPL is still running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Set quiet mode
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Set debug mode
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Step currently being viewed
    pub fn current_step(&self) -> Option<StepId> {
        self.session.as_ref().map(|s| s.step)
    }

    /// Heap state at the current step
    pub fn current_state(&self) -> Result<HeapState> {
        Ok(self.require_session()?.state())
    }

    /// Parse REPL input into a command
    pub fn parse_input(&self, input: &str) -> Result<ReplCommand> {
        commands::parse_command(input)
    }

    /// Handle a REPL command
    pub fn handle_command(&mut self, command: ReplCommand) -> Result<String> {
        if command.needs_trace() {
            self.require_session()?;
        }
        match command {
            ReplCommand::Help => Ok(self.get_help_text()),
            ReplCommand::Quit => {
                self.running = false;
                Ok("Goodbye!".to_string())
            }
            ReplCommand::Quiet => {
                self.quiet = !self.quiet;
                Ok(format!(
                    "Quiet mode: {}",
                    if self.quiet { "on" } else { "off" }
                ))
            }
            ReplCommand::Debug => {
                self.debug = !self.debug;
                Ok(format!(
                    "Debug mode: {}",
                    if self.debug { "on" } else { "off" }
                ))
            }
            ReplCommand::Step(step) => self.goto(step),
            ReplCommand::Next => {
                let session = self.require_session()?;
                if session.step >= session.last_step() {
                    return Err(anyhow!("Already at the last step"));
                }
                let next = session.step + 1;
                self.goto(next)
            }
            ReplCommand::Prev => {
                let step = self.require_session()?.step;
                if step == 0 {
                    return Err(anyhow!("Already at the first step"));
                }
                self.goto(step - 1)
            }
            ReplCommand::First => self.goto(0),
            ReplCommand::Last => {
                let last = self.require_session()?.last_step();
                self.goto(last)
            }
            ReplCommand::Roots => Ok(render::roots(&self.current_state()?)),
            ReplCommand::Objects => Ok(render::objects(&self.current_state()?)),
            ReplCommand::Events => {
                let session = self.require_session()?;
                Ok(render::events(session.run.trace.events_of(session.step)))
            }
            ReplCommand::Calls => {
                let session = self.require_session()?;
                Ok(render::calls(session.run.trace.calls_at(session.step)))
            }
            ReplCommand::Json => {
                let state = self.current_state()?;
                Ok(serde_json::to_string_pretty(&state)?)
            }
            ReplCommand::Source => {
                let session = self.require_session()?;
                let line = session
                    .run
                    .trace
                    .step(session.step)
                    .and_then(|meta| meta.checkpoint_id.as_deref())
                    .and_then(render::checkpoint_line);
                Ok(render::listing(&session.source, line))
            }
            ReplCommand::Instrumented => Ok(self.require_session()?.run.instrumented.clone()),
            ReplCommand::Stats => self.show_stats(),
            ReplCommand::Load(path) => {
                let (output, duration) = self.load_file(&path)?;
                if self.quiet {
                    Ok(output)
                } else {
                    Ok(format!("{output}\n({duration}ms)"))
                }
            }
        }
    }

    /// Run one dot-command line and report the result through the notifier
    pub fn dispatch(&mut self, input: &str) {
        let result = self
            .parse_input(input)
            .and_then(|command| self.handle_command(command));
        match result {
            Ok(output) => self.notifier.on_output(&output),
            Err(e) => self.notifier.on_error(&format!("Error: {e:#}")),
        }
    }

    /// Trace a typed program and report its summary through the notifier
    pub fn submit(&mut self, code: &str) {
        match self.trace_program(code) {
            Ok((summary, duration)) => self.notifier.on_trace(&summary, duration, self.quiet),
            Err(e) => self.notifier.on_error(&format!("Error: {e:#}")),
        }
    }

    /// Trace a program and make it the current session
    pub fn trace_program(&mut self, code: &str) -> Result<(String, u64)> {
        self.trace_with_origin(code, None)
    }

    /// Read and trace a script file
    pub fn load_file(&mut self, path: &str) -> Result<(String, u64)> {
        let source =
            fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
        self.trace_with_origin(&source, Some(PathBuf::from(path)))
    }

    fn trace_with_origin(&mut self, code: &str, origin: Option<PathBuf>) -> Result<(String, u64)> {
        let start = Instant::now();
        let run = self.runtime.trace_source(code)?;
        let duration = start.elapsed().as_millis() as u64;
        let output = render::summary(&run);
        debug!(run_id = %run.run_id, steps = run.trace.steps.len(), "session loaded");
        self.traces += 1;
        self.session = Some(Session {
            source: code.to_string(),
            origin,
            run,
            step: 0,
        });
        Ok((output, duration))
    }

    fn require_session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("No trace loaded. Use .load <file> or type a program ending with '.'"))
    }

    fn goto(&mut self, step: StepId) -> Result<String> {
        let debug = self.debug;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("No trace loaded"))?;
        let last = session.last_step();
        if step > last {
            return Err(anyhow!("Step {step} out of range (0..={last})"));
        }
        session.step = step;

        let mut output = match session.run.trace.step(step) {
            Some(meta) => render::step_header(meta, last),
            None => format!("Step {step}/{last}"),
        };
        output.push('\n');
        output.push_str(&render::roots(&session.state()));
        if debug {
            output.push_str("\nEvents:\n");
            output.push_str(&render::events(session.run.trace.events_of(step)));
        }
        Ok(output)
    }

    /// Get help text
    fn get_help_text(&self) -> String {
        r#"reftrace REPL Commands:
  .help           - Show this help message
  .quit           - Exit the REPL
  .quiet          - Toggle quiet mode (hide timing info)
  .debug          - Toggle debug mode (show events while stepping)
  .load <file>    - Trace a script file

Navigation:
  .step <n>       - Jump to step n
  .next / .prev   - Move one step forward or back
  .first / .last  - Jump to the first or last step

Views at the current step:
  .roots          - Named bindings and their values
  .objects        - Every tracked object and its fields
  .events         - Delta events recorded during the step
  .calls          - Function enter/exit events of the step
  .json           - Heap state as JSON
  .source         - Program with the current line marked
  .instrumented   - Program as executed
  .stats          - Trace statistics

Type a program line by line and end it with '.' on a line by itself."#
            .to_string()
    }

    /// Show trace statistics
    fn show_stats(&self) -> Result<String> {
        let session = self.require_session()?;
        let trace = &session.run.trace;
        let config = self.runtime.config();
        let origin = session
            .origin
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<input>".to_string());
        let outcome = match &session.run.error {
            Some(error) => error.to_string(),
            None => "completed".to_string(),
        };
        let stats = format!(
            "Trace Statistics:\n  Program: {origin}\n  Run: {}\n  Outcome: {outcome}\n  Steps: {}\n  Events: {}\n  Snapshots: {} (every {} steps)\n  Call events: {}\n  Skipped events: {}\n  Console lines: {}\n  Traces this session: {}",
            session.run.run_id,
            trace.steps.len(),
            trace.events.len(),
            trace.snapshots.len(),
            config.snapshot_interval,
            trace.call_events.len(),
            trace.skipped,
            session.run.console.len(),
            self.traces
        );
        Ok(stats)
    }

    /// Show exit statistics
    pub fn show_exit_stats(&self) {
        if !self.quiet {
            println!("\nSession complete. {} program(s) traced.", self.traces);
        }
    }
}
