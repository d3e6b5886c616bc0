//! Sandboxed execution of one script program
//!
//! Every run gets a fresh interpreter on a dedicated thread. The thread has a
//! large stack because instrumented sources nest several times deeper than
//! the programs they were generated from.

use std::thread;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ast::Program;
use crate::evaluator::{EvalOptions, HookHost, Interpreter, RuntimeError, Value};
use crate::parser::{ParseError, Parser, ScriptParser};
use crate::{InstrumentError, ReftraceError};

/// Nesting limit for parsing generated sources
pub const INSTRUMENTED_MAX_DEPTH: usize = 2048;

/// Stack reserved for the evaluation thread
pub const SANDBOX_STACK_SIZE: usize = 256 * 1024 * 1024;

/// An exception that escaped the traced program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptError {
    pub name: String,
    pub message: String,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Uncaught {}: {}", self.name, self.message)
    }
}

/// How a sandboxed run ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Completion value, rendered for display
    Completed(String),
    Threw(ScriptError),
    TimedOut { elapsed_ms: u64 },
}

/// Everything a run hands back across the thread boundary
#[derive(Debug)]
pub struct SandboxRun<H> {
    pub host: H,
    pub console: Vec<String>,
    pub outcome: Outcome,
}

/// Which shape of program the sandbox is asked to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// `(function (__tr) { ... })`, called with the hooks object
    Instrumented,
    /// An ordinary top-level program
    Plain,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    options: EvalOptions,
    stack_size: usize,
}

impl Sandbox {
    pub fn new(options: EvalOptions) -> Self {
        Self {
            options,
            stack_size: SANDBOX_STACK_SIZE,
        }
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Run instrumented source, injecting the hooks object backed by `host`
    pub fn run_instrumented<H>(&self, source: &str, host: H) -> Result<SandboxRun<H>, ReftraceError>
    where
        H: HookHost + Send + 'static,
    {
        self.spawn(source, host, Entry::Instrumented)
    }

    /// Run a user program as written
    pub fn run_plain<H>(&self, source: &str, host: H) -> Result<SandboxRun<H>, ReftraceError>
    where
        H: HookHost + Send + 'static,
    {
        self.spawn(source, host, Entry::Plain)
    }

    fn spawn<H>(&self, source: &str, host: H, entry: Entry) -> Result<SandboxRun<H>, ReftraceError>
    where
        H: HookHost + Send + 'static,
    {
        let source = source.to_string();
        let options = self.options.clone();
        let handle = thread::Builder::new()
            .name("reftrace-sandbox".to_string())
            .stack_size(self.stack_size)
            .spawn(move || execute(&source, host, options, entry))
            .map_err(|e| ReftraceError::Sandbox(format!("failed to start sandbox thread: {e}")))?;
        handle
            .join()
            .map_err(|_| ReftraceError::Sandbox("sandbox thread panicked".to_string()))?
    }
}

fn parse(source: &str, entry: Entry) -> Result<Program, ParseError> {
    match entry {
        Entry::Instrumented => ScriptParser::with_max_depth(INSTRUMENTED_MAX_DEPTH).parse_program(source),
        Entry::Plain => ScriptParser::new().parse_program(source),
    }
}

fn execute<H: HookHost>(
    source: &str,
    host: H,
    options: EvalOptions,
    entry: Entry,
) -> Result<SandboxRun<H>, ReftraceError> {
    let program = parse(source, entry).map_err(|err| {
        if entry == Entry::Instrumented {
            warn!(error = %err, "instrumented source failed to parse");
        }
        ReftraceError::Instrument(InstrumentError::from(err))
    })?;

    let mut interpreter = Interpreter::new(host, options);
    let result = match entry {
        Entry::Plain => interpreter.run_program(&program),
        Entry::Instrumented => interpreter.run_program(&program).and_then(|entry_fn| {
            let hooks = interpreter.create_hooks_object();
            interpreter.call_value(&entry_fn, Value::Undefined, vec![hooks])
        }),
    };

    let outcome = match result {
        Ok(value) => Outcome::Completed(interpreter.inspect(&value)),
        Err(RuntimeError::Thrown(value)) => {
            let (name, message) = interpreter.error_summary(&value);
            debug!(%name, %message, "program threw");
            Outcome::Threw(ScriptError { name, message })
        }
        Err(RuntimeError::Timeout { elapsed_ms }) => Outcome::TimedOut { elapsed_ms },
        Err(RuntimeError::Internal(message)) => return Err(ReftraceError::Internal(message)),
    };
    let (host, console) = interpreter.into_parts();
    Ok(SandboxRun { host, console, outcome })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::NoHooks;

    fn sandbox() -> Sandbox {
        Sandbox::new(EvalOptions::default())
    }

    #[test]
    fn test_ordinary_stack_is_enough_for_small_programs() {
        let run = sandbox()
            .with_stack_size(8 * 1024 * 1024)
            .run_plain("const o = { n: 1 };\no.n + 1", NoHooks)
            .unwrap();
        assert_eq!(run.outcome, Outcome::Completed("2".to_string()));
    }

    #[test]
    fn test_plain_run_completes() {
        let run = sandbox().run_plain("let a = [1, 2];\na.length + 40", NoHooks).unwrap();
        assert_eq!(run.outcome, Outcome::Completed("42".to_string()));
    }

    #[test]
    fn test_instrumented_entry_is_called_with_hooks() {
        let source = "(function (__tr) { return __tr.step(\"L1:1\", 7); })";
        let run = sandbox().run_instrumented(source, NoHooks).unwrap();
        assert_eq!(run.outcome, Outcome::Completed("7".to_string()));
    }

    #[test]
    fn test_thrown_errors_are_summarized() {
        let run = sandbox().run_plain("null.x", NoHooks).unwrap();
        match run.outcome {
            Outcome::Threw(err) => {
                assert_eq!(err.name, "TypeError");
                assert_eq!(err.message, "Cannot read properties of null (reading 'x')");
            }
            other => panic!("expected a throw, got {other:?}"),
        }
        let run = sandbox().run_plain("throw 5", NoHooks).unwrap();
        assert_eq!(
            run.outcome,
            Outcome::Threw(ScriptError {
                name: "Uncaught".to_string(),
                message: "5".to_string()
            })
        );
    }

    #[test]
    fn test_timeout_is_reported() {
        let options = EvalOptions {
            timeout: Some(std::time::Duration::from_millis(50)),
            ..EvalOptions::default()
        };
        let run = Sandbox::new(options).run_plain("while (true) {}", NoHooks).unwrap();
        assert!(matches!(run.outcome, Outcome::TimedOut { .. }), "{:?}", run.outcome);
    }

    #[test]
    fn test_parse_failure_is_an_instrument_error() {
        let err = sandbox().run_plain("let = ;", NoHooks).unwrap_err();
        assert!(matches!(err, ReftraceError::Instrument(_)));
    }

    #[test]
    fn test_console_is_captured() {
        let run = sandbox().run_plain("console.log('a', 1); console.log({ b: 2 });", NoHooks).unwrap();
        assert_eq!(run.console, vec!["a 1".to_string(), "{ b: 2 }".to_string()]);
    }
}
