//! # reftrace core
//!
//! Heap-reference tracing for a synchronous JavaScript subset:
//! - Script front end (lexer, parser, AST, source generation)
//! - Source instrumentation that reports heap and binding effects
//! - Runtime tracing hooks and the checkpoint recorder
//! - Replay of the recorded trace to any step
//! - An embedded interpreter hosting traced programs
//!
//! Consumers such as the REPL only need [`TraceRuntime`] and [`get_state_at`].

#![warn(clippy::all)]

use std::time::Duration;

pub mod ast;
pub mod evaluator;
pub mod hooks;
pub mod instrument;
pub mod parser;
pub mod runtime;
pub mod sandbox;
pub mod trace;

// Re-export commonly used types
pub use instrument::{InstrumentError, Instrumenter};
pub use parser::{create_parser, ParseError, Parser};
pub use runtime::{PlainRun, TraceRun, TraceRuntime};
pub use sandbox::{Sandbox, ScriptError};
pub use trace::{
    get_state_at, CheckpointId, CheckpointRecorder, DeltaEvent, HeapObject, HeapState, ObjId,
    ObjKind, Primitive, ReplayCursor, StepId, StepMeta, TraceLog, ValueRef,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parameter name of the generated entry function; user code may not bind it
pub const HOOKS_NAME: &str = "__tr";

/// Prefix of every identifier the instrumenter generates
pub const INTERNAL_PREFIX: &str = "__tr";

/// Default log directive when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "reftrace_core=info";

/// Initialize tracing for reftrace components
pub fn init_tracing() {
    init_tracing_with_default(DEFAULT_LOG_DIRECTIVE);
}

/// Initialize tracing, falling back to `directive` when `RUST_LOG` is unset
pub fn init_tracing_with_default(directive: &str) {
    let rust_log = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(rust_log.as_deref(), directive);
    // A subscriber installed by the embedding application wins
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn log_filter(rust_log: Option<&str>, directive: &str) -> tracing_subscriber::EnvFilter {
    match rust_log {
        Some(env) => tracing_subscriber::EnvFilter::new(env),
        None => tracing_subscriber::EnvFilter::new(directive),
    }
}

/// Trace runtime configuration
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// A full snapshot is taken every this many steps
    pub snapshot_interval: u64,
    /// Wall-clock budget for one run
    pub timeout: Duration,
    /// Maximum script call depth before a RangeError
    pub max_call_depth: usize,
    /// Capture `console.log` output instead of discarding it
    pub capture_console: bool,
    /// Stack reserved for each run's evaluation thread
    pub stack_size: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: 50,
            timeout: Duration::from_secs(2),
            max_call_depth: 512,
            capture_console: true,
            stack_size: sandbox::SANDBOX_STACK_SIZE,
        }
    }
}

impl TraceConfig {
    pub fn eval_options(&self) -> evaluator::EvalOptions {
        evaluator::EvalOptions {
            timeout: Some(self.timeout),
            max_call_depth: self.max_call_depth,
            capture_console: self.capture_console,
        }
    }
}

/// Error types for reftrace operations
#[derive(thiserror::Error, Debug)]
pub enum ReftraceError {
    /// Source could not be parsed or instrumented; nothing was executed
    #[error("Instrumentation error: {0}")]
    Instrument(#[from] InstrumentError),

    /// The run exceeded its time budget; the trace was discarded
    #[error("Execution timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// The sandbox thread could not be started or died
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Evaluator invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for reftrace operations
pub type Result<T> = std::result::Result<T, ReftraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_overrides_default_directive() {
        let filter = log_filter(Some("reftrace_core=debug"), DEFAULT_LOG_DIRECTIVE).to_string();
        assert!(filter.contains("reftrace_core=debug"), "{filter}");
        assert!(!filter.contains("info"), "{filter}");

        let filter = log_filter(None, DEFAULT_LOG_DIRECTIVE).to_string();
        assert!(filter.contains(DEFAULT_LOG_DIRECTIVE), "{filter}");
    }
}
