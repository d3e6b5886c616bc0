//! reftrace runtime - high-level interface for tracing a program
//!
//! Wraps the instrumenter, sandbox and recorder for use by consumers like
//! the REPL.

use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    evaluator::NoHooks,
    hooks::TracingHooks,
    instrument::Instrumenter,
    sandbox::{Outcome, Sandbox, ScriptError},
    trace::{CheckpointRecorder, TraceLog},
    ReftraceError, Result, TraceConfig,
};

/// Result of tracing one program
#[derive(Debug, Clone)]
pub struct TraceRun {
    pub run_id: Uuid,
    /// Complete trace, or the partial trace up to an uncaught exception
    pub trace: TraceLog,
    pub error: Option<ScriptError>,
    pub console: Vec<String>,
    /// Rendered completion value; `None` when the program threw
    pub completion: Option<String>,
    /// The source that was actually executed
    pub instrumented: String,
}

/// Result of running a program without instrumentation
#[derive(Debug, Clone, PartialEq)]
pub struct PlainRun {
    pub error: Option<ScriptError>,
    pub console: Vec<String>,
    pub completion: Option<String>,
}

/// High-level runtime that combines instrumenter, sandbox and recorder
pub struct TraceRuntime {
    config: TraceConfig,
    instrumenter: Instrumenter,
    sandbox: Sandbox,
}

impl Default for TraceRuntime {
    fn default() -> Self {
        Self::new(TraceConfig::default())
    }
}

impl TraceRuntime {
    pub fn new(config: TraceConfig) -> Self {
        let sandbox = Sandbox::new(config.eval_options()).with_stack_size(config.stack_size);
        Self {
            config,
            instrumenter: Instrumenter::new(),
            sandbox,
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Instrument without running
    pub fn instrument(&self, source: &str) -> Result<String> {
        Ok(self.instrumenter.instrument(source)?)
    }

    /// Instrument, execute and record `source`
    pub fn trace_source(&self, source: &str) -> Result<TraceRun> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let instrumented = self.instrument(source)?;

        let hooks = TracingHooks::new(CheckpointRecorder::new(self.config.snapshot_interval));
        let run = self.sandbox.run_instrumented(&instrumented, hooks)?;
        let (completion, error) = match run.outcome {
            Outcome::Completed(value) => (Some(value), None),
            Outcome::Threw(err) => (None, Some(err)),
            Outcome::TimedOut { elapsed_ms } => {
                warn!(%run_id, elapsed_ms, "trace discarded after timeout");
                return Err(ReftraceError::Timeout { elapsed_ms });
            }
        };
        let trace = run.host.finish();

        info!(
            %run_id,
            steps = trace.steps.len(),
            events = trace.events.len(),
            snapshots = trace.snapshots.len(),
            skipped = trace.skipped,
            threw = error.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "trace recorded"
        );
        if trace.skipped > 0 {
            warn!(%run_id, skipped = trace.skipped, "inconsistent events were skipped");
        }

        Ok(TraceRun {
            run_id,
            trace,
            error,
            console: run.console,
            completion,
            instrumented,
        })
    }

    /// Run `source` as written, with no hooks at all
    pub fn run_plain(&self, source: &str) -> Result<PlainRun> {
        let run = self.sandbox.run_plain(source, NoHooks)?;
        let (completion, error) = match run.outcome {
            Outcome::Completed(value) => (Some(value), None),
            Outcome::Threw(err) => (None, Some(err)),
            Outcome::TimedOut { elapsed_ms } => return Err(ReftraceError::Timeout { elapsed_ms }),
        };
        Ok(PlainRun {
            error,
            console: run.console,
            completion,
        })
    }
}
