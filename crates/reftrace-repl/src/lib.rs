//! reftrace REPL - Interactive step-through viewer for heap traces
//!
//! This crate provides the REPL functionality on top of `reftrace-core`,
//! including command parsing, multi-line program entry, and trace navigation.

pub mod repl;

// Re-export commonly used types for convenience
pub use repl::{BufferedNotifier, DefaultNotifier, Repl, ReplCommand, ReplNotifier};
