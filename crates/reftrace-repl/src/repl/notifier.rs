//! Where REPL output goes
//!
//! The session never prints directly; a [`ReplNotifier`] decides whether text
//! reaches the terminal or a buffer.

use std::sync::{Arc, Mutex};

pub trait ReplNotifier: Send + Sync {
    /// Command output
    fn on_output(&self, content: &str);

    fn on_error(&self, content: &str);

    /// Summary of a freshly traced program
    fn on_trace(&self, summary: &str, duration_ms: u64, quiet: bool);
}

/// Prints to stdout and stderr
pub struct DefaultNotifier;

impl DefaultNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl ReplNotifier for DefaultNotifier {
    fn on_output(&self, content: &str) {
        if !content.is_empty() {
            println!("{content}");
        }
    }

    fn on_error(&self, content: &str) {
        eprintln!("{content}");
    }

    fn on_trace(&self, summary: &str, duration_ms: u64, quiet: bool) {
        if quiet {
            println!("{summary}");
        } else {
            println!("{summary}\n({duration_ms}ms)");
        }
    }
}

impl Default for DefaultNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects every line, errors prefixed with `error: `
#[derive(Default)]
pub struct BufferedNotifier {
    lines: Mutex<Vec<String>>,
}

impl BufferedNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, line: String) {
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

impl ReplNotifier for BufferedNotifier {
    fn on_output(&self, content: &str) {
        self.push(content.to_string());
    }

    fn on_error(&self, content: &str) {
        self.push(format!("error: {content}"));
    }

    fn on_trace(&self, summary: &str, _duration_ms: u64, _quiet: bool) {
        self.push(summary.to_string());
    }
}

/// Lets a caller keep a handle on a notifier the REPL owns
impl<N: ReplNotifier> ReplNotifier for Arc<N> {
    fn on_output(&self, content: &str) {
        (**self).on_output(content);
    }

    fn on_error(&self, content: &str) {
        (**self).on_error(content);
    }

    fn on_trace(&self, summary: &str, duration_ms: u64, quiet: bool) {
        (**self).on_trace(summary, duration_ms, quiet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_notifier_keeps_order() {
        let notifier = BufferedNotifier::new();
        notifier.on_output("one");
        notifier.on_error("two");
        notifier.on_trace("three", 5, false);
        assert_eq!(notifier.lines(), vec!["one", "error: two", "three"]);
    }
}
