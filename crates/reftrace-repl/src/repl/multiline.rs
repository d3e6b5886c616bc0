//! Multi-line program collection for the REPL
//!
//! A program is typed line by line and ends with a `.` on a line by itself.

/// Result of processing a line of input
#[derive(Debug, PartialEq)]
pub enum LineProcessResult {
    /// Program is complete and ready to trace
    Complete(String),
    /// More input is needed
    NeedMore,
    /// Terminator with nothing collected
    Empty,
}

/// Collects the lines of one program
#[derive(Debug, Default)]
pub struct MultiLineCollector {
    buffer: Vec<String>,
}

impl MultiLineCollector {
    /// Create a new multi-line collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the appropriate prompt for the current state
    pub fn get_prompt(&self) -> &'static str {
        if self.is_collecting() {
            "... " // Continuation prompt
        } else {
            "trace> " // Main prompt
        }
    }

    /// Check if we're currently collecting a program
    pub fn is_collecting(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drop everything collected so far
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Process a line of input
    pub fn process_line(&mut self, line: &str) -> LineProcessResult {
        if line.trim() != "." {
            self.buffer.push(line.to_string());
            return LineProcessResult::NeedMore;
        }
        if self.buffer.iter().all(|l| l.trim().is_empty()) {
            self.reset();
            return LineProcessResult::Empty;
        }
        let program = self.buffer.join("\n");
        self.reset();
        LineProcessResult::Complete(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_ends_on_lone_dot() {
        let mut collector = MultiLineCollector::new();
        assert_eq!(collector.process_line("const o = {"), LineProcessResult::NeedMore);
        assert!(collector.is_collecting());
        assert_eq!(collector.get_prompt(), "... ");
        assert_eq!(collector.process_line("  a: 1,"), LineProcessResult::NeedMore);
        assert_eq!(collector.process_line("};"), LineProcessResult::NeedMore);
        assert_eq!(
            collector.process_line("  .  "),
            LineProcessResult::Complete("const o = {\n  a: 1,\n};".to_string())
        );
        assert!(!collector.is_collecting());
        assert_eq!(collector.get_prompt(), "trace> ");
    }

    #[test]
    fn test_member_access_lines_are_code() {
        let mut collector = MultiLineCollector::new();
        collector.process_line("list");
        assert_eq!(collector.process_line(".length"), LineProcessResult::NeedMore);
        assert_eq!(
            collector.process_line("."),
            LineProcessResult::Complete("list\n.length".to_string())
        );
    }

    #[test]
    fn test_empty_program() {
        let mut collector = MultiLineCollector::new();
        assert_eq!(collector.process_line("."), LineProcessResult::Empty);
        collector.process_line("   ");
        assert_eq!(collector.process_line("."), LineProcessResult::Empty);
        assert!(!collector.is_collecting());
    }
}
