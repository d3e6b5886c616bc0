// Evaluator error types and control flow
use thiserror::Error;

use super::value::Value;

/// Errors that abort evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A script-level exception; catchable by `try`
    #[error("uncaught exception: {0:?}")]
    Thrown(Value),

    /// Wall-clock deadline exceeded; never catchable
    #[error("execution timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("internal evaluator error: {0}")]
    Internal(String),
}

impl RuntimeError {
    pub fn internal(msg: impl Into<String>) -> Self {
        RuntimeError::Internal(msg.into())
    }

    pub fn is_catchable(&self) -> bool {
        matches!(self, RuntimeError::Thrown(_))
    }
}

pub type EvalResult<T> = Result<T, RuntimeError>;

/// Completion of a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Builtin error constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
        }
    }
}
