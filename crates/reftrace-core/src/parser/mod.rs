// Parser module - front end for the script language
use thiserror::Error;

use crate::ast::{Pos, Program};

pub mod lexer;
pub mod script;

#[cfg(test)]
mod tests;

pub use lexer::{LexError, Token, TokenKind};
pub use script::ScriptParser;

/// Nesting limit for untrusted user source
pub const DEFAULT_MAX_DEPTH: usize = 96;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),

    #[error("syntax error at {pos}: {message}")]
    Syntax { message: String, pos: Pos },

    #[error("unsupported syntax at {pos}: {message}")]
    Unsupported { message: String, pos: Pos },
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, pos: Pos) -> Self {
        ParseError::Syntax {
            message: message.into(),
            pos,
        }
    }

    pub fn unsupported(message: impl Into<String>, pos: Pos) -> Self {
        ParseError::Unsupported {
            message: message.into(),
            pos,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            ParseError::Lex(err) => err.pos,
            ParseError::Syntax { pos, .. } | ParseError::Unsupported { pos, .. } => *pos,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ParseError::Unsupported { .. })
    }
}

/// Trait for script parsers
pub trait Parser: Send + Sync {
    /// Parse source code as a complete top-level program
    fn parse_program(&mut self, source: &str) -> Result<Program, ParseError>;

    /// Get parser name for debugging
    fn name(&self) -> &'static str;
}

/// Create the default parser with the user-source nesting limit
pub fn create_parser() -> Box<dyn Parser> {
    Box::new(ScriptParser::new())
}

/// Parse `source` with the default parser settings
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    ScriptParser::new().parse_program(source)
}
