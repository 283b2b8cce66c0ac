//! Error types for Trellis
//!
//! Every failure is terminal for the query that raised it: the caller
//! surfaces the message and lets the user edit and resubmit.

use thiserror::Error;

/// The main error type for Trellis operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lexical Errors ==========
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },

    #[error("Invalid IRI at position {position}: {message}")]
    InvalidIri { position: usize, message: String },

    #[error("Invalid literal at position {position}: {message}")]
    InvalidLiteral { position: usize, message: String },

    // ========== Parse Errors ==========
    #[error("Expected {expected}, found {found} at token {position}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("Unsupported aggregate: {0}")]
    UnsupportedAggregate(String),

    // ========== Evaluation Errors ==========
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Unbound variable: ?{0}")]
    UnboundVariable(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(String),

    #[error("Result too large: more than {limit} intermediate bindings")]
    ResultTooLarge { limit: usize },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    // ========== Loading Errors ==========
    #[error("Invalid triple on line {line}: {message}")]
    InvalidTriple { line: usize, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Trellis operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error was raised while tokenizing or parsing
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedCharacter { .. }
                | Error::InvalidIri { .. }
                | Error::InvalidLiteral { .. }
                | Error::UnexpectedToken { .. }
                | Error::UnsupportedAggregate(_)
        )
    }

    /// Returns true if this error was raised while evaluating a parsed query
    pub fn is_evaluation_error(&self) -> bool {
        matches!(
            self,
            Error::TypeError(_)
                | Error::UnboundVariable(_)
                | Error::DivisionByZero
                | Error::InvalidRegex(_)
                | Error::ResultTooLarge { .. }
                | Error::UnsupportedOperation(_)
        )
    }

    /// Byte offset into the query text, for lexical errors
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::UnexpectedCharacter { position, .. }
            | Error::InvalidIri { position, .. }
            | Error::InvalidLiteral { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// Position reported by the error: a byte offset for lexical errors,
    /// a token index for parse errors
    pub fn position(&self) -> Option<usize> {
        match self {
            Error::UnexpectedToken { position, .. } => Some(*position),
            _ => self.offset(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
