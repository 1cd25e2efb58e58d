//! Error types for ECL parsing.

use thiserror::Error;

/// Errors that can occur while parsing an ECL expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EclError {
    /// Parse error at a specific position in the input.
    #[error("parse error at position {position}: {message}")]
    Parse {
        /// Byte offset in the input where parsing stopped.
        position: usize,
        /// Description of the error.
        message: String,
    },

    /// The expression ended before a complete constraint was read.
    #[error("ECL is incomplete: {0}")]
    Incomplete(String),

    /// Empty input provided.
    #[error("empty ECL expression")]
    Empty,
}

/// Result type for ECL operations.
pub type EclResult<T> = std::result::Result<T, EclError>;
