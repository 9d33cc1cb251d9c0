//! Query parse errors

use thiserror::Error;

/// Errors produced while parsing a query string
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Query string was empty or all whitespace
    #[error("empty query")]
    Empty,

    /// Something other than the expected token appeared
    #[error("unexpected '{found}' at byte {pos}: expected {expected}")]
    Unexpected {
        /// What the lexer produced
        found: String,
        /// What the grammar wanted here
        expected: &'static str,
        /// Byte offset into the query string
        pos: usize,
    },

    /// The query ended mid-production
    #[error("unexpected end of query: expected {expected}")]
    UnexpectedEnd {
        /// What the grammar wanted next
        expected: &'static str,
    },

    /// A string literal was never closed
    #[error("unterminated string starting at byte {pos}")]
    UnterminatedString {
        /// Byte offset of the opening quote
        pos: usize,
    },

    /// A numeric literal did not parse
    #[error("invalid number '{text}' at byte {pos}")]
    InvalidNumber {
        /// The offending text
        text: String,
        /// Byte offset of the literal
        pos: usize,
    },

    /// Trailing input after a complete query
    #[error("trailing input at byte {pos}: '{found}'")]
    TrailingInput {
        /// What was left over
        found: String,
        /// Byte offset of the leftover token
        pos: usize,
    },
}
