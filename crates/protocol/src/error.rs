//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding or validating sMAP messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message body is not the expected JSON shape
    #[error("invalid message shape: {0}")]
    InvalidShape(String),

    /// A reading entry was not a `[timestamp, value]` pair
    #[error("invalid reading at index {index}: {message}")]
    InvalidReading {
        /// Position within the readings array
        index: usize,
        /// What was wrong with it
        message: String,
    },

    /// A leaf message carried readings but no UUID
    #[error("message for path '{0}' has readings but no uuid")]
    MissingUuid(String),

    /// JSON (de)serialization failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Create an InvalidShape error
    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }

    /// Create an InvalidReading error
    pub fn invalid_reading(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidReading {
            index,
            message: message.into(),
        }
    }
}
