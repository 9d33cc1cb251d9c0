//! Metadata store error types

use thiserror::Error;

/// Errors that can occur in the metadata store
#[derive(Debug, Error)]
pub enum MetaError {
    /// No API-key record exists for the presented key
    #[error("no API key with value {0}")]
    NoSuchKey(String),

    /// More than one API-key record exists for the presented key
    #[error("more than one API key with value {0}")]
    DuplicateKey(String),

    /// The presented key does not own the UUID it tried to write
    #[error("API key {key} is invalid for UUID {uuid}")]
    ForbiddenUuid {
        /// The stream that was written
        uuid: String,
        /// The key that tried
        key: String,
    },

    /// A unique index rejected an insert
    #[error("duplicate document in '{collection}' for key {key}")]
    DuplicateDocument {
        /// Collection holding the index
        collection: &'static str,
        /// Rendered index key values
        key: String,
    },

    /// Index creation failed at startup (fatal)
    #[error("could not create index on {collection}.{keys}: {message}")]
    Index {
        /// Collection the index was for
        collection: &'static str,
        /// Index key list
        keys: String,
        /// Backend detail
        message: String,
    },

    /// The backend failed mid-operation
    #[error("metadata backend error: {0}")]
    Backend(String),

    /// A stored document had an unexpected shape
    #[error("malformed document in '{collection}': {message}")]
    Malformed {
        /// Collection the document came from
        collection: &'static str,
        /// What was wrong
        message: String,
    },
}

impl MetaError {
    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// True for errors the archiver reports as authorization failures
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::NoSuchKey(_) | Self::DuplicateKey(_) | Self::ForbiddenUuid { .. }
        )
    }
}
