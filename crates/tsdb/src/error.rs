//! Gateway error types

use thiserror::Error;

use arcus_metastore::MetaError;

/// Errors that can occur in the time-series gateway
#[derive(Debug, Error)]
pub enum TsdbError {
    /// Socket-level failure (dial, write, read)
    #[error("tsdb i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame violated the wire contract
    #[error("malformed tsdb frame: {0}")]
    Frame(String),

    /// The backend answered with a non-zero status
    #[error("tsdb returned status {0}")]
    Status(u32),

    /// StreamId resolution failed
    #[error(transparent)]
    Store(#[from] MetaError),

    /// `attach_store` was never called
    #[error("no metadata store attached to tsdb gateway")]
    NoStore,

    /// JSON framing failure (quasar backend)
    #[error("tsdb json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TsdbError {
    /// Create a Frame error
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame(message.into())
    }
}
