//! Republish error types

use thiserror::Error;

use arcus_metastore::MetaError;
use arcus_query::ParseError;

/// Errors that can occur while registering a subscription
#[derive(Debug, Error)]
pub enum RepublishError {
    /// The subscription query did not parse
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Resolving the initial UUID set failed
    #[error(transparent)]
    Meta(#[from] MetaError),
}
