//! Archiver error types
//!
//! Adapters map these onto their transport: `is_auth` to a 401-equivalent,
//! `is_parse` to a 400-equivalent, everything else to a 500-equivalent.

use thiserror::Error;

use arcus_metastore::MetaError;
use arcus_query::ParseError;
use arcus_republish::RepublishError;
use arcus_tsdb::TsdbError;

/// Errors surfaced by archiver operations
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// Metadata store failure, including authorization
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Malformed query string
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Time-series gateway failure
    #[error(transparent)]
    Tsdb(#[from] TsdbError),
}

impl ArchiverError {
    /// True when the caller presented a bad or foreign API key
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Meta(e) if e.is_auth())
    }

    /// True when the query string itself was malformed
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

impl From<RepublishError> for ArchiverError {
    fn from(e: RepublishError) -> Self {
        match e {
            RepublishError::Parse(p) => Self::Parse(p),
            RepublishError::Meta(m) => Self::Meta(m),
        }
    }
}
