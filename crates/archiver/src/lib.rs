//! The archiver facade
//!
//! `Archiver` composes the metadata store, the time-series gateway and the
//! republisher behind the two operations every transport adapter calls:
//! [`Archiver::add_data`] for ingest and [`Archiver::handle_query`] for
//! queries, plus the subscriber hand-off for live republish. The adapters
//! (HTTP, msgpack TCP) only translate wire formats; all sequencing,
//! authorization and fan-out lives here.

mod archiver;
mod error;
mod stats;

pub use archiver::Archiver;
pub use error::ArchiverError;
pub use stats::{ArchiverStats, Counter};

/// Result type for archiver operations
pub type Result<T> = std::result::Result<T, ArchiverError>;
