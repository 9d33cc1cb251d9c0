//! Metadata store for the arcus archiver
//!
//! The store owns four collections:
//!
//! - `metadata` - one tag document per stream UUID (unique on `uuid`)
//! - `pathmetadata` - tag overlays keyed by `(Path, root uuid)`, inherited by
//!   every leaf whose path has that path as a prefix
//! - `streams` - the UUID to StreamId mapping (unique on `uuid`)
//! - `apikeys` - capability tokens owning sets of UUIDs (unique on `key`)
//!
//! [`MetaStore`] implements the archiver-facing operations (key checking,
//! metadata persistence with prefix inheritance, tag queries, StreamId
//! allocation) on top of a [`MetaBackend`]: the named interface a physical
//! document database implements. [`MemoryBackend`] is the in-process
//! reference implementation used by tests and standalone deployments.

mod backend;
mod error;
mod memory;
mod store;

pub use backend::MetaBackend;
pub use error::MetaError;
pub use memory::MemoryBackend;
pub use store::{MetaStore, TagsResult};

/// Result type for metadata operations
pub type Result<T> = std::result::Result<T, MetaError>;
