//! The collaborator interface a physical metadata database implements
//!
//! Operations are expressed in terms of compiled filter documents
//! (`arcus_query::Filter`) and flat tag documents, so the store logic above
//! is backend-agnostic. Implementations must be safe for concurrent use.

use async_trait::async_trait;

use arcus_protocol::TagDocument;
use arcus_query::Filter;
use serde_json::{Map, Value};

use crate::Result;

/// Document-database operations the metadata store is built on
#[async_trait]
pub trait MetaBackend: Send + Sync {
    /// Create a unique index over `keys`. Called once at startup; failure is
    /// fatal to process init.
    async fn ensure_unique_index(&self, collection: &'static str, keys: &[&str]) -> Result<()>;

    /// All documents matching `filter`, projected. Document order is the
    /// backend's natural (insertion/index) order and must be stable between
    /// calls absent writes.
    async fn find(
        &self,
        collection: &'static str,
        filter: &Filter,
        projection: Option<&Map<String, Value>>,
    ) -> Result<Vec<TagDocument>>;

    /// First document matching `filter`, unprojected
    async fn find_one(&self, collection: &'static str, filter: &Filter)
        -> Result<Option<TagDocument>>;

    /// Number of documents matching `filter`
    async fn count(&self, collection: &'static str, filter: &Filter) -> Result<usize>;

    /// Insert a new document. Unique-index violations surface as
    /// `MetaError::DuplicateDocument`.
    async fn insert(&self, collection: &'static str, doc: TagDocument) -> Result<()>;

    /// Merge `set` into the first document matching `filter`, creating it
    /// (from the filter's equality fields plus `set`) when absent.
    async fn upsert(
        &self,
        collection: &'static str,
        filter: &Filter,
        set: &TagDocument,
    ) -> Result<()>;

    /// Merge `set` into every document matching `filter`; returns how many
    /// were updated. Never creates documents.
    async fn update_many(
        &self,
        collection: &'static str,
        filter: &Filter,
        set: &TagDocument,
    ) -> Result<usize>;

    /// Distinct values of `key` over documents matching `filter`
    async fn distinct(
        &self,
        collection: &'static str,
        key: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>>;

    /// Largest numeric value of `key` across the collection, if any.
    /// Used to seed the StreamId counter at startup.
    async fn max_u64(&self, collection: &'static str, key: &str) -> Result<Option<u64>>;
}
