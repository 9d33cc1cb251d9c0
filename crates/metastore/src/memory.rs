//! In-memory reference backend
//!
//! Collections are insertion-ordered vectors of tag documents behind
//! `parking_lot::RwLock`. Filters are evaluated with the reference matcher
//! from `arcus_query::filter`, so this backend doubles as the executable
//! definition of filter semantics. Unique indexes are enforced on insert and
//! on upsert-created documents.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use arcus_protocol::TagDocument;
use arcus_query::{filter, Filter};

use crate::backend::MetaBackend;
use crate::{MetaError, Result};

#[derive(Default)]
struct Collection {
    docs: Vec<TagDocument>,
    unique_indexes: Vec<Vec<String>>,
}

impl Collection {
    /// The index key values of `doc` for `index`, or None when any key is
    /// absent (sparse semantics: absent keys never collide).
    fn index_key(doc: &TagDocument, index: &[String]) -> Option<Vec<Value>> {
        index.iter().map(|k| doc.get(k).cloned()).collect()
    }

    fn violates_unique(&self, doc: &TagDocument) -> Option<String> {
        for index in &self.unique_indexes {
            let key = match Self::index_key(doc, index) {
                Some(k) => k,
                None => continue,
            };
            for existing in &self.docs {
                if Self::index_key(existing, index).as_ref() == Some(&key) {
                    return Some(format!("{index:?}={key:?}"));
                }
            }
        }
        None
    }
}

/// The in-process reference implementation of [`MetaBackend`]
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<&'static str, Collection>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collection<T>(&self, name: &'static str, f: impl FnOnce(&Collection) -> T) -> T {
        let mut collections = self.collections.write();
        f(collections.entry(name).or_default())
    }

    fn with_collection_mut<T>(
        &self,
        name: &'static str,
        f: impl FnOnce(&mut Collection) -> T,
    ) -> T {
        let mut collections = self.collections.write();
        f(collections.entry(name).or_default())
    }
}

/// Apply a projection document: value 1 keeps exactly those keys, value 0
/// drops those keys and keeps the rest. `_id` is always excluded (this
/// backend never materializes one).
fn apply_projection(doc: &TagDocument, projection: Option<&Map<String, Value>>) -> TagDocument {
    let mut out = match projection {
        None => doc.clone(),
        Some(p) if p.is_empty() => doc.clone(),
        Some(p) => {
            let include: Vec<&String> = p
                .iter()
                .filter(|(_, v)| v.as_i64() == Some(1))
                .map(|(k, _)| k)
                .collect();
            if include.is_empty() {
                let mut kept = doc.clone();
                for (k, v) in p {
                    if v.as_i64() == Some(0) {
                        kept.remove(k);
                    }
                }
                kept
            } else {
                let mut kept = TagDocument::new();
                for k in include {
                    if let Some(v) = doc.get(k) {
                        kept.insert(k.clone(), v.clone());
                    }
                }
                kept
            }
        }
    };
    out.remove("_id");
    out
}

/// The document an upsert creates when nothing matched: the filter's plain
/// equality fields overlaid with the set document.
fn upsert_seed(filter_doc: &Filter, set: &TagDocument) -> TagDocument {
    let mut doc = TagDocument::new();
    for (k, v) in filter_doc {
        if !k.starts_with('$') && !v.is_object() {
            doc.insert(k.clone(), v.clone());
        }
    }
    for (k, v) in set {
        doc.insert(k.clone(), v.clone());
    }
    doc
}

#[async_trait]
impl MetaBackend for MemoryBackend {
    async fn ensure_unique_index(&self, collection: &'static str, keys: &[&str]) -> Result<()> {
        self.with_collection_mut(collection, |c| {
            let index: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
            if !c.unique_indexes.contains(&index) {
                c.unique_indexes.push(index);
            }
        });
        Ok(())
    }

    async fn find(
        &self,
        collection: &'static str,
        filter_doc: &Filter,
        projection: Option<&Map<String, Value>>,
    ) -> Result<Vec<TagDocument>> {
        Ok(self.with_collection(collection, |c| {
            c.docs
                .iter()
                .filter(|d| filter::matches(filter_doc, d))
                .map(|d| apply_projection(d, projection))
                .collect()
        }))
    }

    async fn find_one(
        &self,
        collection: &'static str,
        filter_doc: &Filter,
    ) -> Result<Option<TagDocument>> {
        Ok(self.with_collection(collection, |c| {
            c.docs
                .iter()
                .find(|d| filter::matches(filter_doc, d))
                .map(|d| apply_projection(d, None))
        }))
    }

    async fn count(&self, collection: &'static str, filter_doc: &Filter) -> Result<usize> {
        Ok(self.with_collection(collection, |c| {
            c.docs.iter().filter(|d| filter::matches(filter_doc, d)).count()
        }))
    }

    async fn insert(&self, collection: &'static str, doc: TagDocument) -> Result<()> {
        self.with_collection_mut(collection, |c| {
            if let Some(key) = c.violates_unique(&doc) {
                return Err(MetaError::DuplicateDocument { collection, key });
            }
            c.docs.push(doc);
            Ok(())
        })
    }

    async fn upsert(
        &self,
        collection: &'static str,
        filter_doc: &Filter,
        set: &TagDocument,
    ) -> Result<()> {
        self.with_collection_mut(collection, |c| {
            for doc in c.docs.iter_mut() {
                if filter::matches(filter_doc, doc) {
                    for (k, v) in set {
                        doc.insert(k.clone(), v.clone());
                    }
                    return Ok(());
                }
            }
            let seed = upsert_seed(filter_doc, set);
            if let Some(key) = c.violates_unique(&seed) {
                return Err(MetaError::DuplicateDocument { collection, key });
            }
            c.docs.push(seed);
            Ok(())
        })
    }

    async fn update_many(
        &self,
        collection: &'static str,
        filter_doc: &Filter,
        set: &TagDocument,
    ) -> Result<usize> {
        Ok(self.with_collection_mut(collection, |c| {
            let mut updated = 0;
            for doc in c.docs.iter_mut() {
                if filter::matches(filter_doc, doc) {
                    for (k, v) in set {
                        doc.insert(k.clone(), v.clone());
                    }
                    updated += 1;
                }
            }
            updated
        }))
    }

    async fn distinct(
        &self,
        collection: &'static str,
        key: &str,
        filter_doc: &Filter,
    ) -> Result<Vec<Value>> {
        Ok(self.with_collection(collection, |c| {
            let mut seen = Vec::new();
            for doc in c.docs.iter().filter(|d| filter::matches(filter_doc, d)) {
                if let Some(v) = doc.get(key) {
                    if !seen.contains(v) {
                        seen.push(v.clone());
                    }
                }
            }
            seen
        }))
    }

    async fn max_u64(&self, collection: &'static str, key: &str) -> Result<Option<u64>> {
        Ok(self.with_collection(collection, |c| {
            c.docs.iter().filter_map(|d| d.get(key)?.as_u64()).max()
        }))
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
