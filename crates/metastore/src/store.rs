//! Archiver-facing metadata operations
//!
//! `MetaStore` carries three in-process caches, all tolerant of cross-process
//! staleness but never contradicting a write this process has observed:
//!
//! - `uuid_cache`: UUID to StreamId (write-through on allocation)
//! - `path_cache`: UUID to last observed path (avoids a path upsert per post)
//! - `pmd_cache`: UUID to the path-metadata generation last merged for it;
//!   `save_path_metadata` bumps the process-wide generation, so a leaf whose
//!   cached generation is behind re-walks its prefixes on the next save

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use arcus_protocol::{
    get_prefixes, MessageMap, SmapMessage, TagDocument, APIKEYS_COLLECTION, METADATA_COLLECTION,
    PATHMETADATA_COLLECTION, STREAMS_COLLECTION,
};
use arcus_query::Filter;

use crate::backend::MetaBackend;
use crate::{MetaError, Result};

/// What a tags read returns: whole documents, or the distinct values of one key
#[derive(Debug, Clone, PartialEq)]
pub enum TagsResult {
    /// Projected tag documents
    Docs(Vec<TagDocument>),
    /// Distinct values of the requested key
    Distinct(Vec<Value>),
}

/// The metadata store
pub struct MetaStore {
    backend: Arc<dyn MetaBackend>,
    uuid_cache: RwLock<HashMap<String, u32>>,
    path_cache: RwLock<HashMap<String, String>>,
    pmd_cache: RwLock<HashMap<String, u64>>,
    pmd_generation: AtomicU64,
    maxsid: AtomicU32,
    stream_alloc: Mutex<()>,
}

impl MetaStore {
    /// Open the store over a backend: create the collection indexes and seed
    /// the StreamId counter. Index failure here is fatal to process init.
    pub async fn open(backend: Arc<dyn MetaBackend>) -> Result<Self> {
        backend
            .ensure_unique_index(METADATA_COLLECTION, &["uuid"])
            .await?;
        backend
            .ensure_unique_index(STREAMS_COLLECTION, &["uuid"])
            .await?;
        backend
            .ensure_unique_index(PATHMETADATA_COLLECTION, &["Path", "uuid"])
            .await?;
        backend
            .ensure_unique_index(APIKEYS_COLLECTION, &["key"])
            .await?;

        let maxsid = backend
            .max_u64(STREAMS_COLLECTION, "streamid")
            .await?
            .map(|max| max as u32 + 1)
            .unwrap_or(1);
        info!(maxsid, "metadata store opened");

        Ok(Self {
            backend,
            uuid_cache: RwLock::new(HashMap::new()),
            path_cache: RwLock::new(HashMap::new()),
            pmd_cache: RwLock::new(HashMap::new()),
            pmd_generation: AtomicU64::new(0),
            maxsid: AtomicU32::new(maxsid),
            stream_alloc: Mutex::new(()),
        })
    }

    /// Register an API key. `public` keys are readable by anyone; ownership
    /// checks on writes apply either way.
    pub async fn add_api_key(&self, key: &str, public: bool) -> Result<()> {
        let mut doc = TagDocument::new();
        doc.insert("key".to_string(), Value::String(key.to_string()));
        doc.insert("public".to_string(), Value::Bool(public));
        self.backend.insert(APIKEYS_COLLECTION, doc).await
    }

    /// Verify that exactly one record exists for `apikey` and that it owns
    /// every UUID in `messages`. First sight of a UUID claims it for the key.
    ///
    /// Inner-node messages (empty UUID) are exempt from the check; path
    /// metadata carries no ownership of its own.
    pub async fn check_key(&self, apikey: &str, messages: &MessageMap) -> Result<()> {
        let key_filter = filter_eq("key", apikey);
        match self.backend.count(APIKEYS_COLLECTION, &key_filter).await? {
            0 => return Err(MetaError::NoSuchKey(apikey.to_string())),
            1 => {}
            _ => return Err(MetaError::DuplicateKey(apikey.to_string())),
        }

        for msg in messages.values() {
            if msg.uuid.is_empty() {
                continue;
            }
            let uuid_filter = filter_eq("uuid", &msg.uuid);
            match self.backend.find_one(METADATA_COLLECTION, &uuid_filter).await? {
                Some(doc) => {
                    let owner = doc.get("_api").and_then(Value::as_str).unwrap_or_default();
                    if owner != apikey {
                        return Err(MetaError::ForbiddenUuid {
                            uuid: msg.uuid.clone(),
                            key: apikey.to_string(),
                        });
                    }
                }
                None => {
                    debug!(uuid = %msg.uuid, key = %apikey, "claiming uuid for key");
                    let mut doc = TagDocument::new();
                    doc.insert("uuid".to_string(), Value::String(msg.uuid.clone()));
                    doc.insert("_api".to_string(), Value::String(apikey.to_string()));
                    self.backend.insert(METADATA_COLLECTION, doc).await?;
                }
            }
        }
        Ok(())
    }

    /// Persist the tree-node messages of a report and remove them from the
    /// map, so later steps see only leaves.
    ///
    /// The root (`/`) applies its metadata to each immediate child path;
    /// nested inner nodes apply theirs to their own path. Each affected
    /// overlay document is upserted under `(Path, root uuid)`.
    pub async fn save_path_metadata(&self, messages: &mut MessageMap) -> Result<()> {
        let mut touched = false;
        let mut root_uuid = String::new();

        if let Some(root) = messages.remove("/") {
            root_uuid = root.uuid.clone();
            if !root.metadata.is_empty() {
                for child in &root.contents {
                    let path = format!("/{child}");
                    self.upsert_path_overlay(&path, &root_uuid, &root.metadata)
                        .await?;
                    touched = true;
                }
            }
        }

        let inner_paths: Vec<String> = messages
            .iter()
            .filter(|(_, m)| m.is_inner_node())
            .map(|(p, _)| p.clone())
            .collect();
        for path in inner_paths {
            let msg = match messages.remove(&path) {
                Some(m) => m,
                None => continue,
            };
            if !msg.metadata.is_empty() {
                self.upsert_path_overlay(&path, &root_uuid, &msg.metadata)
                    .await?;
                touched = true;
            }
        }

        if touched {
            self.pmd_generation.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn upsert_path_overlay(
        &self,
        path: &str,
        root_uuid: &str,
        metadata: &TagDocument,
    ) -> Result<()> {
        let mut filter = Filter::new();
        filter.insert("Path".to_string(), Value::String(path.to_string()));
        filter.insert("uuid".to_string(), Value::String(root_uuid.to_string()));
        self.backend
            .upsert(PATHMETADATA_COLLECTION, &filter, metadata)
            .await
    }

    /// Persist a leaf message's tags.
    ///
    /// Merges inherited path metadata when this UUID has never been merged or
    /// the overlays changed since, upserts the path when it moved, then
    /// upserts the message's own metadata, properties and actuator. All
    /// writes are idempotent upserts keyed by `{uuid}`.
    pub async fn save_metadata(&self, msg: &SmapMessage) -> Result<()> {
        if msg.uuid.is_empty() {
            return Ok(());
        }
        let uuid_filter = filter_eq("uuid", &msg.uuid);

        let generation = self.pmd_generation.load(Ordering::SeqCst);
        let merged_at = self.pmd_cache.read().get(&msg.uuid).copied();
        if merged_at != Some(generation) {
            let inherited = self.collect_inherited(&msg.path).await?;
            if !inherited.is_empty() {
                self.backend
                    .upsert(METADATA_COLLECTION, &uuid_filter, &inherited)
                    .await?;
            }
            self.pmd_cache.write().insert(msg.uuid.clone(), generation);
        }

        let cached_path = self.path_cache.read().get(&msg.uuid).cloned();
        if cached_path.as_deref() != Some(msg.path.as_str()) {
            let mut set = TagDocument::new();
            set.insert("Path".to_string(), Value::String(msg.path.clone()));
            self.backend
                .upsert(METADATA_COLLECTION, &uuid_filter, &set)
                .await?;
            self.path_cache
                .write()
                .insert(msg.uuid.clone(), msg.path.clone());
        }

        let mut set = TagDocument::new();
        for (k, v) in &msg.metadata {
            set.insert(format!("Metadata.{k}"), v.clone());
        }
        for (k, v) in &msg.properties {
            set.insert(format!("Properties.{k}"), v.clone());
        }
        if !msg.actuator.is_null() {
            set.insert("Actuator".to_string(), msg.actuator.clone());
        }
        if !set.is_empty() {
            self.backend
                .upsert(METADATA_COLLECTION, &uuid_filter, &set)
                .await?;
        }
        Ok(())
    }

    /// The key-wise merge of every path overlay applying to `path`, shallow
    /// prefixes first so deeper values win, as `Metadata.*` upsert keys.
    async fn collect_inherited(&self, path: &str) -> Result<TagDocument> {
        let mut inherited = TagDocument::new();
        for prefix in get_prefixes(path) {
            let filter = filter_eq("Path", &prefix);
            for overlay in self
                .backend
                .find(PATHMETADATA_COLLECTION, &filter, None)
                .await?
            {
                for (k, v) in overlay {
                    if k == "Path" || k == "uuid" {
                        continue;
                    }
                    inherited.insert(format!("Metadata.{k}"), v);
                }
            }
        }
        Ok(inherited)
    }

    /// Tags read: apply `where_doc`, project `select` (1 = include,
    /// 0 = exclude, `_id` always excluded), optionally collapsing to the
    /// distinct values of `distinct_key`.
    pub async fn get_tags(
        &self,
        select: &Map<String, Value>,
        distinct: bool,
        distinct_key: &str,
        where_doc: &Filter,
    ) -> Result<TagsResult> {
        if distinct {
            let values = self
                .backend
                .distinct(METADATA_COLLECTION, distinct_key, where_doc)
                .await?;
            return Ok(TagsResult::Distinct(values));
        }
        let projection = if select.is_empty() { None } else { Some(select) };
        let docs = self
            .backend
            .find(METADATA_COLLECTION, where_doc, projection)
            .await?;
        Ok(TagsResult::Docs(docs))
    }

    /// Tags write: apply `updates` to every document matching `where_doc`
    /// that the key owns; returns the number updated.
    pub async fn set_tags(
        &self,
        updates: &TagDocument,
        apikey: &str,
        where_doc: &Filter,
    ) -> Result<usize> {
        let mut scoped = Filter::new();
        scoped.insert(
            "$and".to_string(),
            Value::Array(vec![
                Value::Object(where_doc.clone()),
                Value::Object(filter_eq("_api", apikey)),
            ]),
        );
        let updated = self
            .backend
            .update_many(METADATA_COLLECTION, &scoped, updates)
            .await?;
        info!(updated, key = %apikey, "tags updated");
        Ok(updated)
    }

    /// Resolve a filter to the UUIDs of matching streams, in the backend's
    /// natural order.
    pub async fn get_uuids(&self, where_doc: &Filter) -> Result<Vec<String>> {
        let mut projection = Map::new();
        projection.insert("uuid".to_string(), Value::from(1));
        let docs = self
            .backend
            .find(METADATA_COLLECTION, where_doc, Some(&projection))
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| d.get("uuid").and_then(Value::as_str).map(String::from))
            .collect())
    }

    /// All tag documents for one UUID, `_id` excluded
    pub async fn tags_uuid(&self, uuid: &str) -> Result<Vec<TagDocument>> {
        self.backend
            .find(METADATA_COLLECTION, &filter_eq("uuid", uuid), None)
            .await
    }

    /// The StreamId for a UUID, allocating on first sight.
    ///
    /// Allocation is serialized by a single mutex around a process-wide
    /// monotonic counter; a racer that loses the unique-index insert
    /// (another process claimed the UUID) re-reads the winner's value.
    pub async fn get_stream_id(&self, uuid: &str) -> Result<u32> {
        if let Some(sid) = self.uuid_cache.read().get(uuid) {
            return Ok(*sid);
        }

        let _guard = self.stream_alloc.lock().await;
        // Another task may have allocated while we waited on the lock
        if let Some(sid) = self.uuid_cache.read().get(uuid) {
            return Ok(*sid);
        }

        let uuid_filter = filter_eq("uuid", uuid);
        let sid = match self.backend.find_one(STREAMS_COLLECTION, &uuid_filter).await? {
            Some(doc) => doc
                .get("streamid")
                .and_then(Value::as_u64)
                .map(|v| v as u32)
                .ok_or(MetaError::Malformed {
                    collection: STREAMS_COLLECTION,
                    message: "stream record without streamid".to_string(),
                })?,
            None => {
                let sid = self.maxsid.fetch_add(1, Ordering::SeqCst);
                let mut doc = TagDocument::new();
                doc.insert("uuid".to_string(), Value::String(uuid.to_string()));
                doc.insert("streamid".to_string(), Value::from(sid));
                match self.backend.insert(STREAMS_COLLECTION, doc).await {
                    Ok(()) => {
                        info!(streamid = sid, uuid = %uuid, "allocated streamid");
                        sid
                    }
                    Err(MetaError::DuplicateDocument { .. }) => {
                        // Lost a cross-process race; the winner's id stands
                        let doc = self
                            .backend
                            .find_one(STREAMS_COLLECTION, &uuid_filter)
                            .await?
                            .ok_or_else(|| {
                                MetaError::backend("stream record vanished after duplicate insert")
                            })?;
                        doc.get("streamid")
                            .and_then(Value::as_u64)
                            .map(|v| v as u32)
                            .ok_or(MetaError::Malformed {
                                collection: STREAMS_COLLECTION,
                                message: "stream record without streamid".to_string(),
                            })?
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        self.uuid_cache.write().insert(uuid.to_string(), sid);
        Ok(sid)
    }
}

/// `{field: value}` equality filter
fn filter_eq(field: &str, value: &str) -> Filter {
    let mut f = Filter::new();
    f.insert(field.to_string(), Value::String(value.to_string()));
    f
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
