//! The central archiver object
//!
//! All transport handlers call into here. Ingest sequencing: key check, then
//! path-metadata extraction (inner nodes leave the map), then per-leaf
//! fan-out of metadata save, republish and TSDB write. Ingest is not
//! transactional across the metadata store and the TSDB: a partial failure
//! leaves merged-upsert state behind and surfaces the first error; every
//! metadata write is an idempotent upsert, so retrying the same report is
//! safe.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{error, info};

use arcus_metastore::{MetaStore, TagsResult};
use arcus_protocol::{MessageMap, SmapMessage, SmapResponse};
use arcus_query::{parse, DataQueryKind, Target};
use arcus_republish::{Republisher, SubscriberSink};
use arcus_tsdb::Tsdb;

use crate::stats::{ArchiverStats, Counter};
use crate::{ArchiverError, Result};

/// The archiver: authorizes writes, persists metadata, forwards readings,
/// republishes, serves queries
pub struct Archiver {
    store: Arc<MetaStore>,
    tsdb: Arc<dyn Tsdb>,
    republisher: Arc<Republisher>,
    incoming: Counter,
    pending_writes: Counter,
}

impl Archiver {
    /// Compose an archiver. The gateway gets the store attached here, so a
    /// freshly constructed `Archiver` is ready to serve.
    pub fn new(store: Arc<MetaStore>, tsdb: Arc<dyn Tsdb>, republisher: Arc<Republisher>) -> Arc<Self> {
        tsdb.attach_store(Arc::clone(&store));
        Arc::new(Self {
            store,
            tsdb,
            republisher,
            incoming: Counter::new(),
            pending_writes: Counter::new(),
        })
    }

    /// The metadata store this archiver persists to
    pub fn store(&self) -> &Arc<MetaStore> {
        &self.store
    }

    /// Commit a producer report: check the key, persist path metadata, then
    /// per remaining leaf save tags, republish and forward readings, all
    /// leaves concurrently. Leaf failures are logged; the first one is
    /// surfaced after every leaf has been attempted.
    pub async fn add_data(&self, mut messages: MessageMap, apikey: &str) -> Result<()> {
        self.store.check_key(apikey, &messages).await?;
        self.store.save_path_metadata(&mut messages).await?;

        let leaves: Vec<Arc<SmapMessage>> = messages.into_values().map(Arc::new).collect();
        let results = join_all(leaves.into_iter().map(|msg| self.commit_leaf(msg))).await;

        let mut first_err = None;
        for result in results {
            if let Err(e) = result {
                error!(error = %e, "leaf commit failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn commit_leaf(&self, msg: Arc<SmapMessage>) -> Result<()> {
        self.republisher.republish(&msg);
        self.incoming.mark_n(msg.readings.len() as u64);

        let save = self.store.save_metadata(&msg);
        let forward = async {
            if msg.readings.is_empty() || msg.uuid.is_empty() {
                return Ok(());
            }
            self.pending_writes.mark();
            self.tsdb.add(&msg.reading_set()).await
        };
        let (saved, forwarded) = tokio::join!(save, forward);
        saved?;
        forwarded?;
        Ok(())
    }

    /// Evaluate a query string: parse, dispatch on the target, serialize the
    /// result as JSON. `apikey` scopes tag writes; reads ignore it.
    pub async fn handle_query(&self, query: &str, apikey: &str) -> Result<Value> {
        if !apikey.is_empty() {
            info!(key = %apikey, "query with key");
        }
        info!(query = %query, "evaluating query");

        let ast = parse(query)?;
        let where_doc = ast.where_clause.compile();

        match ast.target {
            Target::Tags(target) => {
                let result = self
                    .store
                    .get_tags(
                        &target.projection(),
                        target.distinct,
                        target.distinct_key(),
                        &where_doc,
                    )
                    .await?;
                let value = match result {
                    TagsResult::Docs(docs) => serde_json::to_value(docs),
                    TagsResult::Distinct(values) => serde_json::to_value(values),
                };
                Ok(value.unwrap_or(Value::Null))
            }
            Target::Set(target) => {
                let updated = self
                    .store
                    .set_tags(&target.updates, apikey, &where_doc)
                    .await?;
                Ok(serde_json::json!({ "Updated": updated }))
            }
            Target::Data(target) => {
                let mut uuids = self.store.get_uuids(&where_doc).await?;
                if target.streamlimit >= 0 {
                    uuids.truncate(target.streamlimit as usize);
                }
                let response = match target.kind {
                    DataQueryKind::In => {
                        self.get_data(&uuids, target.start_ms, target.end_ms).await?
                    }
                    DataQueryKind::After => {
                        self.next_data(&uuids, target.ref_ms, target.limit).await?
                    }
                    DataQueryKind::Before => {
                        self.prev_data(&uuids, target.ref_ms, target.limit).await?
                    }
                };
                Ok(serde_json::to_value(response).unwrap_or(Value::Null))
            }
        }
    }

    /// All points in `[start_ms, end_ms]` for each UUID
    pub async fn get_data(
        &self,
        uuids: &[String],
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Vec<SmapResponse>> {
        Ok(self.tsdb.get_data(uuids, start_ms, end_ms).await?)
    }

    /// Up to `limit` points at or before `ref_ms` per UUID
    pub async fn prev_data(
        &self,
        uuids: &[String],
        ref_ms: u64,
        limit: i32,
    ) -> Result<Vec<SmapResponse>> {
        Ok(self.tsdb.prev(uuids, ref_ms, limit).await?)
    }

    /// Up to `limit` points at or after `ref_ms` per UUID
    pub async fn next_data(
        &self,
        uuids: &[String],
        ref_ms: u64,
        limit: i32,
    ) -> Result<Vec<SmapResponse>> {
        Ok(self.tsdb.next(uuids, ref_ms, limit).await?)
    }

    /// All tag documents for one UUID
    pub async fn tags_uuid(&self, uuid: &str) -> Result<Value> {
        let docs = self.store.tags_uuid(uuid).await?;
        Ok(serde_json::to_value(docs).unwrap_or(Value::Null))
    }

    /// Subscribe a sink to all streams matching the query's WHERE clause.
    /// Evaluated once at subscription time; the subscription lives until the
    /// sink closes.
    pub async fn handle_subscriber(
        &self,
        sink: Arc<dyn SubscriberSink>,
        query: &str,
    ) -> Result<u64> {
        self.republisher
            .handle_subscriber(sink, query)
            .await
            .map_err(ArchiverError::from)
    }

    /// Current gauge snapshot
    pub fn stats(&self) -> ArchiverStats {
        ArchiverStats {
            num_repub_clients: self.republisher.client_count(),
            incoming_counter: self.incoming.last(),
            pending_writes: self.pending_writes.last(),
            tsdb_connections: self.tsdb.live_connections(),
        }
    }

    /// Log one status line and roll the interval counters
    pub fn status(&self) {
        info!(
            repub_clients = self.republisher.client_count(),
            recv_adds = self.incoming.reset(),
            pend_writes = self.pending_writes.reset(),
            live_conns = self.tsdb.live_connections(),
            "archiver status"
        );
    }

    /// Spawn the periodic status reporter
    pub fn spawn_status_reporter(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let archiver = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                archiver.status();
            }
        })
    }
}
