//! The republisher: subscription registry and fan-out
//!
//! Registration resolves the query's WHERE clause against the metadata store
//! once, giving each subscription a UUID fast-path set; live matching then
//! checks that set before falling back to evaluating the predicate on the
//! message's own tags. A lifetime watcher per subscription waits on the
//! sink's close signal and evicts it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use arcus_metastore::MetaStore;
use arcus_protocol::SmapMessage;
use arcus_query::parse;

use crate::sink::{Delivery, SubscriberSink};
use crate::subscription::Subscription;
use crate::Result;

/// Republisher tunables
#[derive(Debug, Clone)]
pub struct RepublisherConfig {
    /// Add a stream to a subscription's fast path when it first matches by
    /// predicate after registration. Off by default: the standing set is
    /// resolved once at subscription time.
    pub resubscribe_on_metadata_match: bool,
}

impl Default for RepublisherConfig {
    fn default() -> Self {
        Self {
            resubscribe_on_metadata_match: false,
        }
    }
}

/// Matches live messages against standing predicates and fans out
pub struct Republisher {
    store: Arc<MetaStore>,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    next_id: AtomicU64,
    config: RepublisherConfig,
}

impl Republisher {
    /// Create a republisher resolving predicates against `store`
    pub fn new(store: Arc<MetaStore>, config: RepublisherConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            config,
        })
    }

    /// Number of live subscribers
    pub fn client_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Register a subscriber for all streams matching `query`'s WHERE
    /// clause. Returns the subscription id. The subscription lives until the
    /// sink reports closed.
    pub async fn handle_subscriber(
        self: &Arc<Self>,
        sink: Arc<dyn SubscriberSink>,
        query: &str,
    ) -> Result<u64> {
        let registered = self.register(Arc::clone(&sink), query).await;
        match registered {
            Ok(id) => Ok(id),
            Err(e) => {
                sink.send_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn register(self: &Arc<Self>, sink: Arc<dyn SubscriberSink>, query: &str) -> Result<u64> {
        let ast = parse(query)?;
        let filter = ast.where_clause.compile();
        let uuids: HashSet<String> = self.store.get_uuids(&filter).await?.into_iter().collect();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscription = Arc::new(Subscription::new(id, filter, uuids, sink));

        self.subscriptions.write().push(Arc::clone(&subscription));
        info!(
            id,
            uuids = subscription.uuid_count(),
            "republish subscriber registered"
        );

        // Lifetime watcher: the sink's close signal is the authoritative
        // cancel. Eviction releases the subscription's resources.
        let republisher = Arc::clone(self);
        let token = subscription.sink().closed();
        tokio::spawn(async move {
            token.cancelled().await;
            republisher.remove(id);
        });

        Ok(id)
    }

    fn remove(&self, id: u64) {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id() != id);
        if subscriptions.len() < before {
            debug!(id, "republish subscriber removed");
        }
    }

    /// Match one ingested message against every standing subscription and
    /// deliver. Non-blocking: a full subscriber queue drops the message for
    /// that subscriber only.
    pub fn republish(&self, msg: &Arc<SmapMessage>) {
        let subscriptions = self.subscriptions.read();
        if subscriptions.is_empty() {
            return;
        }

        for subscription in subscriptions.iter() {
            let matched = if subscription.matches_uuid(&msg.uuid) {
                true
            } else if subscription.matches_tags(msg) {
                if self.config.resubscribe_on_metadata_match && !msg.uuid.is_empty() {
                    subscription.add_uuid(&msg.uuid);
                }
                true
            } else {
                false
            };
            if !matched {
                continue;
            }

            match subscription.deliver(Arc::clone(msg)) {
                Delivery::Sent => {}
                Delivery::Full => {
                    warn!(
                        id = subscription.id(),
                        uuid = %msg.uuid,
                        "subscriber queue full, dropping message"
                    );
                }
                Delivery::Closed => {
                    // The watcher is about to evict; nothing to do here
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "republisher_test.rs"]
mod tests;
