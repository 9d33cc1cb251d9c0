//! A standing subscription

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use arcus_protocol::SmapMessage;
use arcus_query::{filter, Filter};

use crate::sink::{Delivery, SubscriberSink};

/// One live subscriber: its compiled predicate, the UUID set resolved at
/// registration (the fast path), and its sink
pub struct Subscription {
    id: u64,
    filter: Filter,
    uuids: RwLock<HashSet<String>>,
    sink: Arc<dyn SubscriberSink>,
    registered_at: Instant,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        filter: Filter,
        uuids: HashSet<String>,
        sink: Arc<dyn SubscriberSink>,
    ) -> Self {
        Self {
            id,
            filter,
            uuids: RwLock::new(uuids),
            sink,
            registered_at: Instant::now(),
        }
    }

    /// Unique subscription id
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// How long this subscription has been live
    pub fn age(&self) -> std::time::Duration {
        self.registered_at.elapsed()
    }

    /// Number of UUIDs on the fast path
    pub fn uuid_count(&self) -> usize {
        self.uuids.read().len()
    }

    /// Fast path: was this UUID matched at registration (or added since)?
    #[inline]
    pub(crate) fn matches_uuid(&self, uuid: &str) -> bool {
        !uuid.is_empty() && self.uuids.read().contains(uuid)
    }

    /// Slow path: do the message's own tags satisfy the predicate?
    pub(crate) fn matches_tags(&self, msg: &SmapMessage) -> bool {
        filter::matches(&self.filter, &msg.flat_tags())
    }

    pub(crate) fn add_uuid(&self, uuid: &str) {
        self.uuids.write().insert(uuid.to_string());
    }

    pub(crate) fn deliver(&self, msg: Arc<SmapMessage>) -> Delivery {
        self.sink.deliver(msg)
    }

    pub(crate) fn sink(&self) -> &Arc<dyn SubscriberSink> {
        &self.sink
    }
}
