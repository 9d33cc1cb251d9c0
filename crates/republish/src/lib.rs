//! Live republish dispatcher for the arcus archiver
//!
//! Consumers subscribe with a metadata predicate; every reading the archiver
//! ingests afterwards is matched against the standing predicates and fanned
//! out to the subscribers it satisfies.
//!
//! ```text
//! Archiver.add_data()
//!     │
//!     ├──► MetaStore / TSDB
//!     │
//!     └──► Republisher.republish(msg)
//!               │  uuid fast path ∪ predicate match
//!               ▼
//!          Subscriptions (per-subscriber bounded queues)
//!               │
//!               ▼
//!          SubscriberSink (HTTP chunked stream, test channel, ...)
//! ```
//!
//! Semantics: at-most-once, forward-only from the moment of registration;
//! ordering is preserved per (publisher, subscriber); a slow subscriber only
//! loses its own messages. The matching UUID set is resolved once at
//! subscription time; post-hoc additions are opt-in via
//! `resubscribe_on_metadata_match`.

mod error;
mod republisher;
mod sink;
mod subscription;

pub use error::RepublishError;
pub use republisher::{Republisher, RepublisherConfig};
pub use sink::{ChannelSink, Delivery, SubscriberSink};
pub use subscription::Subscription;

/// Result type for republish operations
pub type Result<T> = std::result::Result<T, RepublishError>;
