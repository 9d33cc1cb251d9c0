//! Time-series gateway for the arcus archiver
//!
//! The gateway translates the archiver's reading model to an external TSDB.
//! Writes flow through a per-stream [`ConnectionMap`]: one warm socket per
//! active UUID, fed by a bounded inbox and owned by a watchdog task that
//! evicts the connection after `keepalive` seconds of silence. Reads use a
//! separate on-demand connection, since they are request/response and gain
//! nothing from per-UUID channels.
//!
//! Two backends honor the [`Tsdb`] contract: [`ReadingDb`] (the reference
//! framed binary protocol, see `wire`) and [`Quasar`] (newline-delimited JSON
//! frames). Selection is one-shot at construction via [`TsdbKind`].

pub mod pool;
pub mod testing;
pub mod wire;
mod error;
mod quasar;
mod readingdb;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use arcus_metastore::MetaStore;
use arcus_protocol::{SmapReading, SmapResponse};

pub use error::TsdbError;
pub use pool::{ConnectionMap, Dial, TcpDialer};
pub use quasar::Quasar;
pub use readingdb::ReadingDb;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, TsdbError>;

/// Default idle lifetime of a pooled write connection, in seconds
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Default capacity of each per-stream write inbox
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// The interface the archiver programs against
#[async_trait]
pub trait Tsdb: Send + Sync {
    /// Commit one stream's readings. Suspends only on the bounded inbox when
    /// the stream's watchdog falls behind (backpressure); a dial failure for
    /// a brand-new stream surfaces here.
    async fn add(&self, reading: &SmapReading) -> Result<()>;

    /// All points in `[start_ms, end_ms]` for each UUID. An error on any
    /// stream aborts the batch; partial responses are never returned.
    async fn get_data(
        &self,
        uuids: &[String],
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Vec<SmapResponse>>;

    /// Up to `limit` points at or before `ref_ms` per UUID (negative limit =
    /// unlimited)
    async fn prev(&self, uuids: &[String], ref_ms: u64, limit: i32) -> Result<Vec<SmapResponse>>;

    /// Up to `limit` points at or after `ref_ms` per UUID (negative limit =
    /// unlimited)
    async fn next(&self, uuids: &[String], ref_ms: u64, limit: i32) -> Result<Vec<SmapResponse>>;

    /// Number of live pooled write connections
    fn live_connections(&self) -> usize;

    /// Give the gateway its UUID-to-StreamId resolver. Must be called once
    /// before any data flows.
    fn attach_store(&self, store: Arc<MetaStore>);
}

/// Which backend to speak to. Selection is one-shot at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsdbKind {
    /// Framed binary reference backend
    ReadingDb,
    /// JSON-frame backend
    Quasar,
}

impl FromStr for TsdbKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "readingdb" => Ok(Self::ReadingDb),
            "quasar" => Ok(Self::Quasar),
            other => Err(format!("'{other}' is not a valid timeseries database")),
        }
    }
}
