//! Reference framed-binary backend
//!
//! Writes fan out through the per-stream pool; reads use a single on-demand
//! request/response connection guarded by an async mutex, re-dialed on
//! error. Responses either carry every point in the window or the whole
//! request fails.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use arcus_metastore::MetaStore;
use arcus_protocol::{Reading, SmapReading, SmapResponse};

use crate::pool::{ConnectionMap, TcpDialer};
use crate::wire::{self, Header, QueryAction, HEADER_LEN, NO_POINT_LIMIT, RESPONSE};
use crate::{Result, Tsdb, TsdbError};

/// The framed-binary reference backend
pub struct ReadingDb {
    addr: String,
    pool: Arc<ConnectionMap>,
    read_conn: Mutex<Option<TcpStream>>,
    store: OnceLock<Arc<MetaStore>>,
}

impl ReadingDb {
    /// Create a gateway to the backend at `addr` (`host:port`)
    pub fn new(addr: impl Into<String>, keepalive_secs: u64, inbox_capacity: usize) -> Self {
        let addr = addr.into();
        let dialer = Arc::new(TcpDialer::new(addr.clone()));
        Self {
            addr,
            pool: ConnectionMap::new(dialer, Duration::from_secs(keepalive_secs), inbox_capacity),
            read_conn: Mutex::new(None),
            store: OnceLock::new(),
        }
    }

    /// Startup reachability check: dial once and drop. Failure here should
    /// abort process init.
    pub async fn ping(&self) -> Result<()> {
        TcpStream::connect(&self.addr).await?;
        debug!(addr = %self.addr, "tsdb reachable");
        Ok(())
    }

    fn store(&self) -> Result<&Arc<MetaStore>> {
        self.store.get().ok_or(TsdbError::NoStore)
    }

    /// One request/response round-trip on the read connection. Retries once
    /// through a re-dial, since the previous response may have left a dead
    /// socket behind.
    async fn query_points(
        &self,
        streamid: u32,
        action: QueryAction,
        start: u64,
        end: u64,
    ) -> Result<Vec<Reading>> {
        let frame = wire::encode_query(streamid, action, start, end);
        let mut conn = self.read_conn.lock().await;
        let mut redialed = false;
        loop {
            if conn.is_none() {
                *conn = Some(TcpStream::connect(&self.addr).await?);
            }
            let socket = conn.as_mut().ok_or(TsdbError::frame("no read connection"))?;
            match round_trip(socket, &frame).await {
                Ok(points) => return Ok(points),
                Err(TsdbError::Io(e)) if !redialed => {
                    warn!(error = %e, "tsdb read connection failed, re-dialing");
                    *conn = None;
                    redialed = true;
                }
                Err(e) => {
                    if matches!(e, TsdbError::Io(_) | TsdbError::Frame(_)) {
                        *conn = None;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn gather(
        &self,
        uuids: &[String],
        action: QueryAction,
        start: u64,
        end: u64,
    ) -> Result<Vec<SmapResponse>> {
        let store = self.store()?;
        let mut responses = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            let streamid = store.get_stream_id(uuid).await?;
            let readings = self.query_points(streamid, action, start, end).await?;
            responses.push(SmapResponse::new(uuid.clone(), readings));
        }
        Ok(responses)
    }
}

async fn round_trip(socket: &mut TcpStream, frame: &[u8]) -> Result<Vec<Reading>> {
    socket.write_all(frame).await?;

    let mut header = [0u8; HEADER_LEN];
    socket.read_exact(&mut header).await?;
    let header = Header::parse(&header);
    if header.message_type != RESPONSE {
        return Err(TsdbError::frame(format!(
            "expected response frame, got type {}",
            header.message_type
        )));
    }
    let mut body = vec![0u8; header.payload_len as usize];
    socket.read_exact(&mut body).await?;
    wire::decode_response(&body)
}

fn limit_field(limit: i32) -> u64 {
    if limit < 0 {
        NO_POINT_LIMIT
    } else {
        limit as u64
    }
}

#[async_trait]
impl Tsdb for ReadingDb {
    async fn add(&self, reading: &SmapReading) -> Result<()> {
        if reading.readings.is_empty() {
            return Ok(());
        }
        let streamid = self.store()?.get_stream_id(&reading.uuid).await?;
        let frame = wire::encode_readingset(streamid, &reading.readings);
        self.pool.add(&reading.uuid, frame).await
    }

    async fn get_data(
        &self,
        uuids: &[String],
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Vec<SmapResponse>> {
        self.gather(uuids, QueryAction::Range, start_ms, end_ms).await
    }

    async fn prev(&self, uuids: &[String], ref_ms: u64, limit: i32) -> Result<Vec<SmapResponse>> {
        self.gather(uuids, QueryAction::Prev, ref_ms, limit_field(limit))
            .await
    }

    async fn next(&self, uuids: &[String], ref_ms: u64, limit: i32) -> Result<Vec<SmapResponse>> {
        self.gather(uuids, QueryAction::Next, ref_ms, limit_field(limit))
            .await
    }

    fn live_connections(&self) -> usize {
        self.pool.live_connections()
    }

    fn attach_store(&self, store: Arc<MetaStore>) {
        let _ = self.store.set(store);
    }
}

#[cfg(test)]
#[path = "readingdb_test.rs"]
mod tests;
