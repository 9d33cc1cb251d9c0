//! JSON-frame backend
//!
//! Honors the same gateway contract as the reference backend over
//! newline-delimited JSON, one object per frame:
//!
//! ```text
//! {"op":"insert","streamid":7,"readings":[[1000,3.14]]}
//! {"op":"query","streamid":7,"action":"range","start":900,"end":1100,"limit":-1}
//! {"status":0,"readings":[[1000,3.14]]}
//! ```
//!
//! Writes share the per-stream connection pool; reads use a buffered
//! request/response connection.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::warn;

use arcus_metastore::MetaStore;
use arcus_protocol::{Reading, SmapReading, SmapResponse};

use crate::pool::{ConnectionMap, TcpDialer};
use crate::{Result, Tsdb, TsdbError};

/// The JSON-frame backend
pub struct Quasar {
    addr: String,
    pool: Arc<ConnectionMap>,
    read_conn: Mutex<Option<BufStream<TcpStream>>>,
    store: OnceLock<Arc<MetaStore>>,
}

impl Quasar {
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

    /// Startup reachability check
    pub async fn ping(&self) -> Result<()> {
        TcpStream::connect(&self.addr).await?;
        Ok(())
    }

    fn store(&self) -> Result<&Arc<MetaStore>> {
        self.store.get().ok_or(TsdbError::NoStore)
    }

    async fn query_points(
        &self,
        streamid: u32,
        action: &str,
        start: u64,
        end: u64,
        limit: i32,
    ) -> Result<Vec<Reading>> {
        let mut request = serde_json::to_vec(&json!({
            "op": "query",
            "streamid": streamid,
            "action": action,
            "start": start,
            "end": end,
            "limit": limit,
        }))?;
        request.push(b'\n');

        let mut conn = self.read_conn.lock().await;
        let mut redialed = false;
        loop {
            if conn.is_none() {
                *conn = Some(BufStream::new(TcpStream::connect(&self.addr).await?));
            }
            let socket = conn.as_mut().ok_or(TsdbError::frame("no read connection"))?;
            match round_trip(socket, &request).await {
                Ok(points) => return Ok(points),
                Err(TsdbError::Io(e)) if !redialed => {
                    warn!(error = %e, "quasar read connection failed, re-dialing");
                    *conn = None;
                    redialed = true;
                }
                Err(e) => {
                    *conn = None;
                    return Err(e);
                }
            }
        }
    }

    async fn gather(
        &self,
        uuids: &[String],
        action: &str,
        start: u64,
        end: u64,
        limit: i32,
    ) -> Result<Vec<SmapResponse>> {
        let store = self.store()?;
        let mut responses = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            let streamid = store.get_stream_id(uuid).await?;
            let readings = self.query_points(streamid, action, start, end, limit).await?;
            responses.push(SmapResponse::new(uuid.clone(), readings));
        }
        Ok(responses)
    }
}

async fn round_trip(socket: &mut BufStream<TcpStream>, request: &[u8]) -> Result<Vec<Reading>> {
    socket.write_all(request).await?;
    socket.flush().await?;

    let mut line = String::new();
    let n = socket.read_line(&mut line).await?;
    if n == 0 {
        return Err(TsdbError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "quasar closed the read connection",
        )));
    }
    let reply: serde_json::Value = serde_json::from_str(line.trim_end())?;
    let status = reply
        .get("status")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| TsdbError::frame("quasar reply without status"))?;
    if status != 0 {
        return Err(TsdbError::Status(status as u32));
    }
    let readings = reply
        .get("readings")
        .cloned()
        .unwrap_or_else(|| json!([]));
    Ok(serde_json::from_value(readings)?)
}

#[async_trait]
impl Tsdb for Quasar {
    async fn add(&self, reading: &SmapReading) -> Result<()> {
        if reading.readings.is_empty() {
            return Ok(());
        }
        let streamid = self.store()?.get_stream_id(&reading.uuid).await?;
        let mut frame = serde_json::to_vec(&json!({
            "op": "insert",
            "streamid": streamid,
            "readings": reading.readings,
        }))?;
        frame.push(b'\n');
        self.pool.add(&reading.uuid, Bytes::from(frame)).await
    }

    async fn get_data(
        &self,
        uuids: &[String],
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Vec<SmapResponse>> {
        self.gather(uuids, "range", start_ms, end_ms, -1).await
    }

    async fn prev(&self, uuids: &[String], ref_ms: u64, limit: i32) -> Result<Vec<SmapResponse>> {
        self.gather(uuids, "prev", ref_ms, 0, limit).await
    }

    async fn next(&self, uuids: &[String], ref_ms: u64, limit: i32) -> Result<Vec<SmapResponse>> {
        self.gather(uuids, "next", ref_ms, 0, limit).await
    }

    fn live_connections(&self) -> usize {
        self.pool.live_connections()
    }

    fn attach_store(&self, store: Arc<MetaStore>) {
        let _ = self.store.set(store);
    }
}
