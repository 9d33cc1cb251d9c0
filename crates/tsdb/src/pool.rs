//! Per-stream connection pool with idle-timeout watchdogs
//!
//! The pool keeps one warm backend socket per active UUID so that a stream's
//! writes ride a single FIFO channel, while bounding idle resources:
//!
//! - First `add` for a UUID dials the backend, registers the connection and
//!   spawns its watchdog before pushing the frame into the inbox.
//! - Each delivery resets the watchdog's idle timer and writes the frame to
//!   the socket. A write error demotes the connection to a re-dial on the
//!   next delivery; it does not evict.
//! - `keepalive` seconds without a delivery evicts: the watchdog takes the
//!   pool lock, removes the entry, drops the socket and exits.
//!
//! Locking: the map mutex serializes insert/delete and is never held across
//! a dial or an inbox send. The inbox is bounded; a full inbox blocks the
//! calling task (backpressure), which is the only suspension point on the
//! write hot path. Each socket is written only by its watchdog.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Result;

/// How a pool obtains backend sockets
#[async_trait]
pub trait Dial: Send + Sync + 'static {
    /// Open a fresh connection to the backend
    async fn dial(&self) -> std::io::Result<TcpStream>;
}

/// Dials a fixed `host:port`
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    /// Create a dialer for `addr`
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Dial for TcpDialer {
    async fn dial(&self) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        stream.set_linger(None)?;
        Ok(stream)
    }
}

struct PoolEntry {
    inbox: mpsc::Sender<Bytes>,
}

/// UUID to warm write connection
pub struct ConnectionMap {
    streams: Mutex<HashMap<String, PoolEntry>>,
    dialer: Arc<dyn Dial>,
    keepalive: Duration,
    inbox_capacity: usize,
}

impl ConnectionMap {
    /// Create a pool. `keepalive` is the idle lifetime of a connection;
    /// `inbox_capacity` bounds each per-stream write queue.
    pub fn new(dialer: Arc<dyn Dial>, keepalive: Duration, inbox_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(HashMap::new()),
            dialer,
            keepalive,
            inbox_capacity: inbox_capacity.max(1),
        })
    }

    /// Number of live connections
    pub fn live_connections(&self) -> usize {
        self.streams.lock().len()
    }

    /// Queue `frame` for the stream's connection, creating it on first
    /// sight. Blocks only when the stream's inbox is full. Dial failure for
    /// a new stream surfaces to this call and leaves no entry behind.
    pub async fn add(self: &Arc<Self>, uuid: &str, frame: Bytes) -> Result<()> {
        loop {
            let inbox = match self.existing_inbox(uuid) {
                Some(inbox) => inbox,
                None => self.connect(uuid).await?,
            };
            match inbox.send(frame.clone()).await {
                Ok(()) => return Ok(()),
                Err(_) => {
                    // Lost a race with the watchdog's idle eviction between
                    // lookup and send; clear the stale entry and retry.
                    let mut streams = self.streams.lock();
                    if let Some(entry) = streams.get(uuid) {
                        if entry.inbox.same_channel(&inbox) {
                            streams.remove(uuid);
                        }
                    }
                }
            }
        }
    }

    fn existing_inbox(&self, uuid: &str) -> Option<mpsc::Sender<Bytes>> {
        self.streams.lock().get(uuid).map(|e| e.inbox.clone())
    }

    /// Dial and register a connection for `uuid`, spawning its watchdog.
    /// If another task won the race while we were dialing, its connection is
    /// used and ours is dropped.
    async fn connect(self: &Arc<Self>, uuid: &str) -> Result<mpsc::Sender<Bytes>> {
        let socket = self.dialer.dial().await?;
        let mut streams = self.streams.lock();
        if let Some(entry) = streams.get(uuid) {
            return Ok(entry.inbox.clone());
        }
        debug!(uuid = %uuid, "new tsdb connection");
        let (inbox, deliveries) = mpsc::channel(self.inbox_capacity);
        streams.insert(
            uuid.to_string(),
            PoolEntry {
                inbox: inbox.clone(),
            },
        );
        tokio::spawn(Arc::clone(self).watchdog(uuid.to_string(), socket, deliveries));
        Ok(inbox)
    }

    /// One watchdog per pooled UUID: writes every delivery to the socket and
    /// evicts itself after `keepalive` of silence.
    async fn watchdog(
        self: Arc<Self>,
        uuid: String,
        socket: TcpStream,
        mut deliveries: mpsc::Receiver<Bytes>,
    ) {
        let mut socket = Some(socket);
        loop {
            match tokio::time::timeout(self.keepalive, deliveries.recv()).await {
                Ok(Some(frame)) => {
                    if socket.is_none() {
                        match self.dialer.dial().await {
                            Ok(s) => socket = Some(s),
                            Err(e) => {
                                warn!(uuid = %uuid, error = %e, "tsdb re-dial failed, dropping frame");
                                continue;
                            }
                        }
                    }
                    if let Some(ref mut s) = socket {
                        if let Err(e) = s.write_all(&frame).await {
                            warn!(uuid = %uuid, error = %e, "tsdb write failed, will re-dial");
                            socket = None;
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(uuid = %uuid, "tsdb connection idle, evicting");
                    self.streams.lock().remove(&uuid);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
