//! In-process mock TSDB server for tests
//!
//! Speaks the reference wire protocol over a loopback listener and stores
//! readings per StreamId in memory. Crates downstream use it to exercise the
//! full write and read paths without a real backend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use arcus_protocol::Reading;

use crate::wire::{self, Header, QueryAction, HEADER_LEN, QUERY, READINGSET};

/// A loopback server honoring the reference wire protocol
pub struct MockTsdbServer {
    addr: String,
    streams: Arc<Mutex<HashMap<u32, Vec<Reading>>>>,
    accept_task: JoinHandle<()>,
}

impl MockTsdbServer {
    /// Bind on an ephemeral loopback port and start serving
    pub async fn spawn() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        let streams: Arc<Mutex<HashMap<u32, Vec<Reading>>>> = Arc::new(Mutex::new(HashMap::new()));

        let accept_streams = Arc::clone(&streams);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        tokio::spawn(serve_connection(socket, Arc::clone(&accept_streams)));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            addr,
            streams,
            accept_task,
        })
    }

    /// `host:port` the server listens on
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Readings stored for a stream, in arrival order
    pub fn readings(&self, streamid: u32) -> Vec<Reading> {
        self.streams
            .lock()
            .get(&streamid)
            .cloned()
            .unwrap_or_default()
    }

    /// Total readings stored across all streams
    pub fn total_readings(&self) -> usize {
        self.streams.lock().values().map(Vec::len).sum()
    }
}

impl Drop for MockTsdbServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_connection(mut socket: TcpStream, streams: Arc<Mutex<HashMap<u32, Vec<Reading>>>>) {
    loop {
        let mut header = [0u8; HEADER_LEN];
        if socket.read_exact(&mut header).await.is_err() {
            return;
        }
        let header = Header::parse(&header);
        let mut body = vec![0u8; header.payload_len as usize];
        if socket.read_exact(&mut body).await.is_err() {
            return;
        }

        match header.message_type {
            READINGSET => {
                if let Ok((streamid, readings)) = wire::decode_readingset(&body) {
                    let mut streams = streams.lock();
                    let points = streams.entry(streamid).or_default();
                    points.extend(readings);
                    points.sort_by_key(|r| r.timestamp_ms);
                }
            }
            QUERY => {
                let reply = match wire::decode_query(&body) {
                    Ok(q) => {
                        let points = select_points(&streams, q.streamid, q.action, q.start, q.end);
                        wire::encode_response(0, &points)
                    }
                    Err(_) => wire::encode_response(1, &[]),
                };
                if socket.write_all(&reply).await.is_err() {
                    return;
                }
            }
            _ => return,
        }
    }
}

fn select_points(
    streams: &Mutex<HashMap<u32, Vec<Reading>>>,
    streamid: u32,
    action: QueryAction,
    start: u64,
    end: u64,
) -> Vec<Reading> {
    let streams = streams.lock();
    let points = match streams.get(&streamid) {
        Some(p) => p,
        None => return Vec::new(),
    };
    match action {
        QueryAction::Range => points
            .iter()
            .filter(|r| r.timestamp_ms >= start && r.timestamp_ms <= end)
            .copied()
            .collect(),
        QueryAction::Prev => {
            let limit = end.min(usize::MAX as u64) as usize;
            let before: Vec<Reading> = points
                .iter()
                .filter(|r| r.timestamp_ms <= start)
                .copied()
                .collect();
            let skip = before.len().saturating_sub(limit);
            before.into_iter().skip(skip).collect()
        }
        QueryAction::Next => {
            let limit = end.min(usize::MAX as u64) as usize;
            points
                .iter()
                .filter(|r| r.timestamp_ms >= start)
                .take(limit)
                .copied()
                .collect()
        }
    }
}
