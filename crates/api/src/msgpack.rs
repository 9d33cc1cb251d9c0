//! Framed msgpack TCP ingest
//!
//! Producers that cannot afford JSON post the same logical report as a
//! msgpack map over a raw TCP socket, one report per length-prefixed frame:
//!
//! ```text
//! [u32_be frame_len][msgpack map: {"key": apikey, "/path": {message}, ...}]
//! ```
//!
//! Msgpack binary strings (uint8 arrays) decode as strings, since several
//! producer runtimes pack text that way. Each connection gets its own task;
//! a malformed frame closes that connection only.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use arcus_archiver::Archiver;
use arcus_protocol::{MessageMap, SmapMessage};

use crate::error::ApiError;

/// Maximum accepted frame size (16MB)
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Serve msgpack ingest on an already-bound listener. Runs until the
/// listener errors.
pub async fn serve(archiver: Arc<Archiver>, listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(peer = %peer, "msgpack producer connected");
        let archiver = Arc::clone(&archiver);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(archiver, socket).await {
                debug!(peer = %peer, error = %e, "msgpack connection ended");
            }
        });
    }
}

async fn serve_connection(archiver: Arc<Archiver>, mut socket: TcpStream) -> std::io::Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        if let Err(e) = socket.read_exact(&mut len_buf).await {
            return if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Ok(())
            } else {
                Err(e)
            };
        }
        let frame_len = u32::from_be_bytes(len_buf);
        if frame_len == 0 || frame_len > MAX_FRAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("msgpack frame length {frame_len} out of range"),
            ));
        }
        let mut frame = vec![0u8; frame_len as usize];
        socket.read_exact(&mut frame).await?;

        match decode_report(&frame) {
            Ok((apikey, messages)) => {
                if let Err(e) = archiver.add_data(messages, &apikey).await {
                    warn!(error = %e, "msgpack ingest rejected");
                }
            }
            Err(e) => {
                warn!(error = %e, "malformed msgpack frame");
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                ));
            }
        }
    }
}

/// Decode one frame into `(apikey, messages)`
pub fn decode_report(frame: &[u8]) -> Result<(String, MessageMap), ApiError> {
    let mut cursor = frame;
    let raw = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| ApiError::bad_request(format!("msgpack decode: {e}")))?;
    let value = to_json(raw);

    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(ApiError::bad_request(format!(
                "msgpack report must be a map, got {other}"
            )))
        }
    };

    let mut apikey = String::new();
    let mut messages = MessageMap::new();
    for (key, entry) in map {
        if key == "key" {
            apikey = entry.as_str().unwrap_or_default().to_string();
            continue;
        }
        if !entry.is_object() {
            continue;
        }
        let mut msg: SmapMessage = serde_json::from_value(entry)
            .map_err(|e| ApiError::bad_request(format!("message at '{key}': {e}")))?;
        if msg.path.is_empty() {
            msg.path = key.clone();
        }
        messages.insert(key, msg);
    }
    Ok((apikey, messages))
}

/// Msgpack to JSON value, decoding binary strings as UTF-8 text
fn to_json(value: rmpv::Value) -> Value {
    match value {
        rmpv::Value::Nil => Value::Null,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => {
            if let Some(n) = i.as_u64() {
                Value::from(n)
            } else if let Some(n) = i.as_i64() {
                Value::from(n)
            } else {
                Value::Null
            }
        }
        rmpv::Value::F32(f) => Value::from(f as f64),
        rmpv::Value::F64(f) => Value::from(f),
        rmpv::Value::String(s) => Value::String(s.into_str().unwrap_or_default()),
        rmpv::Value::Binary(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        rmpv::Value::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        rmpv::Value::Map(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                let key = match k {
                    rmpv::Value::String(s) => s.into_str().unwrap_or_default(),
                    rmpv::Value::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
                    other => other.to_string(),
                };
                map.insert(key, to_json(v));
            }
            Value::Object(map)
        }
        rmpv::Value::Ext(_, _) => Value::Null,
    }
}

#[cfg(test)]
#[path = "msgpack_test.rs"]
mod tests;
