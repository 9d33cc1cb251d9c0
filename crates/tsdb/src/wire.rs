//! Framed binary wire protocol of the reference backend
//!
//! Every message is an 8-byte header followed by a length-delimited body:
//!
//! ```text
//! [u32_be message_type][u32_be payload_len][payload]
//! ```
//!
//! Bodies are fixed-width big-endian, parsed directly off the buffer:
//!
//! ```text
//! READINGSET:  u32 streamid, u32 substream, u32 count,
//!              count x (u64 timestamp_ms, u64 seqno, f64 value)
//! QUERY:       u32 streamid, u32 substream, u64 start, u64 end, u32 action
//! RESPONSE:    u32 status, u32 count, count x (u64 timestamp_ms, f64 value)
//! ```
//!
//! For `Prev`/`Next` queries `start` carries the reference timestamp and
//! `end` the per-stream point limit (`u64::MAX` when unlimited). Substream is
//! fixed at 0. A non-zero RESPONSE status aborts the request.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use arcus_protocol::Reading;

use crate::{Result, TsdbError};

/// Write batch, stream to backend
pub const READINGSET: u32 = 1;
/// Read request
pub const QUERY: u32 = 2;
/// Read reply
pub const RESPONSE: u32 = 3;

/// The only substream the archiver uses
pub const SUBSTREAM: u32 = 0;

/// Header size on the wire
pub const HEADER_LEN: usize = 8;

/// Point limit encoding for "no limit"
pub const NO_POINT_LIMIT: u64 = u64::MAX;

/// What a QUERY asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QueryAction {
    /// All points in `[start, end]`
    Range = 1,
    /// Last `limit` points at or before the reference
    Prev = 2,
    /// First `limit` points at or after the reference
    Next = 3,
}

impl QueryAction {
    /// Decode an action field
    pub fn from_u32(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(Self::Range),
            2 => Ok(Self::Prev),
            3 => Ok(Self::Next),
            other => Err(TsdbError::frame(format!("unknown query action {other}"))),
        }
    }
}

/// A decoded header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// READINGSET, QUERY or RESPONSE
    pub message_type: u32,
    /// Body length in bytes
    pub payload_len: u32,
}

impl Header {
    /// Parse the 8 header bytes
    pub fn parse(raw: &[u8; HEADER_LEN]) -> Self {
        let mut buf = &raw[..];
        Self {
            message_type: buf.get_u32(),
            payload_len: buf.get_u32(),
        }
    }
}

fn frame(message_type: u32, body: BytesMut) -> Bytes {
    let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
    out.put_u32(message_type);
    out.put_u32(body.len() as u32);
    out.extend_from_slice(&body);
    out.freeze()
}

/// Encode a write batch for one stream. Seqnos are the reading's index
/// within the batch.
pub fn encode_readingset(streamid: u32, readings: &[Reading]) -> Bytes {
    let mut body = BytesMut::with_capacity(12 + readings.len() * 24);
    body.put_u32(streamid);
    body.put_u32(SUBSTREAM);
    body.put_u32(readings.len() as u32);
    for (seqno, r) in readings.iter().enumerate() {
        body.put_u64(r.timestamp_ms);
        body.put_u64(seqno as u64);
        body.put_f64(r.value);
    }
    frame(READINGSET, body)
}

/// Decode a READINGSET body into `(streamid, readings)`
pub fn decode_readingset(body: &[u8]) -> Result<(u32, Vec<Reading>)> {
    let mut buf = body;
    if buf.remaining() < 12 {
        return Err(TsdbError::frame("readingset body shorter than header"));
    }
    let streamid = buf.get_u32();
    let _substream = buf.get_u32();
    let count = buf.get_u32() as usize;
    if buf.remaining() != count * 24 {
        return Err(TsdbError::frame(format!(
            "readingset body wrong length for {count} readings"
        )));
    }
    let mut readings = Vec::with_capacity(count);
    for _ in 0..count {
        let timestamp_ms = buf.get_u64();
        let _seqno = buf.get_u64();
        let value = buf.get_f64();
        readings.push(Reading {
            timestamp_ms,
            value,
        });
    }
    Ok((streamid, readings))
}

/// Encode a read request
pub fn encode_query(streamid: u32, action: QueryAction, start: u64, end: u64) -> Bytes {
    let mut body = BytesMut::with_capacity(28);
    body.put_u32(streamid);
    body.put_u32(SUBSTREAM);
    body.put_u64(start);
    body.put_u64(end);
    body.put_u32(action as u32);
    frame(QUERY, body)
}

/// A decoded read request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryFrame {
    pub streamid: u32,
    pub start: u64,
    pub end: u64,
    pub action: QueryAction,
}

/// Decode a QUERY body
pub fn decode_query(body: &[u8]) -> Result<QueryFrame> {
    let mut buf = body;
    if buf.remaining() != 28 {
        return Err(TsdbError::frame("query body must be 28 bytes"));
    }
    let streamid = buf.get_u32();
    let _substream = buf.get_u32();
    let start = buf.get_u64();
    let end = buf.get_u64();
    let action = QueryAction::from_u32(buf.get_u32())?;
    Ok(QueryFrame {
        streamid,
        start,
        end,
        action,
    })
}

/// Encode a read reply
pub fn encode_response(status: u32, readings: &[Reading]) -> Bytes {
    let mut body = BytesMut::with_capacity(8 + readings.len() * 16);
    body.put_u32(status);
    body.put_u32(readings.len() as u32);
    for r in readings {
        body.put_u64(r.timestamp_ms);
        body.put_f64(r.value);
    }
    frame(RESPONSE, body)
}

/// Decode a RESPONSE body. A non-zero status is an error; the points are
/// never partially returned.
pub fn decode_response(body: &[u8]) -> Result<Vec<Reading>> {
    let mut buf = body;
    if buf.remaining() < 8 {
        return Err(TsdbError::frame("response body shorter than header"));
    }
    let status = buf.get_u32();
    if status != 0 {
        return Err(TsdbError::Status(status));
    }
    let count = buf.get_u32() as usize;
    if buf.remaining() != count * 16 {
        return Err(TsdbError::frame(format!(
            "response body wrong length for {count} points"
        )));
    }
    let mut readings = Vec::with_capacity(count);
    for _ in 0..count {
        let timestamp_ms = buf.get_u64();
        let value = buf.get_f64();
        readings.push(Reading {
            timestamp_ms,
            value,
        });
    }
    Ok(readings)
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod tests;
