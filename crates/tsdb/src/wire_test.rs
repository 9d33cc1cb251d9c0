//! Tests for the framed wire codec

use super::*;

#[test]
fn test_header_layout_is_big_endian() {
    let frame = encode_readingset(7, &[Reading::new(1000, 3.14)]);
    // u32_be(READINGSET) || u32_be(payload_len)
    assert_eq!(&frame[0..4], &[0, 0, 0, 1]);
    let payload_len = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
    assert_eq!(payload_len as usize, frame.len() - HEADER_LEN);
}

#[test]
fn test_readingset_roundtrip() {
    let readings = vec![Reading::new(1000, 3.14), Reading::new(2000, -1.5)];
    let frame = encode_readingset(42, &readings);
    let header = Header::parse(frame[..HEADER_LEN].try_into().unwrap());
    assert_eq!(header.message_type, READINGSET);

    let (streamid, decoded) = decode_readingset(&frame[HEADER_LEN..]).unwrap();
    assert_eq!(streamid, 42);
    assert_eq!(decoded, readings);
}

#[test]
fn test_readingset_seqnos_are_indices() {
    let frame = encode_readingset(1, &[Reading::new(10, 0.0), Reading::new(20, 0.0)]);
    let body = &frame[HEADER_LEN..];
    // second reading starts at 12 + 24; its seqno field is bytes 8..16 within it
    let second = &body[12 + 24..];
    let seqno = u64::from_be_bytes(second[8..16].try_into().unwrap());
    assert_eq!(seqno, 1);
}

#[test]
fn test_query_roundtrip() {
    let frame = encode_query(9, QueryAction::Range, 900, 1100);
    let header = Header::parse(frame[..HEADER_LEN].try_into().unwrap());
    assert_eq!(header.message_type, QUERY);
    assert_eq!(header.payload_len, 28);

    let q = decode_query(&frame[HEADER_LEN..]).unwrap();
    assert_eq!(q.streamid, 9);
    assert_eq!(q.action, QueryAction::Range);
    assert_eq!(q.start, 900);
    assert_eq!(q.end, 1100);
}

#[test]
fn test_response_roundtrip() {
    let readings = vec![Reading::new(1000, 3.14)];
    let frame = encode_response(0, &readings);
    let decoded = decode_response(&frame[HEADER_LEN..]).unwrap();
    assert_eq!(decoded, readings);
}

#[test]
fn test_response_nonzero_status_is_error() {
    let frame = encode_response(2, &[]);
    match decode_response(&frame[HEADER_LEN..]) {
        Err(TsdbError::Status(2)) => {}
        other => panic!("expected status error, got {other:?}"),
    }
}

#[test]
fn test_truncated_bodies_are_rejected() {
    let frame = encode_readingset(1, &[Reading::new(10, 1.0)]);
    let body = &frame[HEADER_LEN..];
    assert!(decode_readingset(&body[..body.len() - 1]).is_err());

    let frame = encode_query(1, QueryAction::Prev, 5, 10);
    assert!(decode_query(&frame[HEADER_LEN..frame.len() - 1]).is_err());
}

#[test]
fn test_unknown_action_is_rejected() {
    assert!(QueryAction::from_u32(9).is_err());
}
