//! Tests for msgpack report decoding

use super::*;
use rmpv::Value as Mp;

fn frame(value: &Mp) -> Vec<u8> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).unwrap();
    buf
}

fn report() -> Mp {
    Mp::Map(vec![
        (Mp::from("key"), Mp::from("K")),
        (
            Mp::from("/sensor"),
            Mp::Map(vec![
                (Mp::from("UUID"), Mp::from("u1")),
                (
                    Mp::from("Readings"),
                    Mp::Array(vec![Mp::Array(vec![Mp::from(1000u64), Mp::F64(3.14)])]),
                ),
            ]),
        ),
    ])
}

#[test]
fn test_decode_report() {
    let (apikey, messages) = decode_report(&frame(&report())).unwrap();
    assert_eq!(apikey, "K");
    assert_eq!(messages.len(), 1);
    let msg = &messages["/sensor"];
    assert_eq!(msg.uuid, "u1");
    assert_eq!(msg.path, "/sensor");
    assert_eq!(msg.readings.len(), 1);
    assert_eq!(msg.readings[0].timestamp_ms, 1000);
}

#[test]
fn test_binary_strings_decode_as_text() {
    let value = Mp::Map(vec![
        (Mp::Binary(b"key".to_vec()), Mp::Binary(b"K".to_vec())),
        (
            Mp::Binary(b"/sensor".to_vec()),
            Mp::Map(vec![(Mp::Binary(b"UUID".to_vec()), Mp::Binary(b"u1".to_vec()))]),
        ),
    ]);
    let (apikey, messages) = decode_report(&frame(&value)).unwrap();
    assert_eq!(apikey, "K");
    assert_eq!(messages["/sensor"].uuid, "u1");
}

#[test]
fn test_non_map_report_rejected() {
    assert!(decode_report(&frame(&Mp::from(42))).is_err());
}

#[test]
fn test_truncated_frame_rejected() {
    let bytes = frame(&report());
    assert!(decode_report(&bytes[..bytes.len() - 2]).is_err());
}
