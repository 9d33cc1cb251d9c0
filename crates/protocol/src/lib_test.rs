//! Tests for the core data model

use super::*;
use serde_json::json;

#[test]
fn test_prefixes_of_nested_path() {
    assert_eq!(get_prefixes("/a/b/c"), vec!["/", "/a", "/a/b"]);
}

#[test]
fn test_prefixes_of_shallow_path() {
    assert_eq!(get_prefixes("/sensor"), vec!["/"]);
}

#[test]
fn test_prefixes_of_root() {
    assert!(get_prefixes("/").is_empty());
}

#[test]
fn test_prefixes_ignore_trailing_slash() {
    assert_eq!(get_prefixes("/a/b/"), vec!["/", "/a"]);
}

#[test]
fn test_reading_serializes_as_pair() {
    let r = Reading::new(1000, 3.14);
    assert_eq!(serde_json::to_string(&r).unwrap(), "[1000,3.14]");
}

#[test]
fn test_reading_roundtrip() {
    let r: Reading = serde_json::from_str("[1000, 3.14]").unwrap();
    assert_eq!(r, Reading::new(1000, 3.14));
}

#[test]
fn test_reading_rejects_short_array() {
    let r: std::result::Result<Reading, _> = serde_json::from_str("[1000]");
    assert!(r.is_err());
}

#[test]
fn test_message_decodes_smap_report() {
    let raw = json!({
        "Path": "/sensor",
        "UUID": "u1",
        "Metadata": {"Location": "lab"},
        "Readings": [[1000, 3.14]]
    });
    let msg: SmapMessage = serde_json::from_value(raw).unwrap();
    assert_eq!(msg.path, "/sensor");
    assert_eq!(msg.uuid, "u1");
    assert_eq!(msg.readings, vec![Reading::new(1000, 3.14)]);
    assert!(!msg.is_inner_node());
}

#[test]
fn test_inner_node_detection() {
    let raw = json!({
        "Contents": ["sensor"],
        "Metadata": {"Location": "lab"},
        "UUID": "root-uuid"
    });
    let msg: SmapMessage = serde_json::from_value(raw).unwrap();
    assert!(msg.is_inner_node());
}

#[test]
fn test_flat_tags_use_dotted_keys() {
    let raw = json!({
        "Path": "/sensor",
        "UUID": "u1",
        "Metadata": {"Location": "lab"},
        "Properties": {"UnitofMeasure": "kW"}
    });
    let msg: SmapMessage = serde_json::from_value(raw).unwrap();
    let tags = msg.flat_tags();
    assert_eq!(tags["Metadata.Location"], json!("lab"));
    assert_eq!(tags["Properties.UnitofMeasure"], json!("kW"));
    assert_eq!(tags["uuid"], json!("u1"));
    assert_eq!(tags["Path"], json!("/sensor"));
}

#[test]
fn test_response_wire_shape() {
    let resp = SmapResponse::new("u1", vec![Reading::new(1000, 3.14)]);
    let encoded = serde_json::to_value(&resp).unwrap();
    assert_eq!(encoded, json!({"UUID": "u1", "Readings": [[1000, 3.14]]}));
}
