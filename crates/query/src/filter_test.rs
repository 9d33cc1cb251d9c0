//! Tests for reference filter evaluation

use super::*;
use crate::predicate::{Operator, Predicate};
use serde_json::{json, Map, Value};

fn doc(v: Value) -> Map<String, Value> {
    v.as_object().unwrap().clone()
}

#[test]
fn test_plain_equality() {
    let filter = Predicate::eq("Metadata.Location", "lab").compile();
    assert!(matches(&filter, &doc(json!({"Metadata.Location": "lab"}))));
    assert!(!matches(&filter, &doc(json!({"Metadata.Location": "roof"}))));
    assert!(!matches(&filter, &doc(json!({}))));
}

#[test]
fn test_numeric_equality_coerces() {
    let filter = Predicate::eq("Properties.Scale", 3).compile();
    assert!(matches(&filter, &doc(json!({"Properties.Scale": 3.0}))));
}

#[test]
fn test_ne_matches_absent_field() {
    let p = Predicate::Cmp {
        tag: "Metadata.Location".into(),
        op: Operator::Ne,
        value: json!("lab"),
    };
    let filter = p.compile();
    assert!(matches(&filter, &doc(json!({"Metadata.Location": "roof"}))));
    assert!(matches(&filter, &doc(json!({}))));
    assert!(!matches(&filter, &doc(json!({"Metadata.Location": "lab"}))));
}

#[test]
fn test_exists() {
    let filter = Predicate::has("Actuator").compile();
    assert!(matches(&filter, &doc(json!({"Actuator": {"Model": "relay"}}))));
    assert!(!matches(&filter, &doc(json!({"uuid": "u1"}))));
}

#[test]
fn test_like_wildcard() {
    let p = Predicate::Cmp {
        tag: "Path".into(),
        op: Operator::Like,
        value: json!("/b7/%"),
    };
    let filter = p.compile();
    assert!(matches(&filter, &doc(json!({"Path": "/b7/hvac/power"}))));
    assert!(!matches(&filter, &doc(json!({"Path": "/b8/hvac/power"}))));
}

#[test]
fn test_implicit_and_of_top_level_keys() {
    let filter = doc(json!({"uuid": "u1", "Metadata.Location": "lab"}));
    assert!(matches(
        &filter,
        &doc(json!({"uuid": "u1", "Metadata.Location": "lab"}))
    ));
    assert!(!matches(&filter, &doc(json!({"uuid": "u1"}))));
}

#[test]
fn test_or_combinator() {
    let p = Predicate::Or(vec![
        Predicate::eq("uuid", "u1"),
        Predicate::eq("uuid", "u2"),
    ]);
    let filter = p.compile();
    assert!(matches(&filter, &doc(json!({"uuid": "u2"}))));
    assert!(!matches(&filter, &doc(json!({"uuid": "u3"}))));
}

#[test]
fn test_not_combinator() {
    let p = Predicate::Not(Box::new(Predicate::eq("uuid", "u1")));
    let filter = p.compile();
    assert!(matches(&filter, &doc(json!({"uuid": "u2"}))));
    assert!(!matches(&filter, &doc(json!({"uuid": "u1"}))));
}

#[test]
fn test_nested_combinators() {
    let p = Predicate::And(vec![
        Predicate::eq("Metadata.Location", "lab"),
        Predicate::Not(Box::new(Predicate::has("Actuator"))),
    ]);
    let filter = p.compile();
    assert!(matches(&filter, &doc(json!({"Metadata.Location": "lab"}))));
    assert!(!matches(
        &filter,
        &doc(json!({"Metadata.Location": "lab", "Actuator": 1}))
    ));
}
