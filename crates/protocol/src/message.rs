//! sMAP message types
//!
//! A producer's report is a JSON map from path to message. Inner tree nodes
//! carry `Contents` (child names) and metadata that trickles down to every
//! leaf below them; leaves carry a UUID and readings.

use std::collections::HashMap;
use std::fmt;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A mutable metadata record: flat dotted keys to free-form values
pub type TagDocument = Map<String, Value>;

/// A full producer report, keyed by path
pub type MessageMap = HashMap<String, SmapMessage>;

/// A single timestamped reading
///
/// Serializes as a two-element array `[timestamp_ms, value]`, the sMAP wire
/// shape. Timestamps are epoch milliseconds; duplicate timestamps are
/// permitted and resolved by the TSDB (last writer wins).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Epoch milliseconds
    pub timestamp_ms: u64,
    /// Measured value
    pub value: f64,
}

impl Reading {
    /// Create a new reading
    #[inline]
    pub fn new(timestamp_ms: u64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.timestamp_ms)?;
        seq.serialize_element(&self.value)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReadingVisitor;

        impl<'de> Visitor<'de> for ReadingVisitor {
            type Value = Reading;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [timestamp, value] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Reading, A::Error> {
                let timestamp_ms: u64 = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let value: f64 = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                // Tolerate (and discard) trailing elements
                while seq.next_element::<serde::de::IgnoredAny>()?.is_some() {}
                Ok(Reading {
                    timestamp_ms,
                    value,
                })
            }
        }

        deserializer.deserialize_seq(ReadingVisitor)
    }
}

/// The readings of one stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmapReading {
    /// Stable stream identifier
    #[serde(rename = "UUID", default)]
    pub uuid: String,
    /// Ordered by timestamp
    #[serde(rename = "Readings", default)]
    pub readings: Vec<Reading>,
}

impl SmapReading {
    /// Create an empty reading set for a stream
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            readings: Vec::new(),
        }
    }
}

/// One node of a producer's report
///
/// Either an inner tree node (`contents` non-empty, typically no UUID) or a
/// leaf stream (UUID + readings). A UUID, once seen, is immutable for its
/// path; the path may change only by republishing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmapMessage {
    /// Absolute '/'-separated location in the producer's tree
    #[serde(rename = "Path", default)]
    pub path: String,

    /// Stream identifier; empty for inner tree nodes
    #[serde(rename = "UUID", default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,

    /// Free-form metadata, inherited by deeper paths when on an inner node
    #[serde(rename = "Metadata", default, skip_serializing_if = "Map::is_empty")]
    pub metadata: TagDocument,

    /// Stream properties (units, reading type, ...)
    #[serde(
        rename = "Properties",
        default,
        skip_serializing_if = "Map::is_empty"
    )]
    pub properties: TagDocument,

    /// Opaque actuator description
    #[serde(rename = "Actuator", default, skip_serializing_if = "Value::is_null")]
    pub actuator: Value,

    /// Child names; non-empty marks an inner tree node
    #[serde(rename = "Contents", default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<String>,

    /// Readings for a leaf stream
    #[serde(rename = "Readings", default, skip_serializing_if = "Vec::is_empty")]
    pub readings: Vec<Reading>,
}

impl SmapMessage {
    /// True when this message describes an inner tree node
    #[inline]
    pub fn is_inner_node(&self) -> bool {
        !self.contents.is_empty()
    }

    /// The readings keyed by this message's UUID
    pub fn reading_set(&self) -> SmapReading {
        SmapReading {
            uuid: self.uuid.clone(),
            readings: self.readings.clone(),
        }
    }

    /// Flatten this message's tags into a single document with dotted keys,
    /// the shape stored in the metadata collection and matched by predicates.
    pub fn flat_tags(&self) -> TagDocument {
        let mut doc = TagDocument::new();
        if !self.uuid.is_empty() {
            doc.insert("uuid".to_string(), Value::String(self.uuid.clone()));
        }
        if !self.path.is_empty() {
            doc.insert("Path".to_string(), Value::String(self.path.clone()));
        }
        for (k, v) in &self.metadata {
            doc.insert(format!("Metadata.{k}"), v.clone());
        }
        for (k, v) in &self.properties {
            doc.insert(format!("Properties.{k}"), v.clone());
        }
        if !self.actuator.is_null() {
            doc.insert("Actuator".to_string(), self.actuator.clone());
        }
        doc
    }
}

/// What data queries return per stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmapResponse {
    /// Stream identifier
    #[serde(rename = "UUID")]
    pub uuid: String,
    /// Points within the queried window
    #[serde(rename = "Readings")]
    pub readings: Vec<Reading>,
}

impl SmapResponse {
    /// Create a response for a stream
    pub fn new(uuid: impl Into<String>, readings: Vec<Reading>) -> Self {
        Self {
            uuid: uuid.into(),
            readings,
        }
    }
}
