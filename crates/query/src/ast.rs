//! The abstract syntax tree emitted by the parser
//!
//! The AST is serializable and independent of any metadata backend; the only
//! backend-facing piece is `Predicate::compile`, which produces a document
//! filter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::predicate::Predicate;

/// No explicit limit was given
pub const NO_LIMIT: i32 = -1;

/// A parsed query: a WHERE clause plus one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ast {
    /// The metadata predicate every target is scoped by
    pub where_clause: Predicate,
    /// What the query does
    pub target: Target,
}

/// The three things a query can do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Target {
    /// Read tags (projection, optionally distinct)
    Tags(TagsTarget),
    /// Write tags (assignments)
    Set(SetTarget),
    /// Read historical data
    Data(DataTarget),
}

/// Projection for a tags read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagsTarget {
    /// Tag names to return; empty means all (`select *`)
    pub contents: Vec<String>,
    /// Return the distinct values of the first tag instead of documents
    pub distinct: bool,
}

impl TagsTarget {
    /// The projection document the metadata store expects: tag name to 1.
    /// Empty for `select *` (all tags).
    pub fn projection(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        for tag in &self.contents {
            doc.insert(tag.clone(), Value::from(1));
        }
        doc
    }

    /// The key a distinct query collects values of
    pub fn distinct_key(&self) -> &str {
        self.contents.first().map(String::as_str).unwrap_or("")
    }
}

/// Assignments for a tags write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetTarget {
    /// Tag name to new value
    pub updates: Map<String, Value>,
}

/// Which window of data a data read asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQueryKind {
    /// All points in `[start, end]`
    In,
    /// Up to `limit` points at or after `ref`
    After,
    /// Up to `limit` points at or before `ref`
    Before,
}

/// Bounds for a data read. All times are epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataTarget {
    /// Window shape
    pub kind: DataQueryKind,
    /// Range start (kind = In)
    pub start_ms: u64,
    /// Range end (kind = In)
    pub end_ms: u64,
    /// Reference point (kind = After | Before)
    pub ref_ms: u64,
    /// Per-stream point cap, forwarded to the TSDB; negative = unlimited
    pub limit: i32,
    /// Cap on the number of streams consulted; negative = unlimited.
    /// Applied to the UUID list after predicate resolution, before any TSDB
    /// call, in the metadata store's natural order.
    pub streamlimit: i32,
}

impl DataTarget {
    /// A range query over `[start, end]`
    pub fn range(start_ms: u64, end_ms: u64) -> Self {
        Self {
            kind: DataQueryKind::In,
            start_ms,
            end_ms,
            ref_ms: 0,
            limit: NO_LIMIT,
            streamlimit: NO_LIMIT,
        }
    }

    /// A before/after query anchored at `ref_ms`
    pub fn anchored(kind: DataQueryKind, ref_ms: u64) -> Self {
        Self {
            kind,
            start_ms: 0,
            end_ms: 0,
            ref_ms,
            limit: NO_LIMIT,
            streamlimit: NO_LIMIT,
        }
    }
}
