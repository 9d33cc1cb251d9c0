//! Metadata predicates and their compiled filter form
//!
//! A predicate is a tree of conjunctions, disjunctions, negations and leaf
//! comparators over tag paths. `compile` lowers it to a document-style filter
//! (`{tag: value}`, `{"$and": [...]}`, ...) that metadata backends interpret.
//! Compilation is deterministic: maps are ordered and conjunction operands
//! keep their written order.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::filter::Filter;

/// Leaf comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Tag equals value
    Eq,
    /// Tag differs from value (or is absent)
    Ne,
    /// Tag matches a `%`/`_` wildcard pattern
    Like,
    /// Tag is present
    Has,
}

/// A WHERE clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    /// All operands hold
    And(Vec<Predicate>),
    /// At least one operand holds
    Or(Vec<Predicate>),
    /// The operand does not hold
    Not(Box<Predicate>),
    /// A leaf comparison
    Cmp {
        /// Dotted tag path (`Metadata.Location`)
        tag: String,
        /// Comparison operator
        op: Operator,
        /// Right-hand side; ignored for `Has`
        value: Value,
    },
}

impl Predicate {
    /// Leaf equality shorthand
    pub fn eq(tag: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cmp {
            tag: tag.into(),
            op: Operator::Eq,
            value: value.into(),
        }
    }

    /// Leaf presence shorthand
    pub fn has(tag: impl Into<String>) -> Self {
        Self::Cmp {
            tag: tag.into(),
            op: Operator::Has,
            value: Value::Null,
        }
    }

    /// Lower to the backend filter document.
    ///
    /// The output is deterministic for a given predicate: document keys are
    /// ordered maps and `$and`/`$or` arrays preserve operand order, so
    /// snapshots of compiled filters are stable.
    pub fn compile(&self) -> Filter {
        match self {
            Predicate::And(ops) => {
                let compiled: Vec<Value> =
                    ops.iter().map(|p| Value::Object(p.compile())).collect();
                let mut doc = Map::new();
                doc.insert("$and".to_string(), Value::Array(compiled));
                doc
            }
            Predicate::Or(ops) => {
                let compiled: Vec<Value> =
                    ops.iter().map(|p| Value::Object(p.compile())).collect();
                let mut doc = Map::new();
                doc.insert("$or".to_string(), Value::Array(compiled));
                doc
            }
            Predicate::Not(inner) => {
                let mut doc = Map::new();
                doc.insert("$not".to_string(), Value::Object(inner.compile()));
                doc
            }
            Predicate::Cmp { tag, op, value } => {
                let mut doc = Map::new();
                let cond = match op {
                    Operator::Eq => value.clone(),
                    Operator::Ne => json!({ "$ne": value }),
                    Operator::Like => json!({ "$regex": like_to_regex(value) }),
                    Operator::Has => json!({ "$exists": true }),
                };
                doc.insert(tag.clone(), cond);
                doc
            }
        }
    }
}

/// Translate a `like` pattern into an anchored regex string.
///
/// `%` matches any run of characters, `_` any single character; everything
/// else is literal.
fn like_to_regex(pattern: &Value) -> String {
    let raw = pattern.as_str().unwrap_or_default();
    let mut out = String::with_capacity(raw.len() + 8);
    out.push('^');
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
#[path = "predicate_test.rs"]
mod tests;
