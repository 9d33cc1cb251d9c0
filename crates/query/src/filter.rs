//! Reference evaluation of compiled filters
//!
//! A [`Filter`] is the document form predicates compile to. Real metadata
//! backends translate it into their native query language; the in-memory
//! backend and the republisher's live matching evaluate it directly with
//! [`matches`]. This is the hot path for republishing, so leaf checks stay
//! allocation-free apart from `$regex` compilation.

use serde_json::{Map, Value};

/// A document-style filter: tag paths to conditions, plus the combinators
/// `$and`, `$or`, `$not`. Multiple top-level entries are an implicit AND.
pub type Filter = Map<String, Value>;

/// Does `doc` (a flat tag document) satisfy `filter`?
pub fn matches(filter: &Filter, doc: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, cond)| match key.as_str() {
        "$and" => cond
            .as_array()
            .map(|fs| fs.iter().all(|f| object_matches(f, doc)))
            .unwrap_or(false),
        "$or" => cond
            .as_array()
            .map(|fs| fs.iter().any(|f| object_matches(f, doc)))
            .unwrap_or(false),
        "$not" => !object_matches(cond, doc),
        tag => field_matches(doc.get(tag), cond),
    })
}

fn object_matches(filter: &Value, doc: &Map<String, Value>) -> bool {
    match filter.as_object() {
        Some(f) => matches(f, doc),
        None => false,
    }
}

/// Evaluate one tag condition: either an operator document or a plain value
/// compared for equality.
fn field_matches(field: Option<&Value>, cond: &Value) -> bool {
    if let Some(ops) = operator_doc(cond) {
        return ops.iter().all(|(op, arg)| match op.as_str() {
            "$ne" => !field.map(|v| value_eq(v, arg)).unwrap_or(false),
            "$exists" => field.is_some() == arg.as_bool().unwrap_or(true),
            "$regex" => regex_matches(field, arg),
            _ => false,
        });
    }
    field.map(|v| value_eq(v, cond)).unwrap_or(false)
}

/// An object whose keys all start with '$' is an operator document; anything
/// else (including plain objects) is a literal to compare against.
fn operator_doc(cond: &Value) -> Option<&Map<String, Value>> {
    match cond.as_object() {
        Some(m) if !m.is_empty() && m.keys().all(|k| k.starts_with('$')) => Some(m),
        _ => None,
    }
}

fn regex_matches(field: Option<&Value>, pattern: &Value) -> bool {
    let (text, pat) = match (field.and_then(Value::as_str), pattern.as_str()) {
        (Some(t), Some(p)) => (t, p),
        _ => return false,
    };
    match regex::Regex::new(pat) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// Equality with numeric coercion: `3` and `3.0` compare equal.
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod tests;
