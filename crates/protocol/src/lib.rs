//! Core sMAP data model for the arcus archiver
//!
//! This crate provides the types that flow through every other component:
//!
//! - `Reading` - a single `(timestamp_ms, value)` pair
//! - `SmapReading` - the readings of one stream, keyed by UUID
//! - `SmapMessage` - one node of a producer's report: either an inner tree
//!   node (non-empty `contents`) or a leaf stream (UUID + readings)
//! - `SmapResponse` - what data queries return per stream
//!
//! # Design Principles
//!
//! - Tag values are schema-flex: free-form JSON (`serde_json::Value`) under
//!   flat dotted keys (`Metadata.Location`)
//! - Wire shapes match the sMAP profile: readings serialize as two-element
//!   arrays `[timestamp, value]`, field names are capitalized
//!   (`Path`, `Metadata`, `Readings`, `UUID`). The tag-document key for a
//!   stream's identifier stays lowercase `uuid`; only the wire field is
//!   uppercased

mod error;
mod message;

pub use error::ProtocolError;
pub use message::{MessageMap, Reading, SmapMessage, SmapReading, SmapResponse, TagDocument};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Collection names in the metadata backend
pub const STREAMS_COLLECTION: &str = "streams";
pub const METADATA_COLLECTION: &str = "metadata";
pub const PATHMETADATA_COLLECTION: &str = "pathmetadata";
pub const APIKEYS_COLLECTION: &str = "apikeys";

/// Returns all proper ancestor paths of an absolute '/'-separated path,
/// shallowest first, the path itself excluded.
///
/// ```
/// use arcus_protocol::get_prefixes;
///
/// assert_eq!(get_prefixes("/a/b/c"), vec!["/", "/a", "/a/b"]);
/// assert_eq!(get_prefixes("/"), Vec::<String>::new());
/// ```
pub fn get_prefixes(path: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return prefixes;
    }
    prefixes.push("/".to_string());
    let mut current = String::new();
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Vec::new();
    }
    for segment in &segments[..segments.len() - 1] {
        current.push('/');
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
