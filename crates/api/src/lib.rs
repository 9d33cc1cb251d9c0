//! Transport adapters for the arcus archiver
//!
//! Thin translation layers over [`arcus_archiver::Archiver`]:
//!
//! - `http`: the axum surfaces - `POST /add/{key}` (JSON ingest),
//!   `POST /api/query` (query string body), `GET /api/tags/uuid/{uuid}`,
//!   `POST /republish` (long-lived chunked stream of matching readings) and
//!   `GET /status` (gauge snapshot)
//! - `msgpack`: a framed msgpack TCP listener of the same logical shape as
//!   the JSON ingest
//!
//! Adapters decode and frame; sequencing, authorization and fan-out live in
//! the archiver. Error mapping: auth failures answer 401, malformed queries
//! 400, backend failures 500, all with plain-text bodies.

pub mod http;
pub mod msgpack;
mod error;
mod subscriber;

pub use error::ApiError;
pub use http::router;
pub use subscriber::HttpSubscriber;
