//! HTTP surfaces
//!
//! Route table (the shapes producers and consumers already speak):
//!
//! - `POST /add/{key}` - JSON report `{path: message, ...}`; 200 on success
//! - `POST /api/query?key={key}` - query string body, JSON response
//! - `GET  /api/tags/uuid/{uuid}` - the UUID's tag documents
//! - `POST /republish` - query string body; answers with a chunked stream of
//!   newline-delimited JSON readings matching the WHERE clause
//! - `GET  /status` - gauge snapshot

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::debug;

use arcus_archiver::Archiver;
use arcus_protocol::{MessageMap, SmapMessage};

use crate::error::ApiError;
use crate::subscriber::HttpSubscriber;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// The archiver every handler delegates to
    pub archiver: Arc<Archiver>,
    /// Queue capacity for each republish subscriber
    pub republish_queue: usize,
}

/// Build the archiver's HTTP router
pub fn router(archiver: Arc<Archiver>, republish_queue: usize) -> Router {
    let state = AppState {
        archiver,
        republish_queue: republish_queue.max(1),
    };
    Router::new()
        .route("/add/{key}", post(add_reading))
        .route("/republish", post(republish))
        .route("/api/query", post(query))
        .route("/api/tags/uuid/{uuid}", get(tags))
        .route("/status", get(status))
        .with_state(state)
}

/// Decode a JSON report and normalize each message's path from its map key
/// (producers usually omit the `Path` field on leaves).
fn decode_report(body: &str) -> Result<MessageMap, ApiError> {
    let raw: HashMap<String, SmapMessage> =
        serde_json::from_str(body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let mut messages = MessageMap::with_capacity(raw.len());
    for (path, mut msg) in raw {
        if msg.path.is_empty() {
            msg.path = path.clone();
        }
        messages.insert(path, msg);
    }
    Ok(messages)
}

async fn add_reading(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let messages = decode_report(&body)?;
    debug!(key = %key, messages = messages.len(), "ingest report");
    state.archiver.add_data(messages, &key).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Default, Deserialize)]
struct QueryParams {
    #[serde(default)]
    key: String,
}

async fn query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state.archiver.handle_query(&body, &params.key).await?;
    Ok(Json(result))
}

async fn tags(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let docs = state.archiver.tags_uuid(&uuid).await?;
    Ok(Json(docs))
}

async fn republish(State(state): State<AppState>, body: String) -> Result<Response, ApiError> {
    let (sink, stream_body) = HttpSubscriber::new(state.republish_queue);
    state.archiver.handle_subscriber(sink, &body).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        stream_body,
    )
        .into_response())
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::to_value(state.archiver.stats()).unwrap_or_default())
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
