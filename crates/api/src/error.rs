//! Transport error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use arcus_archiver::ArchiverError;

/// Errors a transport handler can answer with
#[derive(Debug, Error)]
pub enum ApiError {
    /// Anything the archiver surfaced
    #[error(transparent)]
    Archiver(#[from] ArchiverError),

    /// The request body was not decodable
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Create a BadRequest error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// The status this error answers with
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Archiver(e) if e.is_auth() => StatusCode::UNAUTHORIZED,
            Self::Archiver(e) if e.is_parse() => StatusCode::BAD_REQUEST,
            Self::Archiver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
