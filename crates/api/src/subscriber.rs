//! HTTP republish sink
//!
//! Each delivery becomes one newline-delimited JSON chunk on a long-lived
//! chunked response body:
//!
//! ```text
//! {"/sensor":{"UUID":"u1","Readings":[[1000,3.14]]}}\n\n
//! ```
//!
//! The body stream ends when the sink's channel closes; conversely, the
//! client disconnecting drops the body stream, which fires the close token
//! and lets the republisher evict the subscription.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use arcus_protocol::SmapMessage;
use arcus_republish::{Delivery, SubscriberSink};

/// A republish subscriber backed by an HTTP chunked response
pub struct HttpSubscriber {
    sender: mpsc::Sender<Bytes>,
    token: CancellationToken,
}

impl HttpSubscriber {
    /// Create a sink and the response body it feeds. `capacity` bounds the
    /// per-subscriber queue; a full queue drops messages for this subscriber
    /// only.
    pub fn new(capacity: usize) -> (Arc<Self>, Body) {
        let (sender, receiver) = mpsc::channel::<Bytes>(capacity.max(1));
        let token = CancellationToken::new();

        let closed = sender.clone();
        let close_token = token.clone();
        tokio::spawn(async move {
            closed.closed().await;
            close_token.cancel();
        });

        let body = Body::from_stream(ReceiverStream::new(receiver).map(Ok::<_, Infallible>));
        (Arc::new(Self { sender, token }), body)
    }

    /// One wire chunk: `{path: {UUID, Readings}}` plus the double newline
    /// terminator
    fn encode(msg: &SmapMessage) -> Bytes {
        let mut chunk = serde_json::Map::new();
        chunk.insert(
            msg.path.clone(),
            json!({ "UUID": msg.uuid, "Readings": msg.readings }),
        );
        let mut encoded = serde_json::to_vec(&chunk).unwrap_or_default();
        encoded.extend_from_slice(b"\n\n");
        Bytes::from(encoded)
    }
}

impl SubscriberSink for HttpSubscriber {
    fn deliver(&self, msg: Arc<SmapMessage>) -> Delivery {
        match self.sender.try_send(Self::encode(&msg)) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn send_error(&self, error: &str) {
        warn!(error = %error, "republish subscriber error");
        let _ = self
            .sender
            .try_send(Bytes::from(format!("{error}\n\n")));
    }

    fn closed(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
#[path = "subscriber_test.rs"]
mod tests;
