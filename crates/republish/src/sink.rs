//! Subscriber sinks
//!
//! A sink is the republisher's view of one consumer: a non-blocking delivery
//! slot plus a close signal. Sinks hold only their own close token, never a
//! back-pointer to the republisher, so the ownership relation stays one-way.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use arcus_protocol::SmapMessage;

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the subscriber
    Sent,
    /// The subscriber's queue is full; the message is dropped for it
    Full,
    /// The subscriber is gone; its lifetime watcher will evict it
    Closed,
}

/// One consumer of republished messages
pub trait SubscriberSink: Send + Sync {
    /// Hand a message to the subscriber without blocking the publisher.
    /// The sink owns flushing; a slow sink only slows its own delivery.
    fn deliver(&self, msg: Arc<SmapMessage>) -> Delivery;

    /// Report a subscription-fatal error to the consumer
    fn send_error(&self, error: &str);

    /// The authoritative cancel signal: fires when the transport disconnects
    fn closed(&self) -> CancellationToken;
}

/// A sink backed by a bounded channel
///
/// The receiving half belongs to the transport (or the test); when it drops,
/// the close token fires and the republisher evicts the subscription.
pub struct ChannelSink {
    sender: mpsc::Sender<Arc<SmapMessage>>,
    token: CancellationToken,
}

impl ChannelSink {
    /// Create a sink with a queue of `capacity` messages. Returns the sink
    /// and the consumer's receiving half.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<SmapMessage>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let token = CancellationToken::new();

        let closed = sender.clone();
        let close_token = token.clone();
        tokio::spawn(async move {
            closed.closed().await;
            close_token.cancel();
        });

        (Arc::new(Self { sender, token }), receiver)
    }
}

impl SubscriberSink for ChannelSink {
    fn deliver(&self, msg: Arc<SmapMessage>) -> Delivery {
        match self.sender.try_send(msg) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn send_error(&self, _error: &str) {
        // A channel consumer learns about errors by the stream ending
    }

    fn closed(&self) -> CancellationToken {
        self.token.clone()
    }
}
