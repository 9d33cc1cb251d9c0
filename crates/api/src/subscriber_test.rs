//! Tests for the HTTP republish sink

use super::*;
use serde_json::json;
use tokio::time::{sleep, Duration};

fn message() -> Arc<SmapMessage> {
    Arc::new(
        serde_json::from_value(json!({
            "Path": "/sensor",
            "UUID": "u1",
            "Readings": [[1000, 3.14]]
        }))
        .unwrap(),
    )
}

#[tokio::test]
async fn test_chunk_shape() {
    let chunk = HttpSubscriber::encode(&message());
    let text = std::str::from_utf8(&chunk).unwrap();
    assert!(text.ends_with("\n\n"));
    let parsed: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(
        parsed,
        json!({"/sensor": {"UUID": "u1", "Readings": [[1000, 3.14]]}})
    );
}

#[tokio::test]
async fn test_deliver_reports_full_queue() {
    let (sink, _body) = HttpSubscriber::new(1);
    assert_eq!(sink.deliver(message()), Delivery::Sent);
    assert_eq!(sink.deliver(message()), Delivery::Full);
}

#[tokio::test]
async fn test_dropping_body_fires_close_token() {
    let (sink, body) = HttpSubscriber::new(4);
    let token = sink.closed();
    assert!(!token.is_cancelled());

    drop(body);
    // The close watcher runs on the runtime; give it a beat
    for _ in 0..100 {
        if token.is_cancelled() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("close token never fired after the body was dropped");
}
