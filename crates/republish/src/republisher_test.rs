//! Tests for subscription lifecycle and fan-out

use super::*;
use crate::sink::ChannelSink;
use arcus_metastore::MemoryBackend;
use serde_json::json;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

async fn store_with_stream() -> Arc<MetaStore> {
    let store = Arc::new(
        MetaStore::open(Arc::new(MemoryBackend::new()))
            .await
            .unwrap(),
    );
    store.add_api_key("K", false).await.unwrap();

    let mut messages: HashMap<String, SmapMessage> = HashMap::new();
    messages.insert(
        "/sensor".to_string(),
        serde_json::from_value(json!({
            "Path": "/sensor",
            "UUID": "u1",
            "Metadata": {"Location": "lab"}
        }))
        .unwrap(),
    );
    store.check_key("K", &messages).await.unwrap();
    for msg in messages.values() {
        store.save_metadata(msg).await.unwrap();
    }
    store
}

fn reading_msg(uuid: &str, path: &str) -> Arc<SmapMessage> {
    Arc::new(
        serde_json::from_value(json!({
            "Path": path,
            "UUID": uuid,
            "Readings": [[1000, 3.14]]
        }))
        .unwrap(),
    )
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_subscriber_receives_matching_uuid() {
    let store = store_with_stream().await;
    let republisher = Republisher::new(store, RepublisherConfig::default());

    let (sink, mut rx) = ChannelSink::new(8);
    republisher
        .handle_subscriber(sink, "select * where Metadata.Location = \"lab\"")
        .await
        .unwrap();
    assert_eq!(republisher.client_count(), 1);

    republisher.republish(&reading_msg("u1", "/sensor"));
    let got = rx.recv().await.unwrap();
    assert_eq!(got.uuid, "u1");
    assert_eq!(got.readings.len(), 1);
}

#[tokio::test]
async fn test_non_matching_message_not_delivered() {
    let store = store_with_stream().await;
    let republisher = Republisher::new(store, RepublisherConfig::default());

    let (sink, mut rx) = ChannelSink::new(8);
    republisher
        .handle_subscriber(sink, "select * where Metadata.Location = \"roof\"")
        .await
        .unwrap();

    republisher.republish(&reading_msg("u1", "/sensor"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_message_tags_match_without_standing_uuid() {
    // A stream unknown at registration, whose message itself carries the
    // matching tag, is still delivered (the slow path).
    let store = store_with_stream().await;
    let republisher = Republisher::new(store, RepublisherConfig::default());

    let (sink, mut rx) = ChannelSink::new(8);
    republisher
        .handle_subscriber(sink, "select * where Metadata.Location = \"lab\"")
        .await
        .unwrap();

    let msg: Arc<SmapMessage> = Arc::new(
        serde_json::from_value(json!({
            "Path": "/late",
            "UUID": "u-late",
            "Metadata": {"Location": "lab"},
            "Readings": [[2000, 1.0]]
        }))
        .unwrap(),
    );
    republisher.republish(&msg);
    assert_eq!(rx.recv().await.unwrap().uuid, "u-late");
}

#[tokio::test]
async fn test_standing_set_not_refreshed_by_default() {
    // A bare reading (no tags) for a stream that started matching only
    // after registration is not delivered: forward-only, set resolved once.
    let store = store_with_stream().await;
    let republisher = Republisher::new(Arc::clone(&store), RepublisherConfig::default());

    let (sink, mut rx) = ChannelSink::new(8);
    republisher
        .handle_subscriber(sink, "select * where Metadata.Location = \"lab\"")
        .await
        .unwrap();

    // u2 gains the matching tag after registration
    let mut messages: HashMap<String, SmapMessage> = HashMap::new();
    messages.insert(
        "/other".to_string(),
        serde_json::from_value(json!({
            "Path": "/other",
            "UUID": "u2",
            "Metadata": {"Location": "lab"}
        }))
        .unwrap(),
    );
    store.check_key("K", &messages).await.unwrap();
    for msg in messages.values() {
        store.save_metadata(msg).await.unwrap();
    }

    republisher.republish(&reading_msg("u2", "/other"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_resubscribe_flag_adds_predicate_matches() {
    let store = store_with_stream().await;
    let republisher = Republisher::new(
        store,
        RepublisherConfig {
            resubscribe_on_metadata_match: true,
        },
    );

    let (sink, mut rx) = ChannelSink::new(8);
    republisher
        .handle_subscriber(sink, "select * where Metadata.Location = \"lab\"")
        .await
        .unwrap();

    // First message matches by tags and promotes the uuid to the fast path
    let tagged: Arc<SmapMessage> = Arc::new(
        serde_json::from_value(json!({
            "Path": "/late",
            "UUID": "u-late",
            "Metadata": {"Location": "lab"},
            "Readings": [[1, 1.0]]
        }))
        .unwrap(),
    );
    republisher.republish(&tagged);
    rx.recv().await.unwrap();

    // Second message carries no tags but rides the fast path now
    republisher.republish(&reading_msg("u-late", "/late"));
    assert_eq!(rx.recv().await.unwrap().uuid, "u-late");
}

#[tokio::test]
async fn test_closed_sink_evicts_subscription() {
    let store = store_with_stream().await;
    let republisher = Republisher::new(store, RepublisherConfig::default());

    let (sink, rx) = ChannelSink::new(8);
    republisher
        .handle_subscriber(sink, "select * where has uuid")
        .await
        .unwrap();
    assert_eq!(republisher.client_count(), 1);

    drop(rx);
    let r = Arc::clone(&republisher);
    assert!(
        eventually(move || r.client_count() == 0).await,
        "subscription not evicted after sink closed"
    );

    // Republish after eviction must not deliver anywhere
    republisher.republish(&reading_msg("u1", "/sensor"));
}

#[tokio::test]
async fn test_slow_subscriber_does_not_block_others() {
    let store = store_with_stream().await;
    let republisher = Republisher::new(store, RepublisherConfig::default());

    let (slow, _slow_rx) = ChannelSink::new(1);
    let (fast, mut fast_rx) = ChannelSink::new(16);
    republisher
        .handle_subscriber(slow, "select * where has uuid")
        .await
        .unwrap();
    republisher
        .handle_subscriber(fast, "select * where has uuid")
        .await
        .unwrap();

    // The slow queue overflows after one message; the fast one sees all
    for _ in 0..5 {
        republisher.republish(&reading_msg("u1", "/sensor"));
    }
    for _ in 0..5 {
        assert_eq!(fast_rx.recv().await.unwrap().uuid, "u1");
    }
}

#[tokio::test]
async fn test_ordering_preserved_per_subscriber() {
    let store = store_with_stream().await;
    let republisher = Republisher::new(store, RepublisherConfig::default());

    let (sink, mut rx) = ChannelSink::new(16);
    republisher
        .handle_subscriber(sink, "select * where has uuid")
        .await
        .unwrap();

    for i in 0..10u64 {
        let msg: Arc<SmapMessage> = Arc::new(
            serde_json::from_value(json!({
                "Path": "/sensor",
                "UUID": "u1",
                "Readings": [[i, 0.0]]
            }))
            .unwrap(),
        );
        republisher.republish(&msg);
    }
    for i in 0..10u64 {
        assert_eq!(rx.recv().await.unwrap().readings[0].timestamp_ms, i);
    }
}

#[tokio::test]
async fn test_malformed_query_is_rejected() {
    let store = store_with_stream().await;
    let republisher = Republisher::new(store, RepublisherConfig::default());

    let (sink, _rx) = ChannelSink::new(8);
    let err = republisher
        .handle_subscriber(sink, "select bogus query !!")
        .await;
    assert!(err.is_err());
    assert_eq!(republisher.client_count(), 0);
}
