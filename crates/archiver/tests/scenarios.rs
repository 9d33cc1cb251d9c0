//! End-to-end archiver scenarios over the in-memory metadata backend and the
//! mock TSDB server

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use arcus_archiver::Archiver;
use arcus_metastore::{MemoryBackend, MetaStore};
use arcus_protocol::{MessageMap, Reading, SmapMessage};
use arcus_republish::{ChannelSink, Republisher, RepublisherConfig};
use arcus_tsdb::testing::MockTsdbServer;
use arcus_tsdb::{ReadingDb, Tsdb};

struct Harness {
    archiver: Arc<Archiver>,
    store: Arc<MetaStore>,
    server: MockTsdbServer,
}

async fn harness_with_keepalive(keepalive_secs: u64) -> Harness {
    let server = MockTsdbServer::spawn().await.unwrap();
    let store = Arc::new(
        MetaStore::open(Arc::new(MemoryBackend::new()))
            .await
            .unwrap(),
    );
    store.add_api_key("K", false).await.unwrap();
    store.add_api_key("K2", false).await.unwrap();

    let tsdb: Arc<dyn Tsdb> = Arc::new(ReadingDb::new(server.addr(), keepalive_secs, 8));
    let republisher = Republisher::new(Arc::clone(&store), RepublisherConfig::default());
    let archiver = Archiver::new(Arc::clone(&store), tsdb, republisher);

    Harness {
        archiver,
        store,
        server,
    }
}

async fn harness() -> Harness {
    harness_with_keepalive(30).await
}

/// The S1 report: root metadata trickling down to the /sensor leaf
fn sample_report() -> MessageMap {
    let mut messages: HashMap<String, SmapMessage> = HashMap::new();
    messages.insert(
        "/".to_string(),
        serde_json::from_value(json!({
            "Contents": ["sensor"],
            "Metadata": {"Location": "lab"},
            "UUID": "root-uuid"
        }))
        .unwrap(),
    );
    messages.insert(
        "/sensor".to_string(),
        serde_json::from_value(json!({
            "Path": "/sensor",
            "UUID": "u1",
            "Readings": [[1000, 3.14]]
        }))
        .unwrap(),
    );
    messages
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..150 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn scenario_ingest_persists_metadata_and_forwards_reading() {
    let h = harness().await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();

    // Tag document: inherited Location, Path, owning key
    let tags = h.archiver.tags_uuid("u1").await.unwrap();
    let doc = &tags.as_array().unwrap()[0];
    assert_eq!(doc["Metadata.Location"], json!("lab"));
    assert_eq!(doc["Path"], json!("/sensor"));
    assert_eq!(doc["_api"], json!("K"));

    // The TSDB received the reading under u1's StreamId
    let streamid = h.store.get_stream_id("u1").await.unwrap();
    assert!(
        eventually(|| h.server.readings(streamid) == vec![Reading::new(1000, 3.14)]).await,
        "reading never reached the TSDB"
    );
}

#[tokio::test]
async fn scenario_tag_query_returns_ingested_document() {
    let h = harness().await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();

    let result = h
        .archiver
        .handle_query("select * where uuid = \"u1\"", "")
        .await
        .unwrap();
    let docs = result.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["Metadata.Location"], json!("lab"));
    assert_eq!(docs[0]["Path"], json!("/sensor"));
}

#[tokio::test]
async fn scenario_data_query_round_trip() {
    let h = harness().await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();
    assert!(eventually(|| h.server.total_readings() == 1).await);

    let result = h
        .archiver
        .handle_query("select data in (900, 1100) where uuid = \"u1\"", "")
        .await
        .unwrap();
    assert_eq!(result, json!([{"UUID": "u1", "Readings": [[1000, 3.14]]}]));
}

#[tokio::test]
async fn scenario_foreign_key_is_rejected_without_state_change() {
    let h = harness().await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();
    let before = h.archiver.tags_uuid("u1").await.unwrap();

    let mut leaf_only: MessageMap = HashMap::new();
    leaf_only.insert(
        "/sensor".to_string(),
        serde_json::from_value(json!({
            "Path": "/sensor",
            "UUID": "u1",
            "Readings": [[2000, 1.0]]
        }))
        .unwrap(),
    );
    let err = h.archiver.add_data(leaf_only, "K2").await.unwrap_err();
    assert!(err.is_auth());

    let after = h.archiver.tags_uuid("u1").await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn scenario_subscriber_receives_matching_reading() {
    let h = harness().await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();

    let (sink, mut rx) = ChannelSink::new(8);
    h.archiver
        .handle_subscriber(sink, "select * where Metadata.Location = \"lab\"")
        .await
        .unwrap();

    h.archiver.add_data(sample_report(), "K").await.unwrap();

    let msg = rx.recv().await.unwrap();
    assert_eq!(msg.uuid, "u1");
    assert_eq!(msg.path, "/sensor");
    assert_eq!(msg.readings, vec![Reading::new(1000, 3.14)]);

    // The HTTP republish surface serializes each delivery as
    // {path: {UUID, Readings}}
    let mut chunk = serde_json::Map::new();
    chunk.insert(
        msg.path.clone(),
        json!({"UUID": msg.uuid, "Readings": msg.readings}),
    );
    assert_eq!(
        serde_json::Value::Object(chunk),
        json!({"/sensor": {"UUID": "u1", "Readings": [[1000, 3.14]]}})
    );
}

#[tokio::test]
async fn scenario_idle_connection_evicted_then_recreated() {
    let h = harness_with_keepalive(1).await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();
    assert_eq!(h.archiver.stats().tsdb_connections, 1);

    // Quiet for longer than the keepalive
    assert!(eventually(|| h.archiver.stats().tsdb_connections == 0).await);

    h.archiver.add_data(sample_report(), "K").await.unwrap();
    assert_eq!(h.archiver.stats().tsdb_connections, 1);
}

#[tokio::test]
async fn scenario_repeated_ingest_is_idempotent() {
    let h = harness().await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();
    let first = h.archiver.tags_uuid("u1").await.unwrap();

    h.archiver.add_data(sample_report(), "K").await.unwrap();
    let second = h.archiver.tags_uuid("u1").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn scenario_set_tags_scoped_by_key() {
    let h = harness().await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();

    let updated = h
        .archiver
        .handle_query("set Metadata.Flagged = true where uuid = \"u1\"", "K")
        .await
        .unwrap();
    assert_eq!(updated, json!({"Updated": 1}));

    let denied = h
        .archiver
        .handle_query("set Metadata.Flagged = false where uuid = \"u1\"", "K2")
        .await
        .unwrap();
    assert_eq!(denied, json!({"Updated": 0}));
}

#[tokio::test]
async fn scenario_streamlimit_truncates_uuid_list() {
    let h = harness().await;
    for i in 0..3 {
        let mut messages: MessageMap = HashMap::new();
        messages.insert(
            format!("/s{i}"),
            serde_json::from_value(json!({
                "Path": format!("/s{i}"),
                "UUID": format!("u-{i}"),
                "Readings": [[1000 + i, 1.0]]
            }))
            .unwrap(),
        );
        h.archiver.add_data(messages, "K").await.unwrap();
    }
    assert!(eventually(|| h.server.total_readings() == 3).await);

    let result = h
        .archiver
        .handle_query(
            "select data in (0, 5000) streamlimit 2 where has uuid",
            "",
        )
        .await
        .unwrap();
    assert_eq!(result.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn scenario_distinct_tag_query() {
    let h = harness().await;
    h.archiver.add_data(sample_report(), "K").await.unwrap();

    let result = h
        .archiver
        .handle_query(
            "select distinct Metadata.Location where has uuid",
            "",
        )
        .await
        .unwrap();
    assert_eq!(result, json!(["lab"]));
}

#[tokio::test]
async fn scenario_malformed_query_is_parse_error() {
    let h = harness().await;
    let err = h.archiver.handle_query("selectx *", "").await.unwrap_err();
    assert!(err.is_parse());
}

#[tokio::test]
async fn scenario_unknown_key_is_auth_error() {
    let h = harness().await;
    let err = h
        .archiver
        .add_data(sample_report(), "missing")
        .await
        .unwrap_err();
    assert!(err.is_auth());
}
