//! Tests for the in-memory backend

use super::*;
use arcus_protocol::METADATA_COLLECTION;
use serde_json::json;

fn doc(v: Value) -> TagDocument {
    v.as_object().unwrap().clone()
}

fn filt(v: Value) -> Filter {
    v.as_object().unwrap().clone()
}

#[tokio::test]
async fn test_insert_and_find() {
    let backend = MemoryBackend::new();
    backend
        .insert(METADATA_COLLECTION, doc(json!({"uuid": "u1", "x": 1})))
        .await
        .unwrap();
    let found = backend
        .find(METADATA_COLLECTION, &filt(json!({"uuid": "u1"})), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["x"], json!(1));
}

#[tokio::test]
async fn test_unique_index_rejects_duplicates() {
    let backend = MemoryBackend::new();
    backend
        .ensure_unique_index(METADATA_COLLECTION, &["uuid"])
        .await
        .unwrap();
    backend
        .insert(METADATA_COLLECTION, doc(json!({"uuid": "u1"})))
        .await
        .unwrap();
    let err = backend
        .insert(METADATA_COLLECTION, doc(json!({"uuid": "u1"})))
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::DuplicateDocument { .. }));
}

#[tokio::test]
async fn test_unique_index_is_sparse() {
    let backend = MemoryBackend::new();
    backend
        .ensure_unique_index(METADATA_COLLECTION, &["uuid"])
        .await
        .unwrap();
    // Documents without the indexed key never collide
    backend
        .insert(METADATA_COLLECTION, doc(json!({"a": 1})))
        .await
        .unwrap();
    backend
        .insert(METADATA_COLLECTION, doc(json!({"a": 2})))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upsert_updates_in_place() {
    let backend = MemoryBackend::new();
    let filter = filt(json!({"uuid": "u1"}));
    backend
        .upsert(METADATA_COLLECTION, &filter, &doc(json!({"x": 1})))
        .await
        .unwrap();
    backend
        .upsert(METADATA_COLLECTION, &filter, &doc(json!({"x": 2, "y": 3})))
        .await
        .unwrap();
    let found = backend
        .find(METADATA_COLLECTION, &filter, None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["x"], json!(2));
    assert_eq!(found[0]["y"], json!(3));
    // The filter's equality field seeded the created document
    assert_eq!(found[0]["uuid"], json!("u1"));
}

#[tokio::test]
async fn test_projection_include_mode() {
    let backend = MemoryBackend::new();
    backend
        .insert(
            METADATA_COLLECTION,
            doc(json!({"uuid": "u1", "a": 1, "b": 2})),
        )
        .await
        .unwrap();
    let projection = doc(json!({"a": 1}));
    let found = backend
        .find(METADATA_COLLECTION, &Filter::new(), Some(&projection))
        .await
        .unwrap();
    assert_eq!(found[0].len(), 1);
    assert_eq!(found[0]["a"], json!(1));
}

#[tokio::test]
async fn test_projection_exclude_mode() {
    let backend = MemoryBackend::new();
    backend
        .insert(
            METADATA_COLLECTION,
            doc(json!({"uuid": "u1", "a": 1, "b": 2})),
        )
        .await
        .unwrap();
    let projection = doc(json!({"a": 0}));
    let found = backend
        .find(METADATA_COLLECTION, &Filter::new(), Some(&projection))
        .await
        .unwrap();
    assert!(!found[0].contains_key("a"));
    assert!(found[0].contains_key("b"));
}

#[tokio::test]
async fn test_update_many_counts_and_never_creates() {
    let backend = MemoryBackend::new();
    backend
        .insert(METADATA_COLLECTION, doc(json!({"g": "x", "n": 1})))
        .await
        .unwrap();
    backend
        .insert(METADATA_COLLECTION, doc(json!({"g": "x", "n": 2})))
        .await
        .unwrap();
    let updated = backend
        .update_many(
            METADATA_COLLECTION,
            &filt(json!({"g": "x"})),
            &doc(json!({"m": true})),
        )
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let missed = backend
        .update_many(
            METADATA_COLLECTION,
            &filt(json!({"g": "y"})),
            &doc(json!({"m": true})),
        )
        .await
        .unwrap();
    assert_eq!(missed, 0);
    assert_eq!(
        backend.count(METADATA_COLLECTION, &Filter::new()).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_distinct_preserves_first_seen_order() {
    let backend = MemoryBackend::new();
    for loc in ["lab", "roof", "lab"] {
        backend
            .insert(METADATA_COLLECTION, doc(json!({"Metadata.Location": loc})))
            .await
            .unwrap();
    }
    let values = backend
        .distinct(METADATA_COLLECTION, "Metadata.Location", &Filter::new())
        .await
        .unwrap();
    assert_eq!(values, vec![json!("lab"), json!("roof")]);
}

#[tokio::test]
async fn test_max_u64() {
    let backend = MemoryBackend::new();
    assert_eq!(
        backend.max_u64("streams", "streamid").await.unwrap(),
        None
    );
    for sid in [3u64, 7, 5] {
        backend
            .insert("streams", doc(json!({"streamid": sid})))
            .await
            .unwrap();
    }
    assert_eq!(
        backend.max_u64("streams", "streamid").await.unwrap(),
        Some(7)
    );
}
