//! Delete reconciliation: documents deleted from the source after a run
//! starts must not survive in the finalized target index.

use chrono::{Duration, Utc};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use vigil_migration::pipeline::DELETED_EVENT;
use vigil_migration::{MigrationConfig, Migrator};
use vigil_store::{ConnConfig, DocStore, MemoryStore, StoreDef};

fn config() -> MigrationConfig {
    let mut stores = BTreeMap::new();
    stores.insert("indicator".to_string(), StoreDef::new("intel_indicator"));
    stores.insert("event".to_string(), StoreDef::new("intel_event"));
    MigrationConfig::new(ConnConfig::new("http://localhost:9200"), stores).with_batch_size(2)
}

async fn seed_indicators(store: &MemoryStore, n: usize) {
    let docs: Vec<(String, JsonValue)> = (0..n)
        .map(|i| {
            (
                format!("indicator-{i:03}"),
                json!({ "modified": 1000 + i as u64, "created": 500 + i as u64 }),
            )
        })
        .collect();
    store
        .bulk_create("intel_indicator", "_doc", &docs)
        .await
        .expect("seed should succeed");
}

/// Record a delete event stamped after any plausible `started` value.
async fn record_delete(store: &MemoryStore, event_id: &str, entity_type: &str, doc_id: &str) {
    let timestamp = (Utc::now() + Duration::minutes(5)).timestamp_millis();
    store
        .create_doc(
            "intel_event",
            event_id,
            &json!({
                "event_type": DELETED_EVENT,
                "timestamp": timestamp,
                "entity": {
                    "type": entity_type,
                    "id": format!("https://intel.example.com/vigil/{entity_type}/{doc_id}"),
                },
            }),
        )
        .await
        .expect("event write should succeed");
}

#[tokio::test]
async fn mid_migration_delete_is_not_resurrected() {
    let backend = MemoryStore::new();
    seed_indicators(&backend, 5).await;

    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    migrator
        .init_migration("run-del", "2", &["indicator".into()], true)
        .await
        .unwrap();

    // The document is still in the source, so the forward pass copies it;
    // the changelog says it was deleted after the run started.
    record_delete(&backend, "ev-del-1", "indicator", "indicator-002").await;

    let state = migrator.run("run-del").await.expect("run should succeed");
    let entry = state.store_for("indicator").unwrap();

    let target_ids = backend.doc_ids(&entry.target.index);
    assert_eq!(target_ids.len(), 4);
    assert!(!target_ids.contains(&"indicator-002".to_string()));
    // Forward-copy count is not retroactively adjusted by reconciliation.
    assert_eq!(entry.target.migrated, 5);
}

#[tokio::test]
async fn deletes_for_other_entity_types_are_ignored() {
    let backend = MemoryStore::new();
    seed_indicators(&backend, 3).await;

    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    migrator
        .init_migration("run-other", "2", &["indicator".into()], true)
        .await
        .unwrap();

    record_delete(&backend, "ev-other", "sighting", "sighting-111").await;

    let state = migrator.run("run-other").await.unwrap();
    let entry = state.store_for("indicator").unwrap();
    assert_eq!(backend.doc_ids(&entry.target.index).len(), 3);
}

#[tokio::test]
async fn delete_scan_pages_through_large_changelogs() {
    let backend = MemoryStore::new();
    seed_indicators(&backend, 6).await;

    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    migrator
        .init_migration("run-many", "2", &["indicator".into()], true)
        .await
        .unwrap();

    // Batch size is 2, so five delete events force three changelog pages.
    for i in 0..5 {
        record_delete(&backend, &format!("ev-{i}"), "indicator", &format!("indicator-{i:03}")).await;
    }

    let state = migrator.run("run-many").await.unwrap();
    let entry = state.store_for("indicator").unwrap();
    let remaining = backend.doc_ids(&entry.target.index);
    assert_eq!(remaining, vec!["indicator-005".to_string()]);
}

#[tokio::test]
async fn reconciliation_skipped_without_event_store() {
    let backend = MemoryStore::new();
    seed_indicators(&backend, 2).await;

    let mut stores = BTreeMap::new();
    stores.insert("indicator".to_string(), StoreDef::new("intel_indicator"));
    let config = MigrationConfig::new(ConnConfig::new("http://localhost:9200"), stores)
        .with_batch_size(2)
        .without_event_store();

    let migrator = Migrator::new(Arc::new(backend.clone()), config);
    migrator
        .init_migration("run-noev", "2", &["indicator".into()], true)
        .await
        .unwrap();
    let state = migrator.run("run-noev").await.expect("run should succeed");
    assert!(state.is_complete());
}
