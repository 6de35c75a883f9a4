//! Resumability: a run stopped after N batches and relaunched must converge
//! to the same target state as a run that never stopped.

use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use vigil_migration::{pipeline, MigrationConfig, Migrator, StorePatch};
use vigil_store::{ConnConfig, DocStore, MemoryStore, StoreDef};

const SOURCE: &str = "intel_indicator";

fn config() -> MigrationConfig {
    let mut stores = BTreeMap::new();
    stores.insert("indicator".to_string(), StoreDef::new(SOURCE));
    MigrationConfig::new(ConnConfig::new("http://localhost:9200"), stores).with_batch_size(4)
}

async fn seed(store: &MemoryStore, n: usize) {
    let docs: Vec<(String, JsonValue)> = (0..n)
        .map(|i| {
            (
                format!("indicator-{i:03}"),
                json!({ "modified": 1000 + i as u64, "created": 500 + i as u64 }),
            )
        })
        .collect();
    store.bulk_create(SOURCE, "_doc", &docs).await.expect("seed should succeed");
}

async fn one_pass_baseline(n: usize) -> (u64, Vec<String>) {
    let backend = MemoryStore::new();
    seed(&backend, n).await;
    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    migrator
        .init_migration("baseline", "2", &["indicator".into()], true)
        .await
        .unwrap();
    let state = migrator.run("baseline").await.unwrap();
    let entry = state.store_for("indicator").unwrap();
    (entry.target.migrated, backend.doc_ids(&entry.target.index))
}

#[tokio::test]
async fn stop_and_resume_matches_single_pass() {
    let n = 11;
    let (baseline_migrated, baseline_ids) = one_pass_baseline(n).await;

    // Interrupted run: drive two batches by hand, persisting the cursor the
    // way the batch loop does, then abandon the process state entirely.
    let backend = MemoryStore::new();
    seed(&backend, n).await;
    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    let state = migrator
        .init_migration("resumable", "2", &["indicator".into()], true)
        .await
        .unwrap();
    let entry = state.store_for("indicator").unwrap();
    let source = entry.source.store.clone().expect("source handle");
    let target = entry.target.store.clone().expect("target handle");

    let mut migrated = 0u64;
    let mut cursor = None;
    for _ in 0..2 {
        let page = pipeline::fetch_batch(
            &backend,
            &source,
            4,
            migrated,
            pipeline::sort_spec_for("indicator"),
            cursor.clone(),
        )
        .await
        .unwrap();
        let docs: Vec<(String, JsonValue)> = page
            .hits
            .iter()
            .map(|h| (h.id.clone(), h.source.clone()))
            .collect();
        pipeline::store_batch(&backend, &target, docs).await.unwrap();
        migrated += page.hits.len() as u64;
        cursor = page.last_sort();
        migrator
            .update_migration_store("resumable", "indicator", &StorePatch::progress(cursor.clone(), migrated))
            .await
            .unwrap();
    }
    assert_eq!(migrated, 8);

    // Fresh migrator simulates a relaunched process: only the persisted
    // document and the configuration survive.
    let resumed = Migrator::new(Arc::new(backend.clone()), config());
    let state = resumed.run("resumable").await.unwrap();
    let entry = state.store_for("indicator").unwrap();

    assert_eq!(entry.target.migrated, baseline_migrated);
    assert_eq!(backend.doc_ids(&entry.target.index), baseline_ids);
    assert!(entry.completed.is_some());
}

#[tokio::test]
async fn rewriting_an_uncheckpointed_page_is_idempotent() {
    let n = 6;
    let backend = MemoryStore::new();
    seed(&backend, n).await;
    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    let state = migrator
        .init_migration("replay", "2", &["indicator".into()], true)
        .await
        .unwrap();
    let entry = state.store_for("indicator").unwrap();
    let source = entry.source.store.clone().unwrap();
    let target = entry.target.store.clone().unwrap();

    // Write the first page, "crash" before checkpointing, then run the whole
    // loop: the first page is re-fetched and re-written.
    let page = pipeline::fetch_batch(
        &backend,
        &source,
        4,
        0,
        pipeline::sort_spec_for("indicator"),
        None,
    )
    .await
    .unwrap();
    let docs: Vec<(String, JsonValue)> = page
        .hits
        .iter()
        .map(|h| (h.id.clone(), h.source.clone()))
        .collect();
    pipeline::store_batch(&backend, &target, docs).await.unwrap();

    let state = migrator.run("replay").await.unwrap();
    let entry = state.store_for("indicator").unwrap();
    assert_eq!(entry.target.migrated, n as u64);
    assert_eq!(backend.doc_ids(&entry.target.index).len(), n);
}

#[tokio::test]
async fn retry_exhaustion_halts_then_resume_completes() {
    let n = 10;
    let backend = MemoryStore::new();
    seed(&backend, n).await;
    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    migrator
        .init_migration("flaky", "2", &["indicator".into()], true)
        .await
        .unwrap();

    // More consecutive failures than the retry budget: the run must surface
    // the error instead of spinning.
    backend.fail_next(5);
    assert!(migrator.run("flaky").await.is_err());

    // The persisted cursor survives the failure; a relaunch finishes the job.
    let state = migrator.run("flaky").await.expect("resume should succeed");
    let entry = state.store_for("indicator").unwrap();
    assert_eq!(entry.target.migrated, n as u64);
    assert_eq!(backend.doc_ids(&entry.target.index).len(), n);
}

#[tokio::test]
async fn transient_failures_within_budget_are_invisible() {
    let n = 5;
    let backend = MemoryStore::new();
    seed(&backend, n).await;
    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    migrator
        .init_migration("wobbly", "2", &["indicator".into()], true)
        .await
        .unwrap();

    backend.fail_next(2);
    let state = migrator.run("wobbly").await.expect("retries should absorb this");
    assert_eq!(state.store_for("indicator").unwrap().target.migrated, n as u64);
}

#[tokio::test]
async fn completed_type_is_skipped_on_relaunch() {
    let n = 3;
    let backend = MemoryStore::new();
    seed(&backend, n).await;
    let migrator = Migrator::new(Arc::new(backend.clone()), config());
    migrator
        .init_migration("done", "2", &["indicator".into()], true)
        .await
        .unwrap();
    let first = migrator.run("done").await.unwrap();
    let target_index = first.store_for("indicator").unwrap().target.index.clone();
    assert_eq!(backend.refresh_count(&target_index), 1);

    // Second launch: no batches, no second finalize refresh.
    let second = migrator.run("done").await.unwrap();
    assert_eq!(second.store_for("indicator").unwrap().target.migrated, n as u64);
    assert_eq!(backend.refresh_count(&target_index), 1);
}
