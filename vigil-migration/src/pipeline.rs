//! Batch fetch/transform/store pipeline
//!
//! The innermost loop of a migration: paginated reads from the source index,
//! per-document transforms, size-capped bulk writes to the target index, and
//! reconciliation of documents deleted from the source since the run started.
//! Every remote call goes through the bounded retry wrapper; on exhaustion
//! the error propagates and the caller's last persisted cursor is the
//! resumption point.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use vigil_store::{
    with_retry, DocStore, Query, SearchOptions, SearchPage, SortSpec, StoreMap, DEFAULT_MAX_RETRY,
};

use crate::error::Result;

/// Ceiling for one bulk request body.
///
/// Oversized bulk bodies get rejected outright by the store, so batches are
/// pre-chunked to stay under this.
pub const MAX_BULK_BYTES: usize = 5 * 1024 * 1024;

/// Changelog field holding the event kind.
pub const EVENT_TYPE_FIELD: &str = "event_type";

/// Event kind recorded when a document is deleted.
pub const DELETED_EVENT: &str = "record-deleted";

/// Per-document transform applied between fetch and store
///
/// Receives the entity type and the document body; returns the body to write.
/// The default is identity.
pub type TransformFn = Arc<dyn Fn(&str, JsonValue) -> JsonValue + Send + Sync>;

/// The identity transform
pub fn identity_transform() -> TransformFn {
    Arc::new(|_entity_type, doc| doc)
}

/// Sort specification for scanning one entity type
///
/// Events sort by their immutable `timestamp`; identities are unsorted (no
/// stable cursor, offset pagination applies); everything else sorts by
/// `modified`, `created`, then the internal id so ties have a total order.
pub fn sort_spec_for(entity_type: &str) -> SortSpec {
    match entity_type {
        "event" => SortSpec::ascending(["timestamp"]),
        "identity" => SortSpec::unsorted(),
        _ => SortSpec::ascending(["modified", "created", "_uid"]),
    }
}

/// Fetch one batch from a source index at the given cursor position
///
/// `search_after` supersedes `offset` when present; `offset` positions
/// unsorted scans, which have no cursor to resume from.
pub async fn fetch_batch(
    store: &dyn DocStore,
    map: &StoreMap,
    batch_size: usize,
    offset: u64,
    sort: SortSpec,
    search_after: Option<Vec<JsonValue>>,
) -> Result<SearchPage> {
    let mut options = SearchOptions::scan(batch_size, sort).after(search_after);
    if options.search_after.is_none() {
        options.from = Some(offset);
    }
    let page = with_retry(DEFAULT_MAX_RETRY, || {
        store.search(&map.indexname, &Query::MatchAll, &options)
    })
    .await?;
    debug!(
        index = %map.indexname,
        hits = page.hits.len(),
        total = page.total,
        "fetched batch"
    );
    Ok(page)
}

/// Bulk-write a batch of `(id, document)` pairs to a target index
///
/// Splits the batch so no single bulk request exceeds [`MAX_BULK_BYTES`].
/// Explicit-id writes make re-writing a resumed page an overwrite, not a
/// duplicate. Returns the number of documents written.
pub async fn store_batch(
    store: &dyn DocStore,
    map: &StoreMap,
    batch: Vec<(String, JsonValue)>,
) -> Result<usize> {
    if batch.is_empty() {
        return Ok(0);
    }
    let written = batch.len();
    let mut chunk: Vec<(String, JsonValue)> = Vec::new();
    let mut chunk_bytes = 0usize;

    for (id, doc) in batch {
        let doc_bytes = serde_json::to_string(&doc)?.len() + id.len() + 64;
        if !chunk.is_empty() && chunk_bytes + doc_bytes > MAX_BULK_BYTES {
            flush_chunk(store, map, &chunk).await?;
            chunk.clear();
            chunk_bytes = 0;
        }
        chunk_bytes += doc_bytes;
        chunk.push((id, doc));
    }
    if !chunk.is_empty() {
        flush_chunk(store, map, &chunk).await?;
    }
    Ok(written)
}

async fn flush_chunk(
    store: &dyn DocStore,
    map: &StoreMap,
    chunk: &[(String, JsonValue)],
) -> Result<()> {
    with_retry(DEFAULT_MAX_RETRY, || {
        store.bulk_create(&map.indexname, &map.doc_type, chunk)
    })
    .await?;
    debug!(index = %map.indexname, docs = chunk.len(), "stored bulk chunk");
    Ok(())
}

/// Short internal id of a long-form entity id
///
/// Long-form ids are URLs whose last path segment is the internal document
/// id; ids without a path are already short.
pub fn short_id(long_id: &str) -> &str {
    long_id.rsplit('/').next().unwrap_or(long_id)
}

/// One page of delete events, grouped by entity type
#[derive(Debug, Default)]
pub struct DeletePage {
    /// Long-form ids of deleted documents, keyed by entity type
    pub deleted: BTreeMap<String, Vec<String>>,
    /// Cursor to resume the scan, when the page was full
    pub search_after: Option<Vec<JsonValue>>,
    /// Number of events in this page
    pub count: usize,
}

/// Scan the changelog for documents deleted since `since`
///
/// Filters to delete-type events for the given entity types with a timestamp
/// at or after the bound, so documents removed from the source mid-migration
/// are not resurrected in the target. Results are grouped by entity type.
pub async fn fetch_deletes(
    store: &dyn DocStore,
    event_map: &StoreMap,
    entity_types: &[String],
    since: DateTime<Utc>,
    batch_size: usize,
    search_after: Option<Vec<JsonValue>>,
) -> Result<DeletePage> {
    let query = Query::Bool {
        filter: vec![
            Query::term(EVENT_TYPE_FIELD, DELETED_EVENT),
            Query::terms(
                "entity.type",
                entity_types
                    .iter()
                    .map(|t| JsonValue::String(t.clone()))
                    .collect(),
            ),
            Query::range_gte("timestamp", since.timestamp_millis()),
        ],
    };
    let sort = SortSpec::ascending(["timestamp", "_uid"]);
    let options = SearchOptions::scan(batch_size, sort).after(search_after);

    let page = with_retry(DEFAULT_MAX_RETRY, || {
        store.search(&event_map.indexname, &query, &options)
    })
    .await?;

    let mut deleted: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for hit in &page.hits {
        let entity = &hit.source["entity"];
        match (entity["type"].as_str(), entity["id"].as_str()) {
            (Some(entity_type), Some(id)) => {
                deleted
                    .entry(entity_type.to_string())
                    .or_default()
                    .push(id.to_string());
            }
            _ => {
                // Malformed changelog entries degrade to a warning, never
                // abort the reconciliation pass.
                warn!(event_id = %hit.id, "delete event without entity type/id, skipping");
            }
        }
    }

    let count = page.hits.len();
    Ok(DeletePage {
        deleted,
        search_after: if count < batch_size {
            None
        } else {
            page.last_sort()
        },
        count,
    })
}

/// Delete documents from a target index by long-form id
///
/// Ids are resolved to short internal ids first. Deletes are issued per id
/// rather than bulked: delete volume is expected to be low, and the loop is
/// trivially resumable. Returns how many documents actually existed.
pub async fn batch_delete(
    store: &dyn DocStore,
    map: &StoreMap,
    long_ids: &[String],
) -> Result<usize> {
    let mut removed = 0;
    for long_id in long_ids {
        let id = short_id(long_id);
        let existed =
            with_retry(DEFAULT_MAX_RETRY, || store.delete_doc(&map.indexname, id)).await?;
        if existed {
            removed += 1;
        } else {
            debug!(index = %map.indexname, id, "delete target already absent");
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use vigil_store::{ConnConfig, MemoryStore, StoreDef};

    fn map_for(index: &str) -> StoreMap {
        StoreMap::from_def(&ConnConfig::new("http://localhost:9200"), &StoreDef::new(index))
            .expect("store map should build")
    }

    #[test]
    fn test_sort_spec_per_entity_type() {
        assert_eq!(sort_spec_for("event"), SortSpec::ascending(["timestamp"]));
        assert!(sort_spec_for("identity").is_unsorted());
        assert_eq!(
            sort_spec_for("indicator"),
            SortSpec::ascending(["modified", "created", "_uid"])
        );
    }

    #[test]
    fn test_short_id_strips_url_path() {
        assert_eq!(
            short_id("https://intel.example.com/vigil/indicator/indicator-abc123"),
            "indicator-abc123"
        );
        assert_eq!(short_id("sighting-9"), "sighting-9");
    }

    #[tokio::test]
    async fn test_store_batch_chunks_large_batches() {
        let store = MemoryStore::new();
        let map = map_for("v2_intel_report");
        // ~1 MB documents force multiple bulk requests under the 5 MB cap.
        let blob = "x".repeat(1024 * 1024);
        let batch: Vec<(String, JsonValue)> = (0..12)
            .map(|i| (format!("report-{i}"), json!({ "blob": blob })))
            .collect();

        let written = store_batch(&store, &map, batch).await.expect("store should succeed");
        assert_eq!(written, 12);
        assert_eq!(store.doc_ids("v2_intel_report").len(), 12);
    }

    #[tokio::test]
    async fn test_fetch_deletes_groups_by_type() {
        let store = MemoryStore::new();
        let map = map_for("intel_event");
        let since = Utc::now();
        let base = since.timestamp_millis();
        store
            .bulk_create(
                "intel_event",
                "_doc",
                &[
                    (
                        "ev-1".into(),
                        json!({
                            "event_type": DELETED_EVENT,
                            "timestamp": base + 10,
                            "entity": { "type": "indicator", "id": "https://x/vigil/indicator/indicator-1" },
                        }),
                    ),
                    (
                        "ev-2".into(),
                        json!({
                            "event_type": DELETED_EVENT,
                            "timestamp": base + 20,
                            "entity": { "type": "sighting", "id": "https://x/vigil/sighting/sighting-7" },
                        }),
                    ),
                    // Before the cutoff: must be ignored.
                    (
                        "ev-0".into(),
                        json!({
                            "event_type": DELETED_EVENT,
                            "timestamp": base - 1000,
                            "entity": { "type": "indicator", "id": "https://x/vigil/indicator/indicator-0" },
                        }),
                    ),
                    // Different event kind: must be ignored.
                    (
                        "ev-3".into(),
                        json!({
                            "event_type": "record-created",
                            "timestamp": base + 30,
                            "entity": { "type": "indicator", "id": "https://x/vigil/indicator/indicator-2" },
                        }),
                    ),
                ],
            )
            .await
            .unwrap();

        let page = fetch_deletes(
            &store,
            &map,
            &["indicator".to_string(), "sighting".to_string()],
            since,
            10,
            None,
        )
        .await
        .expect("fetch should succeed");

        assert_eq!(page.count, 2);
        assert!(page.search_after.is_none());
        assert_eq!(
            page.deleted["indicator"],
            vec!["https://x/vigil/indicator/indicator-1"]
        );
        assert_eq!(
            page.deleted["sighting"],
            vec!["https://x/vigil/sighting/sighting-7"]
        );
    }

    #[tokio::test]
    async fn test_batch_delete_resolves_and_counts() {
        let store = MemoryStore::new();
        let map = map_for("v2_intel_indicator");
        store
            .bulk_create(
                "v2_intel_indicator",
                "_doc",
                &[("indicator-1".into(), json!({ "x": 1 }))],
            )
            .await
            .unwrap();

        let removed = batch_delete(
            &store,
            &map,
            &[
                "https://x/vigil/indicator/indicator-1".to_string(),
                "https://x/vigil/indicator/indicator-gone".to_string(),
            ],
        )
        .await
        .expect("delete should succeed");

        assert_eq!(removed, 1);
        assert!(store.doc_ids("v2_intel_indicator").is_empty());
    }
}
