//! In-memory document store for testing
//!
//! Faithful enough to exercise the migration engine end to end: stable
//! sorting with `search_after` slicing, explicit-id overwrite semantics on
//! bulk create, per-index settings with deep-merged updates, and a refresh
//! counter so tests can assert the settings lifecycle. Thread-safe via
//! `Arc<RwLock>` so concurrent per-entity-type workers can share one store.

use crate::api::DocStore;
use crate::error::{Result, StoreError};
use crate::search::{cmp_sort_values, Hit, Query, SearchOptions, SearchPage};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryIndex {
    /// Documents keyed by id; BTreeMap gives deterministic scan order
    docs: BTreeMap<String, JsonValue>,
    /// Current settings object for the index
    settings: JsonValue,
    /// Number of explicit refresh calls
    refresh_count: u64,
}

/// In-memory `DocStore` for tests
#[derive(Clone, Default)]
pub struct MemoryStore {
    indices: Arc<RwLock<HashMap<String, MemoryIndex>>>,
    templates: Arc<RwLock<HashMap<String, JsonValue>>>,
    /// Remaining operations that should fail (transient-error injection)
    fail_budget: Arc<AtomicUsize>,
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indices = self.indices.read();
        f.debug_struct("MemoryStore")
            .field("index_count", &indices.len())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail with a transient error
    ///
    /// Lets tests drive the retry wrapper without a network.
    pub fn fail_next(&self, n: usize) {
        self.fail_budget.store(n, AtomicOrdering::SeqCst);
    }

    /// Number of refresh calls issued against an index
    pub fn refresh_count(&self, index: &str) -> u64 {
        self.indices
            .read()
            .get(index)
            .map(|ix| ix.refresh_count)
            .unwrap_or(0)
    }

    /// All document ids currently in an index
    pub fn doc_ids(&self, index: &str) -> Vec<String> {
        self.indices
            .read()
            .get(index)
            .map(|ix| ix.docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Installed template bodies, keyed by name
    pub fn templates(&self) -> HashMap<String, JsonValue> {
        self.templates.read().clone()
    }

    fn check_fail(&self) -> Result<()> {
        let remaining = self.fail_budget.load(AtomicOrdering::SeqCst);
        if remaining > 0 {
            self.fail_budget.store(remaining - 1, AtomicOrdering::SeqCst);
            return Err(StoreError::UnexpectedStatus {
                status: 503,
                url: "memory://injected".to_string(),
                body: "injected transient failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Resolve a dotted field path (`entity.type`) against a document
fn field_value<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn eval_query(query: &Query, doc: &JsonValue) -> bool {
    match query {
        Query::MatchAll => true,
        Query::Term { field, value } => field_value(doc, field) == Some(value),
        Query::Terms { field, values } => field_value(doc, field)
            .map(|v| values.contains(v))
            .unwrap_or(false),
        Query::RangeGte { field, value } => field_value(doc, field)
            .map(|v| {
                cmp_sort_values(std::slice::from_ref(v), std::slice::from_ref(value))
                    != Ordering::Less
            })
            .unwrap_or(false),
        Query::Bool { filter } => filter.iter().all(|q| eval_query(q, doc)),
    }
}

/// Sort-key tuple for one document under the given sort spec
///
/// `_uid` resolves to the document id; missing fields sort as null.
fn sort_key(id: &str, doc: &JsonValue, options: &SearchOptions) -> Vec<JsonValue> {
    options
        .sort
        .fields
        .iter()
        .map(|f| {
            if f.field == "_uid" || f.field == "_id" {
                JsonValue::String(id.to_string())
            } else {
                field_value(doc, &f.field).cloned().unwrap_or(JsonValue::Null)
            }
        })
        .collect()
}

/// Deep-merge `partial` into `target`: objects merge recursively, everything
/// else replaces. Matches the store's partial-update semantics, which is what
/// keeps concurrent updates to disjoint field paths from clobbering each
/// other.
fn deep_merge(target: &mut JsonValue, partial: &JsonValue) {
    match (target, partial) {
        (JsonValue::Object(t), JsonValue::Object(p)) => {
            for (k, v) in p {
                match t.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        t.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (t, p) => *t = p.clone(),
    }
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn count(&self, index: &str) -> Result<u64> {
        self.check_fail()?;
        let indices = self.indices.read();
        let ix = indices
            .get(index)
            .ok_or_else(|| StoreError::index_not_found(index))?;
        Ok(ix.docs.len() as u64)
    }

    async fn search(
        &self,
        index: &str,
        query: &Query,
        options: &SearchOptions,
    ) -> Result<SearchPage> {
        self.check_fail()?;
        let indices = self.indices.read();
        let ix = indices
            .get(index)
            .ok_or_else(|| StoreError::index_not_found(index))?;

        let mut matches: Vec<Hit> = ix
            .docs
            .iter()
            .filter(|(_, doc)| eval_query(query, doc))
            .map(|(id, doc)| Hit {
                id: id.clone(),
                source: doc.clone(),
                sort: sort_key(id, doc, options),
            })
            .collect();
        let total = matches.len() as u64;

        if !options.sort.is_unsorted() {
            // Stable sort over id-ordered input keeps ties deterministic.
            matches.sort_by(|a, b| cmp_sort_values(&a.sort, &b.sort));
        }

        let hits: Vec<Hit> = match &options.search_after {
            Some(cursor) if !options.sort.is_unsorted() => matches
                .into_iter()
                .filter(|h| cmp_sort_values(&h.sort, cursor) == Ordering::Greater)
                .take(options.size)
                .collect(),
            _ => {
                let from = options.from.unwrap_or(0) as usize;
                matches.into_iter().skip(from).take(options.size).collect()
            }
        };

        Ok(SearchPage { hits, total })
    }

    async fn bulk_create(
        &self,
        index: &str,
        _doc_type: &str,
        docs: &[(String, JsonValue)],
    ) -> Result<()> {
        self.check_fail()?;
        let mut indices = self.indices.write();
        let ix = indices.entry(index.to_string()).or_default();
        for (id, doc) in docs {
            ix.docs.insert(id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn delete_doc(&self, index: &str, id: &str) -> Result<bool> {
        self.check_fail()?;
        let mut indices = self.indices.write();
        let ix = indices
            .get_mut(index)
            .ok_or_else(|| StoreError::index_not_found(index))?;
        Ok(ix.docs.remove(id).is_some())
    }

    async fn get_doc(&self, index: &str, id: &str) -> Result<JsonValue> {
        self.check_fail()?;
        let indices = self.indices.read();
        indices
            .get(index)
            .and_then(|ix| ix.docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("{index}/{id}")))
    }

    async fn create_doc(&self, index: &str, id: &str, doc: &JsonValue) -> Result<()> {
        self.check_fail()?;
        let mut indices = self.indices.write();
        let ix = indices.entry(index.to_string()).or_default();
        ix.docs.insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn update_doc(&self, index: &str, id: &str, partial: &JsonValue) -> Result<()> {
        self.check_fail()?;
        let mut indices = self.indices.write();
        let doc = indices
            .get_mut(index)
            .and_then(|ix| ix.docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(format!("{index}/{id}")))?;
        deep_merge(doc, partial);
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.check_fail()?;
        Ok(self.indices.read().contains_key(index))
    }

    async fn create_index(&self, index: &str, settings: &JsonValue) -> Result<()> {
        self.check_fail()?;
        let mut indices = self.indices.write();
        let ix = indices.entry(index.to_string()).or_default();
        ix.settings = settings
            .get("settings")
            .cloned()
            .unwrap_or_else(|| settings.clone());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.check_fail()?;
        self.indices.write().remove(index);
        Ok(())
    }

    async fn put_template(&self, name: &str, template: &JsonValue) -> Result<()> {
        self.check_fail()?;
        self.templates
            .write()
            .insert(name.to_string(), template.clone());
        Ok(())
    }

    async fn update_settings(&self, index: &str, settings: &JsonValue) -> Result<()> {
        self.check_fail()?;
        let mut indices = self.indices.write();
        let ix = indices
            .get_mut(index)
            .ok_or_else(|| StoreError::index_not_found(index))?;
        let incoming = settings.get("settings").unwrap_or(settings);
        if let JsonValue::Null = ix.settings {
            ix.settings = JsonValue::Object(Map::new());
        }
        deep_merge(&mut ix.settings, incoming);
        Ok(())
    }

    async fn get_settings(&self, index: &str) -> Result<JsonValue> {
        self.check_fail()?;
        let indices = self.indices.read();
        indices
            .get(index)
            .map(|ix| ix.settings.clone())
            .ok_or_else(|| StoreError::index_not_found(index))
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.check_fail()?;
        let mut indices = self.indices.write();
        let ix = indices
            .get_mut(index)
            .ok_or_else(|| StoreError::index_not_found(index))?;
        ix.refresh_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SortSpec;
    use serde_json::json;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        {
            let mut indices = store.indices.write();
            let ix = indices.entry("intel_sighting".to_string()).or_default();
            for i in 0..5 {
                ix.docs.insert(
                    format!("sighting-{i}"),
                    json!({ "modified": 1000 + i, "created": 900 + i, "severity": "high" }),
                );
            }
        }
        store
    }

    #[tokio::test]
    async fn test_search_after_excludes_cursor() {
        let store = seeded();
        let sort = SortSpec::ascending(["modified", "created", "_uid"]);
        let first = store
            .search(
                "intel_sighting",
                &Query::MatchAll,
                &SearchOptions::scan(2, sort.clone()),
            )
            .await
            .expect("search should succeed");
        assert_eq!(first.hits.len(), 2);
        assert_eq!(first.total, 5);

        let cursor = first.last_sort().expect("cursor");
        let second = store
            .search(
                "intel_sighting",
                &Query::MatchAll,
                &SearchOptions::scan(2, sort).after(Some(cursor)),
            )
            .await
            .expect("search should succeed");
        assert_eq!(second.hits[0].id, "sighting-2");
    }

    #[tokio::test]
    async fn test_term_query_on_nested_path() {
        let store = MemoryStore::new();
        store
            .create_doc(
                "intel_event",
                "ev1",
                &json!({ "entity": { "type": "indicator" }, "event_type": "record-deleted" }),
            )
            .await
            .unwrap();
        let page = store
            .search(
                "intel_event",
                &Query::term("entity.type", "indicator"),
                &SearchOptions::scan(10, SortSpec::unsorted()),
            )
            .await
            .unwrap();
        assert_eq!(page.hits.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_create_overwrites_same_id() {
        let store = MemoryStore::new();
        store
            .bulk_create(
                "intel_indicator",
                "_doc",
                &[("a".into(), json!({ "v": 1 })), ("a".into(), json!({ "v": 2 }))],
            )
            .await
            .unwrap();
        assert_eq!(store.doc_ids("intel_indicator"), vec!["a"]);
        let doc = store.get_doc("intel_indicator", "a").await.unwrap();
        assert_eq!(doc["v"], 2);
    }

    #[tokio::test]
    async fn test_update_doc_deep_merges() {
        let store = MemoryStore::new();
        store
            .create_doc("m", "run", &json!({ "stores": { "a": { "migrated": 0, "index": "x" } } }))
            .await
            .unwrap();
        store
            .update_doc("m", "run", &json!({ "stores": { "a": { "migrated": 7 } } }))
            .await
            .unwrap();
        let doc = store.get_doc("m", "run").await.unwrap();
        assert_eq!(doc["stores"]["a"]["migrated"], 7);
        assert_eq!(doc["stores"]["a"]["index"], "x");
    }

    #[tokio::test]
    async fn test_fail_next_injects_then_recovers() {
        let store = seeded();
        store.fail_next(1);
        assert!(store.count("intel_sighting").await.is_err());
        assert_eq!(store.count("intel_sighting").await.unwrap(), 5);
    }
}
