//! Target-index lifecycle
//!
//! A target index lives in two regimes: write-optimized while bulk loading
//! (no replicas, refresh disabled), then production settings once its entity
//! type is fully migrated. Shard count and analysis settings are never
//! reverted — they cannot be changed on a live index.

use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info, warn};
use vigil_store::{with_retry, DocStore, StoreMap, DEFAULT_MAX_RETRY};

use crate::error::Result;

/// Settings forced onto a target index during bulk loading.
///
/// Replication and periodic refresh both amplify every bulk write; disabling
/// them for the duration of the load is the single biggest throughput lever.
pub fn write_optimized_settings() -> JsonValue {
    json!({
        "number_of_replicas": 0,
        "refresh_interval": "-1",
    })
}

/// Create a target index ready for bulk loading
///
/// If the index already exists it is destructively recreated — intentional
/// for idempotent restarts of the creation step (not of in-progress data),
/// and worth a warning. The entity's template is pushed first so mappings
/// apply, then the index is created with the entity's settings overridden by
/// [`write_optimized_settings`].
pub async fn create_target(store: &dyn DocStore, map: &StoreMap) -> Result<()> {
    let index = &map.indexname;
    if with_retry(DEFAULT_MAX_RETRY, || store.index_exists(index)).await? {
        warn!(%index, "target index already exists, recreating it");
        with_retry(DEFAULT_MAX_RETRY, || store.delete_index(index)).await?;
    }

    if !map.mapping.is_null() {
        let template = json!({
            "index_patterns": [index],
            "mappings": map.mapping.clone(),
        });
        with_retry(DEFAULT_MAX_RETRY, || store.put_template(index, &template)).await?;
    }

    let mut settings = settings_object(&map.settings);
    for (k, v) in write_optimized_settings()
        .as_object()
        .into_iter()
        .flatten()
    {
        settings.insert(k.clone(), v.clone());
    }

    let body = json!({ "settings": JsonValue::Object(settings) });
    with_retry(DEFAULT_MAX_RETRY, || store.create_index(index, &body)).await?;
    info!(%index, "created write-optimized target index");
    Ok(())
}

/// Restore production settings on a migrated target index and refresh it
///
/// Reverts to the entity's configured settings minus shard count and
/// analysis, then forces a refresh so the loaded data becomes searchable.
/// Callers stamp `completed` only after this returns.
pub async fn finalize(store: &dyn DocStore, map: &StoreMap) -> Result<()> {
    let index = &map.indexname;
    let settings = revert_settings(&map.settings);
    with_retry(DEFAULT_MAX_RETRY, || {
        store.update_settings(index, &settings)
    })
    .await?;
    with_retry(DEFAULT_MAX_RETRY, || store.refresh(index)).await?;
    info!(%index, "finalized target index settings");
    Ok(())
}

/// Production settings with the non-mutable keys removed
///
/// `refresh_interval` is restored to the configured value, or to the store
/// default (`null`) when the entity does not configure one — either way the
/// bulk-load `-1` never survives finalize.
fn revert_settings(configured: &JsonValue) -> JsonValue {
    let mut settings = settings_object(configured);
    settings.remove("number_of_shards");
    settings.remove("analysis");
    if !settings.contains_key("refresh_interval") {
        settings.insert("refresh_interval".into(), JsonValue::Null);
    }
    if !settings.contains_key("number_of_replicas") {
        debug!("no configured replica count, store default applies");
    }
    json!({ "settings": JsonValue::Object(settings) })
}

fn settings_object(value: &JsonValue) -> Map<String, JsonValue> {
    value
        .get("settings")
        .unwrap_or(value)
        .as_object()
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_revert_strips_immutable_keys() {
        let configured = json!({
            "number_of_shards": 5,
            "number_of_replicas": 1,
            "analysis": { "analyzer": { "token": {} } },
            "refresh_interval": "1s",
        });
        let reverted = revert_settings(&configured);
        let obj = reverted["settings"].as_object().unwrap();
        assert!(!obj.contains_key("number_of_shards"));
        assert!(!obj.contains_key("analysis"));
        assert_eq!(obj["number_of_replicas"], 1);
        assert_eq!(obj["refresh_interval"], "1s");
    }

    #[test]
    fn test_revert_clears_refresh_interval_when_unconfigured() {
        let reverted = revert_settings(&json!({ "number_of_replicas": 2 }));
        assert_eq!(reverted["settings"]["refresh_interval"], JsonValue::Null);
    }

    #[test]
    fn test_write_optimized_overrides() {
        let s = write_optimized_settings();
        assert_eq!(s["number_of_replicas"], 0);
        assert_eq!(s["refresh_interval"], "-1");
    }
}
