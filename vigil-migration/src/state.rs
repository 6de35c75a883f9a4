//! Persisted migration state
//!
//! One document per migration run. The persisted form is the single source of
//! truth for progress; live store handles are re-attached after every read
//! and never serialized. Progress writes are partial updates scoped to one
//! entity type's sub-map, so workers for different entity types can update
//! the same document concurrently without clobbering each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use vigil_store::StoreMap;

/// Default index holding migration run documents.
pub const DEFAULT_MIGRATION_INDEX: &str = "vigil_migration";

/// Source side of one entity type's migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceState {
    /// Index documents are read from; immutable for the lifetime of the run
    pub index: String,

    /// Documents in the source index when migration of this type started
    ///
    /// Refreshed on every `get`; the source may grow or shrink while the run
    /// is in flight, so `migrated <= total` is a target, not an invariant.
    pub total: u64,

    /// Pagination cursor after the last checkpointed batch
    ///
    /// Monotonically advancing; absent until the first batch completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Vec<JsonValue>>,

    /// Live handle, re-attached on read
    #[serde(skip)]
    pub store: Option<StoreMap>,
}

/// Target side of one entity type's migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetState {
    /// Index documents are written to; immutable for the lifetime of the run
    pub index: String,

    /// Documents written so far
    pub migrated: u64,

    /// Live handle, re-attached on read
    #[serde(skip)]
    pub store: Option<StoreMap>,
}

/// Migration progress for one entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigratedStore {
    pub source: SourceState,
    pub target: TargetState,

    /// When migration of this entity type began
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,

    /// When migration of this entity type finished (settings reverted,
    /// index refreshed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
}

impl MigratedStore {
    /// Initial state for a fresh run: no cursor, nothing migrated
    pub fn init(source_index: impl Into<String>, target_index: impl Into<String>, total: u64) -> Self {
        Self {
            source: SourceState {
                index: source_index.into(),
                total,
                search_after: None,
                store: None,
            },
            target: TargetState {
                index: target_index.into(),
                migrated: 0,
                store: None,
            },
            started: None,
            completed: None,
        }
    }
}

/// Persisted record of one migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationState {
    /// Run identifier
    pub id: String,

    /// When the run was created
    pub created: DateTime<Utc>,

    /// Per-entity-type progress, keyed by entity type name
    pub stores: BTreeMap<String, MigratedStore>,
}

impl MigrationState {
    /// Create a run record with the given per-type states
    pub fn new(id: impl Into<String>, stores: BTreeMap<String, MigratedStore>) -> Self {
        Self {
            id: id.into(),
            created: Utc::now(),
            stores,
        }
    }

    /// Progress entry for an entity type
    pub fn store_for(&self, entity_type: &str) -> Option<&MigratedStore> {
        self.stores.get(entity_type)
    }

    /// Mutable progress entry for an entity type
    pub fn store_for_mut(&mut self, entity_type: &str) -> Option<&mut MigratedStore> {
        self.stores.get_mut(entity_type)
    }

    /// True once every entity type has a `completed` stamp
    pub fn is_complete(&self) -> bool {
        !self.stores.is_empty() && self.stores.values().all(|s| s.completed.is_some())
    }
}

/// Partial update to one entity type's progress
///
/// Only the fields that changed are sent; [`StorePatch::to_update_doc`]
/// shapes them into the `stores.<entity-type>.*` sub-map the store's
/// deep-merging partial update expects.
#[derive(Debug, Clone, Default)]
pub struct StorePatch {
    /// New pagination cursor (source side)
    pub search_after: Option<Vec<JsonValue>>,
    /// Refreshed source document count
    pub total: Option<u64>,
    /// New migrated count (target side)
    pub migrated: Option<u64>,
    /// Stamp the start of this type's migration
    pub started: Option<DateTime<Utc>>,
    /// Stamp the completion of this type's migration
    pub completed: Option<DateTime<Utc>>,
}

impl StorePatch {
    /// Checkpoint patch: cursor plus migrated count
    pub fn progress(search_after: Option<Vec<JsonValue>>, migrated: u64) -> Self {
        Self {
            search_after,
            migrated: Some(migrated),
            ..Self::default()
        }
    }

    /// Patch stamping the start of a type's migration
    pub fn started_now() -> Self {
        Self {
            started: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Patch stamping completion of a type's migration
    pub fn completed_now() -> Self {
        Self {
            completed: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Shape this patch as a partial-update document for the run record
    pub fn to_update_doc(&self, entity_type: &str) -> JsonValue {
        let mut entry = Map::new();
        let mut source = Map::new();
        if let Some(cursor) = &self.search_after {
            source.insert("search_after".into(), JsonValue::Array(cursor.clone()));
        }
        if let Some(total) = self.total {
            source.insert("total".into(), json!(total));
        }
        if !source.is_empty() {
            entry.insert("source".into(), JsonValue::Object(source));
        }
        if let Some(migrated) = self.migrated {
            entry.insert("target".into(), json!({ "migrated": migrated }));
        }
        if let Some(started) = &self.started {
            entry.insert("started".into(), json!(started));
        }
        if let Some(completed) = &self.completed {
            entry.insert("completed".into(), json!(completed));
        }
        json!({ "stores": { (entity_type.to_string()): entry } })
    }

    /// Apply this patch to an in-memory progress entry
    ///
    /// Keeps the local copy consistent with what the partial update just
    /// persisted.
    pub fn apply(&self, store: &mut MigratedStore) {
        if let Some(cursor) = &self.search_after {
            store.source.search_after = Some(cursor.clone());
        }
        if let Some(total) = self.total {
            store.source.total = total;
        }
        if let Some(migrated) = self.migrated {
            store.target.migrated = migrated;
        }
        if let Some(started) = self.started {
            store.started = Some(started);
        }
        if let Some(completed) = self.completed {
            store.completed = Some(completed);
        }
    }
}
