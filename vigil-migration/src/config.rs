//! Migration run configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vigil_store::{ConnConfig, StoreDef};

use crate::state::DEFAULT_MIGRATION_INDEX;

/// Default page size for forward-copy batches.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default number of entity types migrated in parallel.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Configuration for the migration engine
///
/// The store definitions here are what makes source handles recomputable on
/// resume: a restarted process re-reads this config, re-derives the handles,
/// and continues from the persisted cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Document store endpoint shared by source and target indices
    pub conn: ConnConfig,

    /// Index holding the persisted migration run documents
    ///
    /// Default: `vigil_migration`
    #[serde(default = "default_migration_index")]
    pub migration_index: String,

    /// Entity stores keyed by entity type name (`indicator`, `sighting`, ...)
    pub stores: BTreeMap<String, StoreDef>,

    /// Entity type key of the changelog/event store used for delete
    /// reconciliation
    ///
    /// When absent, delete reconciliation is skipped (acceptable only for
    /// stores with no concurrent writers).
    /// Default: `event`
    #[serde(default = "default_event_store")]
    pub event_store: Option<String>,

    /// Documents fetched per batch
    ///
    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Entity types migrated concurrently
    ///
    /// Cursor advancement within one type is inherently sequential; this
    /// bounds the number of per-type workers so bulk-indexing threads on the
    /// store are not saturated.
    /// Default: 3
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_migration_index() -> String {
    DEFAULT_MIGRATION_INDEX.to_string()
}

fn default_event_store() -> Option<String> {
    Some("event".to_string())
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl MigrationConfig {
    /// Create a config with defaults for the given endpoint and stores
    pub fn new(conn: ConnConfig, stores: BTreeMap<String, StoreDef>) -> Self {
        Self {
            conn,
            migration_index: default_migration_index(),
            stores,
            event_store: default_event_store(),
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Override the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the per-type worker bound
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Disable delete reconciliation
    pub fn without_event_store(mut self) -> Self {
        self.event_store = None;
        self
    }
}
