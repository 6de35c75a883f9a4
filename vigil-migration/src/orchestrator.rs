//! Migration orchestration
//!
//! A [`Migrator`] is the explicit context object for one engine instance: the
//! store backend, the run configuration, and the transform chain. Per entity
//! type the state machine is `not started → in progress → completed`; every
//! transition is durable in the persisted run document, and any step can be
//! re-entered after a crash using only the persisted cursor and counts.

use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use vigil_store::{
    target_index_name, with_retry, DocStore, StoreError, StoreMap, DEFAULT_MAX_RETRY,
};

use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::lifecycle;
use crate::pipeline::{
    self, identity_transform, sort_spec_for, DeletePage, TransformFn,
};
use crate::state::{MigratedStore, MigrationState, StorePatch};

/// Orchestrates migration runs against one document store
#[derive(Clone)]
pub struct Migrator {
    store: Arc<dyn DocStore>,
    config: MigrationConfig,
    transform: TransformFn,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("migration_index", &self.config.migration_index)
            .field("stores", &self.config.stores.len())
            .finish_non_exhaustive()
    }
}

impl Migrator {
    /// Create a migrator with the identity transform
    pub fn new(store: Arc<dyn DocStore>, config: MigrationConfig) -> Self {
        Self {
            store,
            config,
            transform: identity_transform(),
        }
    }

    /// Replace the per-document transform
    pub fn with_transform(mut self, transform: TransformFn) -> Self {
        self.transform = transform;
        self
    }

    /// The run configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Handles
    // -------------------------------------------------------------------------

    /// Live source handle for an entity type, from current configuration
    fn source_map(&self, entity_type: &str) -> Result<StoreMap> {
        let def = self
            .config
            .stores
            .get(entity_type)
            .ok_or_else(|| MigrationError::UnknownEntityType(entity_type.to_string()))?;
        Ok(StoreMap::from_def(&self.config.conn, def)?)
    }

    /// Live handle for the delete-reconciliation changelog, when configured
    fn event_map(&self) -> Result<Option<StoreMap>> {
        match &self.config.event_store {
            Some(key) if self.config.stores.contains_key(key) => {
                Ok(Some(self.source_map(key)?))
            }
            Some(key) => {
                debug!(%key, "changelog store not configured, delete reconciliation disabled");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Attach live source/target handles to every entry of a run record
    ///
    /// Source handles are recomputed from current configuration; target
    /// handles reuse the persisted target index name.
    fn attach_handles(&self, state: &mut MigrationState) -> Result<()> {
        for (entity_type, entry) in state.stores.iter_mut() {
            let source = self.source_map(entity_type)?;
            entry.target.store = Some(source.for_index(entry.target.index.clone()));
            entry.source.store = Some(source);
        }
        Ok(())
    }

    fn attached_maps(&self, entry: &MigratedStore) -> Result<(StoreMap, StoreMap)> {
        match (&entry.source.store, &entry.target.store) {
            (Some(source), Some(target)) => Ok((source.clone(), target.clone())),
            _ => Err(MigrationError::invalid_state(
                "live store handles not attached",
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Operator surface
    // -------------------------------------------------------------------------

    /// Initialize a migration run
    ///
    /// Captures per-type source totals and derives target index names from
    /// `prefix`. With `confirm`, the run document is persisted and all target
    /// indices are created write-optimized before any data moves; without it
    /// this is a dry run that only reports what would happen.
    pub async fn init_migration(
        &self,
        run_id: &str,
        prefix: &str,
        entity_types: &[String],
        confirm: bool,
    ) -> Result<MigrationState> {
        let mut stores = BTreeMap::new();
        for entity_type in entity_types {
            let source = self.source_map(entity_type)?;
            let total = self.store_size(&source).await?;
            let target_index = target_index_name(prefix, &source.indexname);
            debug!(%entity_type, total, target = %target_index, "planned store migration");
            stores.insert(
                entity_type.clone(),
                MigratedStore::init(source.indexname.clone(), target_index, total),
            );
        }
        let mut state = MigrationState::new(run_id, stores);

        if confirm {
            self.ensure_migration_index().await?;
            if self.migration_doc_exists(run_id).await? {
                return Err(MigrationError::invalid_state(format!(
                    "migration {run_id} already exists; resume it with get-migration"
                )));
            }
            let doc = serde_json::to_value(&state)?;
            with_retry(DEFAULT_MAX_RETRY, || {
                self.store
                    .create_doc(&self.config.migration_index, run_id, &doc)
            })
            .await?;

            for (entity_type, entry) in &state.stores {
                let source = self.source_map(entity_type)?;
                let target = source.for_index(entry.target.index.clone());
                lifecycle::create_target(self.store.as_ref(), &target).await?;
            }
            info!(run_id, types = state.stores.len(), "initialized migration run");
        }

        self.attach_handles(&mut state)?;
        Ok(state)
    }

    /// Read a persisted run, re-attach live handles, refresh source totals
    ///
    /// The refreshed totals are persisted back, so status output reflects a
    /// source that grew or shrank since init. This is the resume entry point:
    /// everything the batch loop needs is rebuilt from this document plus
    /// current configuration.
    pub async fn get_migration(&self, run_id: &str) -> Result<MigrationState> {
        let raw = with_retry(DEFAULT_MAX_RETRY, || {
            self.store.get_doc(&self.config.migration_index, run_id)
        })
        .await
        .map_err(|e| match e {
            StoreError::NotFound(_) | StoreError::IndexNotFound(_) => {
                MigrationError::not_found(run_id)
            }
            other => MigrationError::Store(other),
        })?;
        let mut state: MigrationState = serde_json::from_value(raw)?;
        self.attach_handles(&mut state)?;

        let mut totals = Map::new();
        for (entity_type, entry) in state.stores.iter_mut() {
            let source = entry.source.store.as_ref().ok_or_else(|| {
                MigrationError::invalid_state("source handle missing after attach")
            })?;
            let total = self.store_size(source).await?;
            entry.source.total = total;
            totals.insert(
                entity_type.clone(),
                json!({ "source": { "total": total } }),
            );
        }
        let totals_doc = json!({ "stores": JsonValue::Object(totals) });
        with_retry(DEFAULT_MAX_RETRY, || {
            self.store
                .update_doc(&self.config.migration_index, run_id, &totals_doc)
        })
        .await?;

        Ok(state)
    }

    /// Persist a partial progress update for one entity type
    pub async fn update_migration_store(
        &self,
        run_id: &str,
        entity_type: &str,
        patch: &StorePatch,
    ) -> Result<()> {
        let doc = patch.to_update_doc(entity_type);
        with_retry(DEFAULT_MAX_RETRY, || {
            self.store
                .update_doc(&self.config.migration_index, run_id, &doc)
        })
        .await
        .map_err(|e| match e {
            StoreError::NotFound(_) => MigrationError::not_found(run_id),
            other => MigrationError::Store(other),
        })
    }

    /// Finalize one entity type: revert settings, refresh, stamp completion
    pub async fn finalize_migration_store(
        &self,
        run_id: &str,
        entity_type: &str,
    ) -> Result<MigrationState> {
        let mut state = self.get_migration(run_id).await?;
        let entry = state
            .store_for(entity_type)
            .ok_or_else(|| MigrationError::UnknownEntityType(entity_type.to_string()))?;
        let (_, target) = self.attached_maps(entry)?;

        lifecycle::finalize(self.store.as_ref(), &target).await?;
        let patch = StorePatch::completed_now();
        self.update_migration_store(run_id, entity_type, &patch).await?;
        if let Some(entry) = state.store_for_mut(entity_type) {
            patch.apply(entry);
        }
        info!(run_id, entity_type, "entity type migration completed");
        Ok(state)
    }

    // -------------------------------------------------------------------------
    // Batch loop
    // -------------------------------------------------------------------------

    /// Migrate one entity type end to end
    ///
    /// Resumes from the persisted cursor, copies forward until the source is
    /// exhausted, reconciles deletes recorded since the type's `started`
    /// stamp, then finalizes the target index. Already-completed types are
    /// skipped, which makes relaunching a whole run cheap.
    pub async fn migrate_store(&self, run_id: &str, entity_type: &str) -> Result<()> {
        let mut state = self.get_migration(run_id).await?;
        let entry = state
            .store_for_mut(entity_type)
            .ok_or_else(|| MigrationError::UnknownEntityType(entity_type.to_string()))?;

        if entry.completed.is_some() {
            info!(run_id, entity_type, "already completed, skipping");
            return Ok(());
        }

        let (source, target) = self.attached_maps(entry)?;

        if entry.started.is_none() {
            let patch = StorePatch::started_now();
            self.update_migration_store(run_id, entity_type, &patch).await?;
            patch.apply(entry);
        }
        let started = entry
            .started
            .ok_or_else(|| MigrationError::invalid_state("started stamp missing"))?;

        let sort = sort_spec_for(entity_type);
        let mut migrated = entry.target.migrated;
        let mut cursor = entry.source.search_after.clone();
        let batch_size = self.config.batch_size;

        info!(
            run_id,
            entity_type,
            total = entry.source.total,
            resumed_at = migrated,
            "starting batch loop"
        );

        loop {
            // Unsorted scans have no cursor; the migrated count doubles as
            // the numeric offset.
            let page = pipeline::fetch_batch(
                self.store.as_ref(),
                &source,
                batch_size,
                migrated,
                sort.clone(),
                cursor.clone(),
            )
            .await?;
            let read = page.hits.len();
            if read == 0 {
                break;
            }

            let docs: Vec<(String, JsonValue)> = page
                .hits
                .iter()
                .map(|h| (h.id.clone(), (self.transform)(entity_type, h.source.clone())))
                .collect();
            pipeline::store_batch(self.store.as_ref(), &target, docs).await?;

            migrated += read as u64;
            if !sort.is_unsorted() {
                cursor = page.last_sort().or(cursor);
            }
            self.update_migration_store(
                run_id,
                entity_type,
                &StorePatch::progress(cursor.clone(), migrated),
            )
            .await?;
            debug!(run_id, entity_type, migrated, "checkpointed batch");

            if read < batch_size {
                break;
            }
        }

        info!(run_id, entity_type, migrated, "forward copy complete");

        self.reconcile_deletes(entity_type, started, &target).await?;
        self.finalize_migration_store(run_id, entity_type).await?;
        Ok(())
    }

    /// Remove documents deleted from the source since `since`
    ///
    /// Runs after the forward pass so a document deleted mid-migration is
    /// never resurrected in the target. Skipped when no changelog store is
    /// configured, or for the changelog itself.
    async fn reconcile_deletes(
        &self,
        entity_type: &str,
        since: chrono::DateTime<Utc>,
        target: &StoreMap,
    ) -> Result<()> {
        let Some(event_map) = self.event_map()? else {
            return Ok(());
        };
        if self.config.event_store.as_deref() == Some(entity_type) {
            return Ok(());
        }

        let entity_types = vec![entity_type.to_string()];
        let mut search_after = None;
        let mut removed = 0;
        loop {
            let DeletePage {
                deleted,
                search_after: next,
                count,
            } = pipeline::fetch_deletes(
                self.store.as_ref(),
                &event_map,
                &entity_types,
                since,
                self.config.batch_size,
                search_after,
            )
            .await?;

            if let Some(ids) = deleted.get(entity_type) {
                removed += pipeline::batch_delete(self.store.as_ref(), target, ids).await?;
            }
            if count == 0 || next.is_none() {
                break;
            }
            search_after = next;
        }
        if removed > 0 {
            info!(entity_type, removed, "reconciled mid-migration deletes");
        }
        Ok(())
    }

    /// Migrate every entity type of a run, in parallel across types
    ///
    /// One worker per entity type, bounded by the configured concurrency.
    /// Workers are independent — separate cursors, separate target indices,
    /// disjoint sub-maps of the run document — so a failure in one type does
    /// not roll back others; the first error is reported after all workers
    /// settle.
    pub async fn run(&self, run_id: &str) -> Result<MigrationState> {
        let state = self.get_migration(run_id).await?;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut workers: JoinSet<Result<String>> = JoinSet::new();

        for entity_type in state.stores.keys().cloned() {
            let migrator = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let run_id = run_id.to_string();
            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| MigrationError::Join(e.to_string()))?;
                migrator.migrate_store(&run_id, &entity_type).await?;
                Ok(entity_type)
            });
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(entity_type)) => {
                    debug!(run_id, %entity_type, "worker finished");
                }
                Ok(Err(e)) => {
                    error!(run_id, error = %e, "entity type migration failed");
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    first_error.get_or_insert(MigrationError::Join(join_err.to_string()));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        self.get_migration(run_id).await
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn ensure_migration_index(&self) -> Result<()> {
        let index = &self.config.migration_index;
        if !with_retry(DEFAULT_MAX_RETRY, || self.store.index_exists(index)).await? {
            let body = json!({ "settings": {} });
            with_retry(DEFAULT_MAX_RETRY, || self.store.create_index(index, &body)).await?;
        }
        Ok(())
    }

    async fn migration_doc_exists(&self, run_id: &str) -> Result<bool> {
        let found = with_retry(DEFAULT_MAX_RETRY, || {
            self.store.get_doc(&self.config.migration_index, run_id)
        })
        .await;
        match found {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Source document count, through the retry wrapper
    async fn store_size(&self, map: &StoreMap) -> Result<u64> {
        Ok(with_retry(DEFAULT_MAX_RETRY, || self.store.count(&map.indexname)).await?)
    }
}
