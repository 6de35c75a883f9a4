//! Live index-migration engine for Vigil
//!
//! Moves all documents of every configured entity type from a source index
//! generation to a newly created target generation — without downtime, with
//! resumability after partial failure, and with bounded memory via
//! cursor-based pagination.
//!
//! The engine is organized as:
//!
//! - [`state`]: the persisted run document — the single source of truth for
//!   progress
//! - [`lifecycle`]: target-index creation (write-optimized) and finalization
//!   (production settings + refresh)
//! - [`pipeline`]: the batch fetch/transform/store loop and delete
//!   reconciliation
//! - [`orchestrator`]: the [`Migrator`] context driving per-type state
//!   machines, in parallel across entity types
//!
//! There is no all-or-nothing guarantee: progress is checkpointed after every
//! batch, and relaunching a run resumes from the last durable cursor.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod pipeline;
pub mod state;

pub use config::{MigrationConfig, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};
pub use error::{MigrationError, Result};
pub use orchestrator::Migrator;
pub use pipeline::{identity_transform, sort_spec_for, TransformFn, MAX_BULK_BYTES};
pub use state::{
    MigratedStore, MigrationState, SourceState, StorePatch, TargetState,
    DEFAULT_MIGRATION_INDEX,
};
