//! Error types for the migration engine

use thiserror::Error;

/// Result type alias using MigrationError
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Migration engine errors
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Error from the document-store layer
    #[error("Store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    /// No persisted migration document with this id
    ///
    /// Reported immediately, never retried.
    #[error("Migration not found: {id}")]
    MigrationNotFound { id: String },

    /// Entity type is not configured for this run
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Persisted state does not permit the requested transition
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// A per-entity-type worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Join(String),

    /// Serialization error on a persisted document
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrationError {
    /// Create a migration-not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        MigrationError::MigrationNotFound { id: id.into() }
    }

    /// Create an invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        MigrationError::InvalidState(msg.into())
    }
}
