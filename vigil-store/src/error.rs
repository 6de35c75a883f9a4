//! Error types for vigil-store

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Document-store access errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store returned a status code we did not expect for this operation
    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// Document not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Index not found
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// One or more items of a bulk request were rejected
    #[error("Bulk request rejected {failed} of {total} items: {first_reason}")]
    BulkRejected {
        failed: usize,
        total: usize,
        first_reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        StoreError::NotFound(msg.into())
    }

    /// Create an index not found error
    pub fn index_not_found(index: impl Into<String>) -> Self {
        StoreError::IndexNotFound(index.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        StoreError::InvalidConfig(msg.into())
    }

    /// True for the "document/index does not exist" family of errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::IndexNotFound(_))
    }
}
