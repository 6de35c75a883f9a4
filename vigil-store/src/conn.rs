//! Connection configuration and handles
//!
//! A [`Conn`] is an explicit context object passed to everything that talks to
//! the document store. There is no process-wide connection slot: callers build
//! a `Conn` at run start and drop it at run end.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default request timeout for interactive operations.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Request timeout used for bulk/migration connections.
///
/// Bulk indexing against a loaded cluster can stall for minutes while the
/// store's write queues drain, so migration connections use a deliberately
/// long timeout instead of the interactive default.
pub const BULK_TIMEOUT_SECS: u64 = 300;

/// Connection configuration for a document store endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnConfig {
    /// Base URL of the store, e.g. `http://localhost:9200`
    pub endpoint: String,

    /// Request timeout in seconds.
    ///
    /// Default: 30. Migration connections override this to
    /// [`BULK_TIMEOUT_SECS`].
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional basic-auth credentials (`user:password`)
    #[serde(default)]
    pub auth: Option<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ConnConfig {
    /// Create a config for the given endpoint with the interactive timeout
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            auth: None,
        }
    }

    /// Copy of this config with the timeout raised for bulk operations
    pub fn for_bulk(&self) -> Self {
        Self {
            timeout_secs: BULK_TIMEOUT_SECS,
            ..self.clone()
        }
    }
}

/// A pooled HTTP connection to a document store
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Conn {
    config: ConnConfig,
    http: reqwest::Client,
}

impl Conn {
    /// Build a connection from configuration
    pub fn connect(config: ConnConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(StoreError::invalid_config("endpoint must not be empty"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    /// The connection configuration
    pub fn config(&self) -> &ConnConfig {
        &self.config
    }

    /// Base URL of the store
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// The underlying HTTP client
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Apply configured authentication to a request
    pub fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.auth.as_deref().and_then(|a| a.split_once(':')) {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }
}
