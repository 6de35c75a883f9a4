//! Document-store access layer for Vigil
//!
//! This crate provides everything the migration engine needs to talk to a
//! document store, behind one backend-agnostic trait:
//!
//! - [`DocStore`]: the consumed operation set (count, cursor search, bulk
//!   create, per-document delete, index administration, migration-record
//!   get/create/update)
//! - [`HttpStore`]: Elasticsearch-compatible REST backend
//! - [`MemoryStore`]: in-memory backend for tests
//! - [`StoreMap`] / [`StoreDef`]: flattened per-index store views with the
//!   long bulk timeout applied
//! - [`with_retry`]: bounded retry-on-error for every remote call
//! - [`Pages`]: lazy, one-page-buffered cursor scans

pub mod api;
pub mod conn;
pub mod error;
pub mod http;
pub mod memory;
pub mod retry;
pub mod search;
pub mod store_map;

pub use api::{DocStore, Pages};
pub use conn::{Conn, ConnConfig, BULK_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
pub use error::{Result, StoreError};
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use retry::{with_retry, DEFAULT_MAX_RETRY};
pub use search::{
    cmp_sort_values, Hit, Query, SearchOptions, SearchPage, SortField, SortOrder, SortSpec,
    DEFAULT_PAGE_SIZE,
};
pub use store_map::{target_index_name, StoreDef, StoreMap};
