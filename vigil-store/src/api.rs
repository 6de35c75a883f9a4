//! The document-store operation set consumed by the migration engine
//!
//! [`DocStore`] is the seam between the engine and a concrete backend. It is
//! intentionally not a general CRUD layer: it carries exactly the operations
//! the engine needs — counting, cursor-paginated search, bulk create,
//! per-document delete, index administration, and single-document
//! get/create/update for the migration record itself.

use crate::error::Result;
use crate::retry::{with_retry, DEFAULT_MAX_RETRY};
use crate::search::{Query, SearchOptions, SearchPage};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt::Debug;

/// Backend-agnostic document store operations
#[async_trait]
pub trait DocStore: Debug + Send + Sync {
    // -------------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------------

    /// Count all documents in an index
    async fn count(&self, index: &str) -> Result<u64>;

    /// Paginated search with sort and `search_after`
    async fn search(&self, index: &str, query: &Query, options: &SearchOptions)
        -> Result<SearchPage>;

    /// Bulk-create documents with explicit ids
    ///
    /// Writing an id that already exists overwrites that document; re-writing
    /// a page after an unpersisted checkpoint is therefore safe. Callers must
    /// pre-chunk so a single request stays under the backend's body cap.
    async fn bulk_create(
        &self,
        index: &str,
        doc_type: &str,
        docs: &[(String, JsonValue)],
    ) -> Result<()>;

    /// Delete one document by id; `Ok(false)` when it did not exist
    async fn delete_doc(&self, index: &str, id: &str) -> Result<bool>;

    /// Get one document by id
    ///
    /// Returns `StoreError::NotFound` when absent.
    async fn get_doc(&self, index: &str, id: &str) -> Result<JsonValue>;

    /// Create one document with an explicit id
    async fn create_doc(&self, index: &str, id: &str, doc: &JsonValue) -> Result<()>;

    /// Partially update one document
    ///
    /// `partial` is deep-merged into the stored document field-path by
    /// field-path, so concurrent updates to disjoint sub-maps do not clobber
    /// each other.
    async fn update_doc(&self, index: &str, id: &str, partial: &JsonValue) -> Result<()>;

    // -------------------------------------------------------------------------
    // Index administration
    // -------------------------------------------------------------------------

    /// True when the index exists
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create an index with the given settings body
    async fn create_index(&self, index: &str, settings: &JsonValue) -> Result<()>;

    /// Delete an index; succeeds when it did not exist
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Install an index template
    async fn put_template(&self, name: &str, template: &JsonValue) -> Result<()>;

    /// Update live index settings
    async fn update_settings(&self, index: &str, settings: &JsonValue) -> Result<()>;

    /// Current settings of an index
    async fn get_settings(&self, index: &str) -> Result<JsonValue>;

    /// Force a refresh so recent writes become searchable
    async fn refresh(&self, index: &str) -> Result<()>;
}

/// Lazy page sequence over a cursor-paginated scan
///
/// Produces one page per `next` call and terminates when a page comes back
/// shorter than the requested size. Never buffers more than the current page;
/// callers that need full materialization collect explicitly. Each fetch goes
/// through the bounded retry wrapper like every other remote call.
pub struct Pages<'a> {
    store: &'a dyn DocStore,
    index: String,
    query: Query,
    options: SearchOptions,
    exhausted: bool,
}

impl<'a> Pages<'a> {
    /// Start a scan over `index` with the given query and options
    pub fn new(
        store: &'a dyn DocStore,
        index: impl Into<String>,
        query: Query,
        options: SearchOptions,
    ) -> Self {
        Self {
            store,
            index: index.into(),
            query,
            options,
            exhausted: false,
        }
    }

    /// Cursor the next fetch would resume from
    pub fn cursor(&self) -> Option<&Vec<JsonValue>> {
        self.options.search_after.as_ref()
    }

    /// Fetch the next page, or `None` once the scan is exhausted
    pub async fn next(&mut self) -> Result<Option<SearchPage>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = with_retry(DEFAULT_MAX_RETRY, || {
            self.store.search(&self.index, &self.query, &self.options)
        })
        .await?;
        if page.hits.len() < self.options.size {
            self.exhausted = true;
        }
        if self.options.sort.is_unsorted() {
            // No total order to resume from: fall back to numeric offsets.
            let from = self.options.from.unwrap_or(0);
            self.options.from = Some(from + page.hits.len() as u64);
        } else {
            match page.last_sort() {
                Some(cursor) => self.options.search_after = Some(cursor),
                None => self.exhausted = true,
            }
            // Offsets only position the first page; cursors take over afterwards.
            self.options.from = None;
        }
        if page.hits.is_empty() {
            return Ok(None);
        }
        Ok(Some(page))
    }
}

impl std::fmt::Debug for Pages<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pages")
            .field("index", &self.index)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}
