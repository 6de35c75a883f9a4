//! Search request/response types and cursor pagination
//!
//! The query model is a small typed subset of the store's query DSL — just
//! what the migration engine needs (match-all scans, term/range filters for
//! the delete changelog). Backends either serialize it to the wire DSL
//! ([`Query::to_dsl`]) or evaluate it directly (the memory backend).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::cmp::Ordering;

/// Default page size for scans.
pub const DEFAULT_PAGE_SIZE: usize = 100;

// =============================================================================
// Queries
// =============================================================================

/// Typed query subset understood by all backends
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Match every document in the index
    MatchAll,
    /// Exact match on a single field value
    Term { field: String, value: JsonValue },
    /// Match any of the given values on a field
    Terms { field: String, values: Vec<JsonValue> },
    /// Field value greater than or equal to the bound
    RangeGte { field: String, value: JsonValue },
    /// All sub-queries must match
    Bool { filter: Vec<Query> },
}

impl Query {
    /// Exact-match helper
    pub fn term(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Any-of helper
    pub fn terms(field: impl Into<String>, values: Vec<JsonValue>) -> Self {
        Query::Terms {
            field: field.into(),
            values,
        }
    }

    /// Greater-or-equal range helper
    pub fn range_gte(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Query::RangeGte {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Serialize to the store's wire query DSL
    pub fn to_dsl(&self) -> JsonValue {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Term { field, value } => json!({ "term": { (field.clone()): value.clone() } }),
            Query::Terms { field, values } => {
                json!({ "terms": { (field.clone()): values.clone() } })
            }
            Query::RangeGte { field, value } => {
                json!({ "range": { (field.clone()): { "gte": value.clone() } } })
            }
            Query::Bool { filter } => {
                let clauses: Vec<JsonValue> = filter.iter().map(Query::to_dsl).collect();
                json!({ "bool": { "filter": clauses } })
            }
        }
    }
}

// =============================================================================
// Sorting
// =============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Wire representation (`"asc"` / `"desc"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// One sort field with its direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub order: SortOrder,
}

/// Sort specification for a paginated scan
///
/// Cursor pagination needs a total order over ties, so scan sort specs end
/// with a unique tiebreak field (the internal document id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub fields: Vec<SortField>,
}

impl SortSpec {
    /// No sort (index order); cursor resumption is not meaningful
    pub fn unsorted() -> Self {
        Self { fields: Vec::new() }
    }

    /// Ascending sort over the given fields, in order
    pub fn ascending<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| SortField {
                    field: f.into(),
                    order: SortOrder::Asc,
                })
                .collect(),
        }
    }

    /// True when no sort fields are specified
    pub fn is_unsorted(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize to the wire sort clause
    pub fn to_dsl(&self) -> JsonValue {
        JsonValue::Array(
            self.fields
                .iter()
                .map(|f| json!({ (f.field.clone()): { "order": f.order.as_str() } }))
                .collect(),
        )
    }
}

// =============================================================================
// Options & results
// =============================================================================

/// Options for one paginated search call
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Page size
    pub size: usize,
    /// Numeric offset; ignored when `search_after` is present
    pub from: Option<u64>,
    /// Sort specification
    pub sort: SortSpec,
    /// Cursor from the previous page's last hit
    pub search_after: Option<Vec<JsonValue>>,
}

impl SearchOptions {
    /// Scan options: ascending sort, given page size, no cursor yet
    pub fn scan(size: usize, sort: SortSpec) -> Self {
        Self {
            size,
            from: None,
            sort,
            search_after: None,
        }
    }

    /// Same options resumed from the given cursor
    pub fn after(mut self, cursor: Option<Vec<JsonValue>>) -> Self {
        self.search_after = cursor;
        self
    }
}

/// One document returned by a search
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Internal document id
    pub id: String,
    /// Document body
    pub source: JsonValue,
    /// Sort-key values for this hit; feeds the next page's `search_after`
    pub sort: Vec<JsonValue>,
}

/// One page of search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub hits: Vec<Hit>,
    /// Total matching documents (not just this page)
    pub total: u64,
}

impl SearchPage {
    /// Cursor for the page after this one, if any hits were returned
    pub fn last_sort(&self) -> Option<Vec<JsonValue>> {
        self.hits.last().map(|h| h.sort.clone())
    }
}

/// Compare two sort-key tuples, element-wise
///
/// Supports the value kinds sort fields produce: null, booleans, numbers,
/// strings. Nulls sort first; mixed kinds compare by kind rank. Used by the
/// memory backend's cursor slicing and by cursor-monotonicity assertions.
pub fn cmp_sort_values(a: &[JsonValue], b: &[JsonValue]) -> Ordering {
    for (left, right) in a.iter().zip(b.iter()) {
        let ord = cmp_json(left, right);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn kind_rank(v: &JsonValue) -> u8 {
    match v {
        JsonValue::Null => 0,
        JsonValue::Bool(_) => 1,
        JsonValue::Number(_) => 2,
        JsonValue::String(_) => 3,
        JsonValue::Array(_) => 4,
        JsonValue::Object(_) => 5,
    }
}

fn cmp_json(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => Ordering::Equal,
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}
