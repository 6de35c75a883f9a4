//! Flattened store views and index-name derivation
//!
//! A [`StoreMap`] is the unit the migration pipeline works with: one index,
//! one document type, one connection. It is a cheap, recomputable view over a
//! logical store definition — never the source of truth for migration
//! progress (the persisted migration document is).

use crate::conn::{Conn, ConnConfig};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Leading version segment of an index name: `v<anything-but-underscore>_`.
///
/// Stripped unconditionally before re-prefixing. An index whose name
/// legitimately starts with such a segment will have it stripped too; that
/// behavior is deliberate and pinned by tests.
static VERSION_PREFIX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^v[^_]*_").unwrap());

/// Derive a target index name from a source index name and a generation prefix
///
/// Strips any leading `v<token>_` segment and applies `v<prefix>_`. The
/// derivation is idempotent once the leading segment is normalized:
/// re-deriving an already-derived name with the same prefix is stable.
pub fn target_index_name(prefix: &str, index: &str) -> String {
    format!("v{}_{}", prefix, VERSION_PREFIX.replace(index, ""))
}

/// Logical definition of one entity store, as configured
///
/// This is what operators put in the config file; it stays valid across
/// process restarts, which is what makes source handles recomputable on
/// resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDef {
    /// Index this store reads and writes
    pub indexname: String,

    /// Document type within the index
    #[serde(default = "default_doc_type")]
    pub doc_type: String,

    /// Mapping definition pushed as an index template
    #[serde(default)]
    pub mapping: JsonValue,

    /// Production index settings (replicas, refresh interval, shards, analysis)
    #[serde(default)]
    pub settings: JsonValue,

    /// Additional store properties (aliases, defaults), carried opaquely
    #[serde(default)]
    pub props: BTreeMap<String, JsonValue>,
}

fn default_doc_type() -> String {
    "_doc".to_string()
}

impl StoreDef {
    /// Create a minimal definition for the given index
    pub fn new(indexname: impl Into<String>) -> Self {
        Self {
            indexname: indexname.into(),
            doc_type: default_doc_type(),
            mapping: JsonValue::Null,
            settings: JsonValue::Null,
            props: BTreeMap::new(),
        }
    }

    /// Set production settings
    pub fn with_settings(mut self, settings: JsonValue) -> Self {
        self.settings = settings;
        self
    }

    /// Set the mapping definition
    pub fn with_mapping(mut self, mapping: JsonValue) -> Self {
        self.mapping = mapping;
        self
    }
}

/// A live store handle bound to one index
///
/// Flattened view of a [`StoreDef`] plus a connection whose timeout is raised
/// for bulk operations. Uniform across source and target so the pipeline
/// never special-cases the two sides.
#[derive(Debug, Clone)]
pub struct StoreMap {
    /// Connection to the store endpoint (bulk timeout applied)
    pub conn: Conn,
    /// Index this handle is bound to
    pub indexname: String,
    /// Document type within the index
    pub doc_type: String,
    /// Mapping definition for index creation
    pub mapping: JsonValue,
    /// Production settings for this index
    pub settings: JsonValue,
    /// Connection configuration the handle was built from
    pub config: ConnConfig,
    /// Opaque store properties
    pub props: BTreeMap<String, JsonValue>,
}

impl StoreMap {
    /// Build a live handle for a store definition
    ///
    /// The connection timeout is overridden to the long bulk value; see
    /// [`crate::conn::BULK_TIMEOUT_SECS`].
    pub fn from_def(config: &ConnConfig, def: &StoreDef) -> Result<Self> {
        let bulk_config = config.for_bulk();
        let conn = Conn::connect(bulk_config.clone())?;
        Ok(Self {
            conn,
            indexname: def.indexname.clone(),
            doc_type: def.doc_type.clone(),
            mapping: def.mapping.clone(),
            settings: def.settings.clone(),
            config: bulk_config,
            props: def.props.clone(),
        })
    }

    /// View of this handle re-bound to a different index
    ///
    /// Used to point a source handle's definition at the derived target index.
    pub fn for_index(&self, indexname: impl Into<String>) -> Self {
        Self {
            indexname: indexname.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_target_index_name_plain() {
        assert_eq!(target_index_name("1.2.0", "intel_indicator"), "v1.2.0_intel_indicator");
    }

    #[test]
    fn test_target_index_name_strips_existing_version() {
        assert_eq!(
            target_index_name("1.2.0", "v1.1.0_intel_indicator"),
            "v1.2.0_intel_indicator"
        );
    }

    #[test]
    fn test_target_index_name_idempotent() {
        let once = target_index_name("2.0", "v1.0_sighting");
        let twice = target_index_name("2.0", &once);
        assert_eq!(once, twice);
        assert_eq!(once, "v2.0_sighting");
    }

    // An index legitimately named with a leading v<token>_ segment loses that
    // segment. Documented edge case, not a bug: the stripping rule cannot
    // distinguish a user segment from a version tag.
    #[test]
    fn test_target_index_name_strips_user_segment() {
        assert_eq!(target_index_name("3", "vendor_feed"), "v3_feed");
        // A leading segment containing an underscore-free token is always
        // treated as a version tag...
        assert_eq!(target_index_name("3", "v2abc_feed"), "v3_feed");
        // ...but a name with no such segment is left intact.
        assert_eq!(target_index_name("3", "feed_vendor"), "v3_feed_vendor");
    }

    #[test]
    fn test_store_map_overrides_timeout() {
        let config = ConnConfig::new("http://localhost:9200");
        let def = StoreDef::new("intel_event");
        let map = StoreMap::from_def(&config, &def).expect("handle should build");
        assert_eq!(map.config.timeout_secs, crate::conn::BULK_TIMEOUT_SECS);
        assert_eq!(map.indexname, "intel_event");
        assert_eq!(map.doc_type, "_doc");
    }

    #[test]
    fn test_for_index_rebinds() {
        let config = ConnConfig::new("http://localhost:9200");
        let map = StoreMap::from_def(&config, &StoreDef::new("intel_event")).unwrap();
        let target = map.for_index("v2_intel_event");
        assert_eq!(target.indexname, "v2_intel_event");
        assert_eq!(target.doc_type, map.doc_type);
    }
}
