//! Collaborator interfaces and in-memory implementations.
//!
//! The core never talks to a database directly. Hosts provide:
//! - `KeyValueStore` for the index, usage maps, scan state, settings and log
//! - `DocumentStore` for content, types, status, titles and permalinks
//! - `RuleMetaStore` for the rules and overrides stored on each document
//!
//! All methods take `&self`; execution is single-threaded, so the in-memory
//! versions use `RefCell` the way the wasm bindings keep their state.

pub mod memory;

pub use memory::{DocumentRecord, MemoryDocuments, MemoryRuleMeta, MemoryStore};

use crate::error::StoreError;
use crate::rules::{DocId, DocumentRuleMeta};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys used in the key/value store.
pub mod keys {
    pub const SETTINGS: &str = "linkcore_settings";
    pub const INDEX: &str = "linkcore_index";
    pub const EXTERNAL_RULES: &str = "linkcore_external_rules";
    pub const USAGE_INTERNAL: &str = "linkcore_usage_internal";
    pub const USAGE_EXTERNAL: &str = "linkcore_usage_external";
    pub const SCAN_STATE: &str = "linkcore_scan_state";
    pub const SCAN_SUMMARY: &str = "linkcore_scan_summary";
    pub const ACTIVITY_LOG: &str = "linkcore_activity_log";
    pub const REBUILD_ERROR: &str = "linkcore_rebuild_error";
}

// =============================================================================
// Key/Value
// =============================================================================

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    /// Replace the value in one step
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed read. Missing keys are `None`; malformed values are an error.
pub fn load<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError> {
    match kv.get(key)? {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| StoreError::Serde { key: key.to_string(), reason: e.to_string() }),
    }
}

/// Typed read falling back to `T::default()` for missing or malformed values.
pub fn load_or_default<T: DeserializeOwned + Default>(kv: &dyn KeyValueStore, key: &str) -> Result<T, StoreError> {
    match load(kv, key) {
        Ok(v) => Ok(v.unwrap_or_default()),
        Err(StoreError::Serde { key, reason }) => {
            tracing::warn!(key = %key, reason = %reason, "discarding malformed stored value");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

pub fn save<T: Serialize>(kv: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    let v = serde_json::to_value(value).map_err(|e| StoreError::Serde { key: key.to_string(), reason: e.to_string() })?;
    kv.set(key, v)
}

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    #[default]
    Publish,
    Draft,
    Pending,
    Private,
    Trash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Published,
    Any,
}

impl StatusFilter {
    pub fn accepts(self, status: DocStatus) -> bool {
        match self {
            StatusFilter::Published => status == DocStatus::Publish,
            StatusFilter::Any => true,
        }
    }
}

pub trait DocumentStore {
    fn content(&self, id: DocId) -> Option<String>;
    fn doc_type(&self, id: DocId) -> Option<String>;
    fn status(&self, id: DocId) -> Option<DocStatus>;
    fn title(&self, id: DocId) -> Option<String>;
    fn resolve_url(&self, id: DocId) -> Option<String>;
    /// Ids of documents of `types` passing `filter`, ascending
    fn enumerate_ids(&self, types: &[String], filter: StatusFilter) -> Result<Vec<DocId>, StoreError>;
    /// Sitemap-style provider of public document ids, when the host has one
    fn sitemap_ids(&self, _types: &[String]) -> Option<Vec<DocId>> {
        None
    }
}

// =============================================================================
// Rule Metadata
// =============================================================================

pub trait RuleMetaStore {
    /// Stored rules for `id`; a document without metadata yields the default record
    fn read(&self, id: DocId) -> Result<DocumentRuleMeta, StoreError>;
    fn write(&self, id: DocId, meta: &DocumentRuleMeta) -> Result<(), StoreError>;
    fn clear(&self, id: DocId) -> Result<(), StoreError>;
    /// Every document that has metadata
    fn ids(&self) -> Result<Vec<DocId>, StoreError>;
}
