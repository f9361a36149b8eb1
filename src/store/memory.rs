//! In-memory stores, used by the wasm bindings and by tests.

use super::{DocStatus, DocumentStore, KeyValueStore, RuleMetaStore, StatusFilter};
use crate::error::StoreError;
use crate::rules::{DocId, DocumentRuleMeta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.borrow_mut().remove(key);
        Ok(())
    }
}

// =============================================================================
// MemoryDocuments
// =============================================================================

/// A document as hydrated from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocId,
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    #[serde(default)]
    pub status: DocStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: String,
}

fn default_doc_type() -> String {
    "post".to_string()
}

impl DocumentRecord {
    pub fn new(id: DocId, doc_type: &str, content: &str) -> Self {
        Self {
            id,
            doc_type: doc_type.to_string(),
            status: DocStatus::Publish,
            title: format!("Document {}", id),
            url: Some(format!("/?p={}", id)),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocuments {
    docs: RefCell<BTreeMap<DocId, DocumentRecord>>,
    sitemap: RefCell<Option<Vec<DocId>>>,
    unavailable: Cell<bool>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: DocumentRecord) {
        self.docs.borrow_mut().insert(record.id, record);
    }

    pub fn remove(&self, id: DocId) -> Option<DocumentRecord> {
        self.docs.borrow_mut().remove(&id)
    }

    pub fn get(&self, id: DocId) -> Option<DocumentRecord> {
        self.docs.borrow().get(&id).cloned()
    }

    pub fn set_content(&self, id: DocId, content: &str) {
        if let Some(doc) = self.docs.borrow_mut().get_mut(&id) {
            doc.content = content.to_string();
        }
    }

    pub fn set_status(&self, id: DocId, status: DocStatus) {
        if let Some(doc) = self.docs.borrow_mut().get_mut(&id) {
            doc.status = status;
        }
    }

    /// Install a sitemap provider; ids are returned as given
    pub fn set_sitemap(&self, ids: Option<Vec<DocId>>) {
        *self.sitemap.borrow_mut() = ids;
    }

    /// Make enumeration fail, as an unreachable database would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.set(unavailable);
    }

    pub fn len(&self) -> usize {
        self.docs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.borrow().is_empty()
    }
}

impl DocumentStore for MemoryDocuments {
    fn content(&self, id: DocId) -> Option<String> {
        self.docs.borrow().get(&id).map(|d| d.content.clone())
    }

    fn doc_type(&self, id: DocId) -> Option<String> {
        self.docs.borrow().get(&id).map(|d| d.doc_type.clone())
    }

    fn status(&self, id: DocId) -> Option<DocStatus> {
        self.docs.borrow().get(&id).map(|d| d.status)
    }

    fn title(&self, id: DocId) -> Option<String> {
        self.docs.borrow().get(&id).map(|d| d.title.clone())
    }

    fn resolve_url(&self, id: DocId) -> Option<String> {
        self.docs.borrow().get(&id).and_then(|d| d.url.clone()).filter(|u| !u.is_empty())
    }

    fn enumerate_ids(&self, types: &[String], filter: StatusFilter) -> Result<Vec<DocId>, StoreError> {
        if self.unavailable.get() {
            return Err(StoreError::Unavailable("document query failed".to_string()));
        }
        Ok(self
            .docs
            .borrow()
            .values()
            .filter(|d| types.iter().any(|t| *t == d.doc_type) && filter.accepts(d.status))
            .map(|d| d.id)
            .collect())
    }

    fn sitemap_ids(&self, _types: &[String]) -> Option<Vec<DocId>> {
        self.sitemap.borrow().clone()
    }
}

// =============================================================================
// MemoryRuleMeta
// =============================================================================

/// Rule metadata kept as raw JSON, so reads go through the same migration
/// path as host-stored records.
#[derive(Debug, Default)]
pub struct MemoryRuleMeta {
    records: RefCell<BTreeMap<DocId, Value>>,
}

impl MemoryRuleMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw record as a host would have written it
    pub fn put_raw(&self, id: DocId, raw: Value) {
        self.records.borrow_mut().insert(id, raw);
    }
}

impl RuleMetaStore for MemoryRuleMeta {
    fn read(&self, id: DocId) -> Result<DocumentRuleMeta, StoreError> {
        let Some(raw) = self.records.borrow().get(&id).cloned() else {
            return Ok(DocumentRuleMeta::default());
        };
        let meta: DocumentRuleMeta = serde_json::from_value(raw)
            .map_err(|e| StoreError::Serde { key: format!("rules:{}", id), reason: e.to_string() })?;
        meta.migrate()
    }

    fn write(&self, id: DocId, meta: &DocumentRuleMeta) -> Result<(), StoreError> {
        let v = serde_json::to_value(meta)
            .map_err(|e| StoreError::Serde { key: format!("rules:{}", id), reason: e.to_string() })?;
        self.records.borrow_mut().insert(id, v);
        Ok(())
    }

    fn clear(&self, id: DocId) -> Result<(), StoreError> {
        self.records.borrow_mut().remove(&id);
        Ok(())
    }

    fn ids(&self) -> Result<Vec<DocId>, StoreError> {
        Ok(self.records.borrow().keys().copied().collect())
    }
}
