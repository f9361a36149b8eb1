//! JS bindings: `LinkEngine` wraps a `LinkManager` over in-memory stores.
//!
//! The host hydrates documents and rule metadata, then calls `render` /
//! `renderDocument` per page view and drives scans with `scanStep`.
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { LinkEngine } from 'linkcore';
//!
//! await init();
//! const engine = new LinkEngine();
//! engine.upsertDocument({ id: 7, doc_type: 'post', url: '/rust', title: 'Rust', content: '<p>...</p>' });
//! engine.setDocumentRules(7, { rules: ['rust', { phrase: 'rustlang', case: true }] });
//! const html = engine.render('<p>I like rust</p>', { source: 9, doc_type: 'post' });
//! ```

use crate::config::Settings;
use crate::engine::LinkManager;
use crate::rewriter::RenderContext;
use crate::rules::{DocId, DocumentRuleMeta};
use crate::store::{DocStatus, DocumentRecord, MemoryDocuments, MemoryRuleMeta, MemoryStore};
use serde::Serialize;
use std::fmt::Display;
use wasm_bindgen::prelude::*;

fn js_err(context: &str, e: impl Display) -> JsValue {
    js_sys::Error::new(&format!("{}: {}", context, e)).into()
}

/// Plain JS objects (string keys), not `Map`s.
fn to_js<T: Serialize>(value: &T) -> JsValue {
    let json = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            web_sys::console::error_1(&format!("[LinkEngine] Serialization failed: {:?}", e).into());
            return JsValue::NULL;
        }
    };
    json.serialize(&serde_wasm_bindgen::Serializer::json_compatible()).unwrap_or(JsValue::NULL)
}

// =============================================================================
// LinkEngine
// =============================================================================

#[wasm_bindgen]
pub struct LinkEngine {
    inner: LinkManager<MemoryStore, MemoryDocuments, MemoryRuleMeta>,
}

impl Default for LinkEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkEngine {
    pub fn new() -> Self {
        Self { inner: LinkManager::new(MemoryStore::new(), MemoryDocuments::new(), MemoryRuleMeta::new()) }
    }

    pub fn manager(&self) -> &LinkManager<MemoryStore, MemoryDocuments, MemoryRuleMeta> {
        &self.inner
    }
}

#[wasm_bindgen]
impl LinkEngine {
    #[wasm_bindgen(constructor)]
    pub fn js_new() -> Self {
        Self::new()
    }

    // -------------------------------------------------------------------------
    // Hydration
    // -------------------------------------------------------------------------

    /// Add or replace a document: `{ id, doc_type?, status?, title?, url?, content? }`
    #[wasm_bindgen(js_name = upsertDocument)]
    pub fn js_upsert_document(&self, record: JsValue) -> Result<(), JsValue> {
        let record: DocumentRecord =
            serde_wasm_bindgen::from_value(record).map_err(|e| js_err("Invalid document", e))?;
        self.inner.docs().insert(record);
        Ok(())
    }

    /// Change a document's status ("publish", "draft", ...). Publishing rebuilds the index.
    #[wasm_bindgen(js_name = setDocumentStatus)]
    pub fn js_set_document_status(&self, id: u32, status: &str) -> Result<JsValue, JsValue> {
        let status: DocStatus =
            serde_json::from_value(serde_json::Value::String(status.to_string())).map_err(|e| js_err("Invalid status", e))?;
        self.inner.docs().set_status(id as DocId, status);
        if status != DocStatus::Publish {
            let report = self.inner.rebuild_index().map_err(|e| js_err("Rebuild failed", e))?;
            return Ok(to_js(&report));
        }
        let summary = self.inner.on_document_published(id as DocId).map_err(|e| js_err("Publish failed", e))?;
        Ok(to_js(&summary))
    }

    #[wasm_bindgen(js_name = removeDocument)]
    pub fn js_remove_document(&self, id: u32) -> Result<(), JsValue> {
        self.inner.docs().remove(id as DocId);
        self.inner.on_document_deleted(id as DocId).map_err(|e| js_err("Delete failed", e))
    }

    /// Store the phrase rules of a destination document. Returns true when the index was rebuilt.
    #[wasm_bindgen(js_name = setDocumentRules)]
    pub fn js_set_document_rules(&self, id: u32, meta: JsValue) -> Result<bool, JsValue> {
        let meta: DocumentRuleMeta =
            serde_wasm_bindgen::from_value(meta).map_err(|e| js_err("Invalid rule metadata", e))?;
        let meta = meta.migrate().map_err(|e| js_err("Invalid rule metadata", e))?;
        self.inner.update_document_rules(id as DocId, meta).map_err(|e| js_err("Saving rules failed", e))
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    #[wasm_bindgen(js_name = getSettings)]
    pub fn js_get_settings(&self) -> Result<JsValue, JsValue> {
        let settings = self.inner.settings().map_err(|e| js_err("Loading settings failed", e))?;
        Ok(to_js(&settings))
    }

    #[wasm_bindgen(js_name = saveSettings)]
    pub fn js_save_settings(&self, settings: JsValue) -> Result<JsValue, JsValue> {
        let settings: Settings =
            serde_wasm_bindgen::from_value(settings).map_err(|e| js_err("Invalid settings", e))?;
        let saved = self.inner.save_settings(settings).map_err(|e| js_err("Saving settings failed", e))?;
        Ok(to_js(&saved))
    }

    #[wasm_bindgen(js_name = saveExternalRules)]
    pub fn js_save_external_rules(&self, rules: JsValue) -> Result<JsValue, JsValue> {
        let raw: serde_json::Value =
            serde_wasm_bindgen::from_value(rules).map_err(|e| js_err("Invalid external rules", e))?;
        let saved = self.inner.save_external_rules(&raw).map_err(|e| js_err("Saving external rules failed", e))?;
        Ok(to_js(&saved))
    }

    #[wasm_bindgen(js_name = rebuildIndex)]
    pub fn js_rebuild_index(&self) -> Result<JsValue, JsValue> {
        let report = self.inner.rebuild_index().map_err(|e| js_err("Rebuild failed", e))?;
        Ok(to_js(&report))
    }

    #[wasm_bindgen(js_name = indexSummary)]
    pub fn js_index_summary(&self) -> Result<JsValue, JsValue> {
        let summary = self.inner.index_summary().map_err(|e| js_err("Loading index failed", e))?;
        Ok(to_js(&summary))
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Rewrite content. `context`: `{ source?, doc_type?, surface?, no_outgoing?, force? }`.
    /// Never throws on content problems; an unreadable context renders without a source.
    #[wasm_bindgen(js_name = render)]
    pub fn js_render(&self, content: &str, context: JsValue) -> String {
        let render: RenderContext = if context.is_undefined() || context.is_null() {
            RenderContext::default()
        } else {
            match serde_wasm_bindgen::from_value(context) {
                Ok(r) => r,
                Err(e) => {
                    web_sys::console::error_1(&format!("[LinkEngine] Invalid render context: {:?}", e).into());
                    RenderContext::default()
                }
            }
        };
        self.inner.render(content, &render)
    }

    #[wasm_bindgen(js_name = renderDocument)]
    pub fn js_render_document(&self, id: u32) -> Option<String> {
        self.inner.render_document(id as DocId)
    }

    #[wasm_bindgen(js_name = takeTimingMs)]
    pub fn js_take_timing_ms(&self) -> f64 {
        self.inner.take_timing_ms()
    }

    // -------------------------------------------------------------------------
    // Scanning & Reporting
    // -------------------------------------------------------------------------

    #[wasm_bindgen(js_name = startScan)]
    pub fn js_start_scan(&self) -> Result<JsValue, JsValue> {
        let state = self.inner.start_scan().map_err(|e| js_err("Scan start failed", e))?;
        Ok(to_js(&state))
    }

    /// Process one batch; 0 uses the configured batch size.
    #[wasm_bindgen(js_name = scanStep)]
    pub fn js_scan_step(&self, batch: u32) -> Result<JsValue, JsValue> {
        let batch = (batch > 0).then_some(batch as usize);
        let progress = self.inner.scan_step(batch).map_err(|e| js_err("Scan step failed", e))?;
        Ok(to_js(&progress))
    }

    #[wasm_bindgen(js_name = runScan)]
    pub fn js_run_scan(&self) -> Result<JsValue, JsValue> {
        let summary = self.inner.run_scan().map_err(|e| js_err("Scan failed", e))?;
        Ok(to_js(&summary))
    }

    #[wasm_bindgen(js_name = scanPhase)]
    pub fn js_scan_phase(&self) -> Result<JsValue, JsValue> {
        let phase = self.inner.scan_phase().map_err(|e| js_err("Loading scan state failed", e))?;
        Ok(to_js(&phase))
    }

    #[wasm_bindgen(js_name = internalUsage)]
    pub fn js_internal_usage(&self) -> Result<JsValue, JsValue> {
        let map = self.inner.usage_internal().map_err(|e| js_err("Loading usage failed", e))?;
        Ok(to_js(&map))
    }

    #[wasm_bindgen(js_name = externalUsage)]
    pub fn js_external_usage(&self) -> Result<JsValue, JsValue> {
        let map = self.inner.usage_external().map_err(|e| js_err("Loading usage failed", e))?;
        Ok(to_js(&map))
    }

    #[wasm_bindgen(js_name = resetUsage)]
    pub fn js_reset_usage(&self) -> Result<(), JsValue> {
        self.inner.reset_usage().map_err(|e| js_err("Reset failed", e))
    }

    #[wasm_bindgen(js_name = purge)]
    /// Returns how many documents had their rules cleared.
    pub fn js_purge(&self) -> Result<u32, JsValue> {
        let cleared = self.inner.purge().map_err(|e| js_err("Purge failed", e))?;
        Ok(cleared as u32)
    }

    #[wasm_bindgen(js_name = activityLog)]
    pub fn js_activity_log(&self, page: u32, per_page: u32) -> Result<JsValue, JsValue> {
        let page = self
            .inner
            .activity_page(page as usize, per_page as usize)
            .map_err(|e| js_err("Loading activity failed", e))?;
        Ok(to_js(&page))
    }

    // -------------------------------------------------------------------------
    // Import / Export
    // -------------------------------------------------------------------------

    #[wasm_bindgen(js_name = exportJson)]
    pub fn js_export_json(&self) -> Result<String, JsValue> {
        let bundle = self.inner.export().map_err(|e| js_err("Export failed", e))?;
        serde_json::to_string_pretty(&bundle).map_err(|e| js_err("Export failed", e))
    }

    #[wasm_bindgen(js_name = importJson)]
    pub fn js_import_json(&self, raw: &str) -> Result<JsValue, JsValue> {
        let (report, rebuilt) = self.inner.import(raw).map_err(|e| js_err("Import failed", e))?;
        Ok(to_js(&serde_json::json!({ "import": report, "index": crate::index::summarize(&rebuilt.index) })))
    }
}
