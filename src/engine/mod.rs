//! LinkManager: the host-facing entry point.
//!
//! Ties the stores to the index builder, the rewriter and the scan
//! orchestrator, and implements the document lifecycle hooks.
//!
//! # Usage
//! ```rust,ignore
//! let manager = LinkManager::new(MemoryStore::new(), docs, MemoryRuleMeta::new());
//! manager.update_document_rules(42, meta)?;
//! let html = manager.render_document(7);
//! ```

use crate::activity::{ActivityLog, ActivityPage};
use crate::config::Settings;
use crate::error::{ImportError, RewriteError, StoreError};
use crate::impex::{self, ExportBundle, ImportReport};
use crate::index::{summarize, Index, IndexBuilder, IndexSummary, RebuildReport};
use crate::rewriter::{self, LinkContext, RenderContext};
use crate::rules::{sanitize_external_rules, DocId, DocumentRuleMeta, ExternalRule, PhraseRule};
use crate::scan::{ScanOrchestrator, ScanPhase, ScanProgress, ScanState, ScanSummary};
use crate::store::{keys, load, load_or_default, save, DocumentStore, KeyValueStore, RuleMetaStore};
use crate::usage::{apply_contributions, UsageMap};
use serde_json::Value;
use std::cell::Cell;
use tracing::{debug, info, warn};

const AUTO_SCAN_ON_SAVE: &str = "Auto scan started after save: {count} pages queued.";
const AUTO_SCAN_ON_EXTERNAL: &str = "Auto scan started after external rule save: {count} pages queued.";

pub struct LinkManager<K, D, M> {
    kv: K,
    docs: D,
    meta: M,
    /// Time spent rewriting since the last `take_timing_ms`, in microseconds
    timing_us: Cell<u64>,
}

impl<K: KeyValueStore, D: DocumentStore, M: RuleMetaStore> LinkManager<K, D, M> {
    pub fn new(kv: K, docs: D, meta: M) -> Self {
        Self { kv, docs, meta, timing_us: Cell::new(0) }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn docs(&self) -> &D {
        &self.docs
    }

    pub fn meta(&self) -> &M {
        &self.meta
    }

    // -------------------------------------------------------------------------
    // Settings & Index
    // -------------------------------------------------------------------------

    pub fn settings(&self) -> Result<Settings, StoreError> {
        Ok(load_or_default::<Settings>(&self.kv, keys::SETTINGS)?.sanitized())
    }

    /// Store sanitized settings. Changing the processed document types rebuilds the index.
    pub fn save_settings(&self, settings: Settings) -> Result<Settings, StoreError> {
        let previous = self.settings()?;
        let settings = settings.sanitized();
        save(&self.kv, keys::SETTINGS, &settings)?;
        if previous.process_doc_types != settings.process_doc_types {
            self.rebuild_index()?;
        }
        Ok(settings)
    }

    pub fn rebuild_index(&self) -> Result<RebuildReport, StoreError> {
        let settings = self.settings()?;
        IndexBuilder::new(&self.docs, &self.meta, &self.kv).rebuild(&settings)
    }

    pub fn index(&self) -> Result<Index, StoreError> {
        load_or_default(&self.kv, keys::INDEX)
    }

    pub fn index_summary(&self) -> Result<IndexSummary, StoreError> {
        Ok(summarize(&self.index()?))
    }

    /// Message left by the last failed rebuild, if any.
    pub fn rebuild_error(&self) -> Result<Option<String>, StoreError> {
        load(&self.kv, keys::REBUILD_ERROR)
    }

    pub fn context(&self) -> Result<LinkContext, StoreError> {
        LinkContext::load(&self.kv, &self.docs)
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Rewrite `content`. Never fails: on any error the content comes back unchanged.
    pub fn render(&self, content: &str, render: &RenderContext) -> String {
        let started = instant::Instant::now();
        let (html, timed) = match self.try_render(content, render) {
            Ok(result) => result,
            Err(e) => {
                warn!(source = ?render.source, error = %e, "render failed, serving original content");
                (content.to_string(), false)
            }
        };
        if timed {
            self.timing_us.set(self.timing_us.get() + started.elapsed().as_micros() as u64);
        }
        html
    }

    fn try_render(&self, content: &str, render: &RenderContext) -> Result<(String, bool), RewriteError> {
        let ctx = self.context()?;
        let outcome = rewriter::rewrite(&ctx, content, render)?;
        if outcome.skipped.is_none() {
            if let Some(source) = render.source {
                apply_contributions(&self.kv, keys::USAGE_INTERNAL, source, outcome.log.internal_contributions())?;
                if render.collect_external {
                    apply_contributions(&self.kv, keys::USAGE_EXTERNAL, source, outcome.log.external_contributions())?;
                }
            }
        }
        Ok((outcome.html, ctx.settings.log_internal_timing))
    }

    fn render_context(&self, id: DocId) -> RenderContext {
        let no_outgoing = self.meta.read(id).map(|m| m.no_outgoing).unwrap_or(false);
        RenderContext { source: Some(id), doc_type: self.docs.doc_type(id), no_outgoing, ..Default::default() }
    }

    /// Render a stored document as its own page. `None` when it does not exist.
    pub fn render_document(&self, id: DocId) -> Option<String> {
        let content = self.docs.content(id)?;
        Some(self.render(&content, &self.render_context(id)))
    }

    /// Milliseconds spent rewriting since the last call, when timing is enabled.
    pub fn take_timing_ms(&self) -> f64 {
        self.timing_us.replace(0) as f64 / 1000.0
    }

    // -------------------------------------------------------------------------
    // Document lifecycle
    // -------------------------------------------------------------------------

    /// Store the rules of document `id`; the index is rebuilt only when they changed.
    pub fn update_document_rules(&self, id: DocId, meta: DocumentRuleMeta) -> Result<bool, StoreError> {
        let previous = self.meta.read(id).unwrap_or_default();
        let mut next = meta;
        let mut rules: Vec<PhraseRule> = Vec::with_capacity(next.rules.len());
        for rule in next.rules.into_iter().map(PhraseRule::normalized) {
            if !rule.phrase.is_empty() && !rules.contains(&rule) {
                rules.push(rule);
            }
        }
        next.rules = rules;
        next.target_priority = next.destination_priority() as i64;
        next.max_per_target = next.max_per_target.map(|n| n.max(0));

        if next == previous {
            debug!(target_doc = id, "rules unchanged");
            return Ok(false);
        }
        if next.is_empty() {
            self.meta.clear(id)?;
        } else {
            self.meta.write(id, &next)?;
        }
        self.rebuild_index()?;
        Ok(true)
    }

    /// Forget a deleted document: its rules, its usage as a source and as a destination.
    pub fn on_document_deleted(&self, id: DocId) -> Result<(), StoreError> {
        self.meta.clear(id)?;
        let mut internal: UsageMap = load_or_default(&self.kv, keys::USAGE_INTERNAL)?;
        internal.purge_source(id);
        internal.remove_destination(id);
        save(&self.kv, keys::USAGE_INTERNAL, &internal)?;
        let mut external: UsageMap = load_or_default(&self.kv, keys::USAGE_EXTERNAL)?;
        external.purge_source(id);
        save(&self.kv, keys::USAGE_EXTERNAL, &external)?;
        self.rebuild_index()?;
        Ok(())
    }

    /// A document was published or updated: rebuild, then scan if configured to.
    pub fn on_document_published(&self, id: DocId) -> Result<Option<ScanSummary>, StoreError> {
        debug!(source = id, "document published");
        self.rebuild_index()?;
        let settings = self.settings()?;
        if !settings.auto_scan_on_save {
            return Ok(None);
        }
        self.scanner().run(&settings.process_doc_types, AUTO_SCAN_ON_SAVE)
    }

    // -------------------------------------------------------------------------
    // External rules
    // -------------------------------------------------------------------------

    pub fn external_rules(&self) -> Result<Vec<ExternalRule>, StoreError> {
        load_or_default(&self.kv, keys::EXTERNAL_RULES)
    }

    /// Sanitize and store the external rule list, then scan if configured to.
    pub fn save_external_rules(&self, raw: &Value) -> Result<Vec<ExternalRule>, StoreError> {
        let rules = sanitize_external_rules(raw);
        save(&self.kv, keys::EXTERNAL_RULES, &rules)?;
        let settings = self.settings()?;
        if settings.auto_scan_on_external {
            self.scanner().run(&settings.process_doc_types, AUTO_SCAN_ON_EXTERNAL)?;
        }
        Ok(rules)
    }

    // -------------------------------------------------------------------------
    // Scanning & Usage
    // -------------------------------------------------------------------------

    pub fn scanner(&self) -> ScanOrchestrator<'_> {
        ScanOrchestrator::new(&self.kv, &self.docs, &self.meta)
    }

    pub fn start_scan(&self) -> Result<Option<ScanState>, StoreError> {
        let settings = self.settings()?;
        self.scanner().start(&settings.process_doc_types)
    }

    /// One scan step; `None` uses the configured batch size.
    pub fn scan_step(&self, batch: Option<usize>) -> Result<ScanProgress, StoreError> {
        let batch = match batch {
            Some(n) => n.max(1),
            None => self.settings()?.scan_batch_size,
        };
        self.scanner().step(batch)
    }

    pub fn run_scan(&self) -> Result<Option<ScanSummary>, StoreError> {
        let settings = self.settings()?;
        self.scanner().run(&settings.process_doc_types, crate::scan::START_MESSAGE)
    }

    pub fn scan_phase(&self) -> Result<ScanPhase, StoreError> {
        self.scanner().phase()
    }

    pub fn usage_internal(&self) -> Result<UsageMap, StoreError> {
        load_or_default(&self.kv, keys::USAGE_INTERNAL)
    }

    pub fn usage_external(&self) -> Result<UsageMap, StoreError> {
        load_or_default(&self.kv, keys::USAGE_EXTERNAL)
    }

    /// Empty both usage maps and abandon any scan in flight.
    pub fn reset_usage(&self) -> Result<(), StoreError> {
        save(&self.kv, keys::USAGE_INTERNAL, &UsageMap::new())?;
        save(&self.kv, keys::USAGE_EXTERNAL, &UsageMap::new())?;
        self.kv.delete(keys::SCAN_STATE)?;
        self.activity()?.append("Usage data reset.")
    }

    /// Drop every piece of link data: document rules, usage, the index,
    /// external rules and scan data.
    pub fn purge(&self) -> Result<usize, StoreError> {
        let ids = self.meta.ids()?;
        for &id in &ids {
            self.meta.clear(id)?;
        }
        save(&self.kv, keys::USAGE_INTERNAL, &UsageMap::new())?;
        save(&self.kv, keys::USAGE_EXTERNAL, &UsageMap::new())?;
        save(&self.kv, keys::INDEX, &Index::default())?;
        save(&self.kv, keys::EXTERNAL_RULES, &Vec::<ExternalRule>::new())?;
        self.kv.delete(keys::SCAN_STATE)?;
        self.kv.delete(keys::SCAN_SUMMARY)?;
        self.kv.delete(keys::REBUILD_ERROR)?;
        info!(documents = ids.len(), "link data purged");
        self.activity()?.append("All link data purged.")?;
        Ok(ids.len())
    }

    // -------------------------------------------------------------------------
    // Activity & Import/Export
    // -------------------------------------------------------------------------

    pub fn activity(&self) -> Result<ActivityLog<'_>, StoreError> {
        Ok(ActivityLog::new(&self.kv, self.settings()?.activity_log_limit))
    }

    pub fn activity_page(&self, page: usize, per_page: usize) -> Result<ActivityPage, StoreError> {
        self.activity()?.page(page, per_page)
    }

    pub fn export(&self) -> Result<ExportBundle, StoreError> {
        impex::export(&self.kv, &self.meta)
    }

    /// Apply an export bundle and rebuild the index.
    pub fn import(&self, raw: &str) -> Result<(ImportReport, RebuildReport), ImportError> {
        let report = impex::import(&self.kv, &self.meta, raw)?;
        let rebuilt = self.rebuild_index()?;
        self.activity()?.append("Import finished and index rebuilt.")?;
        Ok((report, rebuilt))
    }
}

#[cfg(test)]
mod tests;
