//! Scan Orchestrator: resumable site-wide recomputation of the usage maps.
//!
//! # Design Principles
//! 1. State machine: Idle → Scanning(state) → Completed(summary)
//! 2. All progress is persisted, so a scan survives between calls
//! 3. Planning is pure (`ScanState::next_batch` / `advance`); only `step` touches storage
//!
//! # Usage
//! ```rust,ignore
//! let scan = ScanOrchestrator::new(&kv, &docs, &meta);
//! scan.start(&settings.process_doc_types)?;
//! while !scan.step(5)?.done {}
//! ```

use crate::activity::ActivityLog;
use crate::config::Settings;
use crate::error::StoreError;
use crate::rewriter::{self, LinkContext, RenderContext};
use crate::rules::DocId;
use crate::store::{keys, load, load_or_default, save, DocumentStore, KeyValueStore, RuleMetaStore, StatusFilter};
use crate::usage::{apply_contributions, UsageMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const START_MESSAGE: &str = "Scan started: {count} pages queued.";

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanState {
    pub ids: Vec<DocId>,
    pub total: usize,
    pub processed: usize,
    pub started_at: i64,
}

impl ScanState {
    pub fn new(ids: Vec<DocId>, started_at: i64) -> Self {
        Self { total: ids.len(), ids, processed: 0, started_at }
    }

    pub fn is_done(&self) -> bool {
        self.processed >= self.total
    }

    /// Ids the next step of `batch` documents will process.
    pub fn next_batch(&self, batch: usize) -> &[DocId] {
        let start = self.processed.min(self.ids.len());
        let end = (self.processed + batch.max(1)).min(self.total).min(self.ids.len()).max(start);
        &self.ids[start..end]
    }

    /// Mark `n` more documents processed.
    pub fn advance(&mut self, n: usize) {
        self.processed = (self.processed + n).min(self.total);
    }

    pub fn progress(&self) -> ScanProgress {
        ScanProgress { processed: self.processed, total: self.total, done: self.is_done() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub started_at: i64,
    pub completed_at: i64,
    pub scanned: usize,
    pub internal_links: u64,
    pub external_links: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Scanning(ScanState),
    Completed(ScanSummary),
}

// =============================================================================
// ScanOrchestrator
// =============================================================================

pub struct ScanOrchestrator<'a> {
    kv: &'a dyn KeyValueStore,
    docs: &'a dyn DocumentStore,
    meta: &'a dyn RuleMetaStore,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(kv: &'a dyn KeyValueStore, docs: &'a dyn DocumentStore, meta: &'a dyn RuleMetaStore) -> Self {
        Self { kv, docs, meta }
    }

    fn settings(&self) -> Result<Settings, StoreError> {
        Ok(load_or_default::<Settings>(self.kv, keys::SETTINGS)?.sanitized())
    }

    fn activity(&self, settings: &Settings) -> ActivityLog<'a> {
        ActivityLog::new(self.kv, settings.activity_log_limit)
    }

    pub fn phase(&self) -> Result<ScanPhase, StoreError> {
        if let Some(state) = load::<ScanState>(self.kv, keys::SCAN_STATE)? {
            return Ok(ScanPhase::Scanning(state));
        }
        Ok(match load::<ScanSummary>(self.kv, keys::SCAN_SUMMARY)? {
            Some(summary) => ScanPhase::Completed(summary),
            None => ScanPhase::Idle,
        })
    }

    pub fn state(&self) -> Result<Option<ScanState>, StoreError> {
        load(self.kv, keys::SCAN_STATE)
    }

    pub fn summary(&self) -> Result<Option<ScanSummary>, StoreError> {
        load(self.kv, keys::SCAN_SUMMARY)
    }

    /// Published documents of `types`, ascending and unique. The sitemap
    /// provider wins when it has an answer.
    pub fn collect_ids(&self, types: &[String]) -> Result<Vec<DocId>, StoreError> {
        let mut ids = match self.docs.sitemap_ids(types) {
            Some(ids) => ids,
            None => self.docs.enumerate_ids(types, StatusFilter::Published)?,
        };
        ids.retain(|&id| id > 0);
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Begin a scan, discarding any scan in flight. Both usage maps are reset.
    /// Returns `None` when nothing is queued.
    pub fn start(&self, types: &[String]) -> Result<Option<ScanState>, StoreError> {
        self.start_with(types, START_MESSAGE)
    }

    /// `start` with a custom activity message; `{count}` is replaced by the queue length.
    pub fn start_with(&self, types: &[String], message: &str) -> Result<Option<ScanState>, StoreError> {
        let ids = self.collect_ids(types)?;
        save(self.kv, keys::USAGE_INTERNAL, &UsageMap::new())?;
        save(self.kv, keys::USAGE_EXTERNAL, &UsageMap::new())?;

        if ids.is_empty() {
            self.kv.delete(keys::SCAN_STATE)?;
            info!("scan not started, no documents");
            return Ok(None);
        }

        let state = ScanState::new(ids, chrono::Utc::now().timestamp());
        save(self.kv, keys::SCAN_STATE, &state)?;
        info!(total = state.total, "scan started");
        if !message.is_empty() {
            let settings = self.settings()?;
            self.activity(&settings).append(&message.replace("{count}", &state.total.to_string()))?;
        }
        Ok(Some(state))
    }

    /// Process up to `batch` documents of the scan in flight.
    pub fn step(&self, batch: usize) -> Result<ScanProgress, StoreError> {
        let Some(mut state) = self.state()? else {
            return Ok(ScanProgress { processed: 0, total: 0, done: true });
        };
        if state.is_done() {
            return self.finish(state);
        }

        let ctx = LinkContext::load(self.kv, self.docs)?;
        let ids = state.next_batch(batch).to_vec();
        for &id in &ids {
            self.scan_document(&ctx, id)?;
        }
        state.advance(ids.len().max(1));
        save(self.kv, keys::SCAN_STATE, &state)?;
        debug!(processed = state.processed, total = state.total, "scan step");

        if state.is_done() {
            return self.finish(state);
        }
        Ok(state.progress())
    }

    /// Start and drive a scan to completion in this call.
    pub fn run(&self, types: &[String], message: &str) -> Result<Option<ScanSummary>, StoreError> {
        if self.start_with(types, message)?.is_none() {
            return Ok(None);
        }
        let batch = self.settings()?.scan_batch_size;
        while !self.step(batch)?.done {}
        self.summary()
    }

    /// Render one document in collection mode and store its contribution to both maps.
    fn scan_document(&self, ctx: &LinkContext, id: DocId) -> Result<(), StoreError> {
        let Some(content) = self.docs.content(id) else {
            debug!(source = id, "document vanished during scan");
            return Ok(());
        };
        let no_outgoing = match self.meta.read(id) {
            Ok(meta) => meta.no_outgoing,
            Err(e) => {
                warn!(source = id, error = %e, "unreadable rule metadata");
                false
            }
        };
        let render = RenderContext {
            source: Some(id),
            doc_type: self.docs.doc_type(id),
            no_outgoing,
            force: true,
            collect_external: true,
            ..Default::default()
        };
        let log = match rewriter::rewrite(ctx, &content, &render) {
            Ok(outcome) => outcome.log,
            Err(e) => {
                warn!(source = id, error = %e, "document skipped by scan");
                return Ok(());
            }
        };
        apply_contributions(self.kv, keys::USAGE_INTERNAL, id, log.internal_contributions())?;
        apply_contributions(self.kv, keys::USAGE_EXTERNAL, id, log.external_contributions())?;
        Ok(())
    }

    fn finish(&self, state: ScanState) -> Result<ScanProgress, StoreError> {
        self.kv.delete(keys::SCAN_STATE)?;
        let internal: UsageMap = load_or_default(self.kv, keys::USAGE_INTERNAL)?;
        let external: UsageMap = load_or_default(self.kv, keys::USAGE_EXTERNAL)?;
        let summary = ScanSummary {
            started_at: state.started_at,
            completed_at: chrono::Utc::now().timestamp(),
            scanned: state.total,
            internal_links: internal.total_links(),
            external_links: external.total_links(),
        };
        save(self.kv, keys::SCAN_SUMMARY, &summary)?;
        info!(scanned = summary.scanned, "scan finished");

        let settings = self.settings()?;
        self.activity(&settings).append(&format!(
            "Scan finished: {} pages, {} internal links, {} external links.",
            summary.scanned, summary.internal_links, summary.external_links
        ))?;
        Ok(state.progress())
    }
}
