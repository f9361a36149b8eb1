//! Rule Index Builder
//!
//! Flattens the rules stored on every eligible document into one ordered
//! list. The list is written with a single `set`, so readers see either the
//! previous index or the new one, never a mix.
//!
//! # Ordering
//! 1. destination priority, descending
//! 2. intra-document priority (insertion order), ascending
//! 3. destination id, ascending
//! 4. phrase, lexical

use crate::config::Settings;
use crate::error::StoreError;
use crate::pattern::{compile, MatchKind};
use crate::rules::{DocId, IndexedRule};
use crate::store::{keys, save, DocumentStore, KeyValueStore, RuleMetaStore, StatusFilter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub rules: Vec<IndexedRule>,
    #[serde(default)]
    pub built_at: i64,
}

impl Index {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Result of a rebuild. `error` is informational: the index is persisted either way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    pub index: Index,
    pub error: Option<String>,
    /// Rules left out because their phrase did not compile
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCount {
    pub target: DocId,
    pub phrases: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub total_phrases: usize,
    pub total_targets: usize,
    /// Sorted by phrase count, descending
    pub per_target: Vec<TargetCount>,
}

// =============================================================================
// Builder
// =============================================================================

pub struct IndexBuilder<'a> {
    docs: &'a dyn DocumentStore,
    meta: &'a dyn RuleMetaStore,
    kv: &'a dyn KeyValueStore,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(docs: &'a dyn DocumentStore, meta: &'a dyn RuleMetaStore, kv: &'a dyn KeyValueStore) -> Self {
        Self { docs, meta, kv }
    }

    /// Collect and sort rules without persisting anything.
    pub fn collect(&self, settings: &Settings) -> Result<(Vec<IndexedRule>, usize), StoreError> {
        let ids = self.docs.enumerate_ids(&settings.process_doc_types, StatusFilter::Published)?;
        let mut rules: Vec<IndexedRule> = Vec::new();
        let mut dropped = 0;

        for id in ids {
            let meta = match self.meta.read(id) {
                Ok(m) => m,
                Err(e) => {
                    warn!(target_doc = id, error = %e, "skipping unreadable rule metadata");
                    continue;
                }
            };
            if meta.rules.is_empty() {
                continue;
            }
            let cap = meta.cap_override();
            let target_priority = meta.destination_priority();
            let mut seen: HashSet<(String, bool, bool)> = HashSet::new();
            let mut priority = 0u32;

            for rule in &meta.rules {
                if rule.phrase.is_empty() || !seen.insert((rule.phrase.clone(), rule.regex, rule.case)) {
                    continue;
                }
                let kind = rule.match_kind();
                if let Err(e) = compile(&rule.phrase, kind, rule.case) {
                    debug!(target_doc = id, phrase = %rule.phrase, error = %e, "dropping rule");
                    dropped += 1;
                    continue;
                }
                let context = if meta.context_enabled {
                    valid_context_terms(&rule.context, rule.context_regex, rule.context_case)
                } else {
                    Vec::new()
                };
                rules.push(IndexedRule {
                    phrase: rule.phrase.clone(),
                    kind,
                    case: rule.case,
                    target: id,
                    max_per_target: cap,
                    priority,
                    target_priority,
                    allowed_tags: meta.allowed_tags.clone(),
                    context_enabled: meta.context_enabled,
                    context,
                    context_regex: rule.context_regex,
                    context_case: rule.context_case,
                });
                priority += 1;
            }
        }

        rules.sort_by(IndexedRule::index_order);
        Ok((rules, dropped))
    }

    /// Rebuild and persist the index.
    ///
    /// When documents cannot be enumerated an empty index is persisted and the
    /// failure is reported in `RebuildReport::error` (and stored for display).
    pub fn rebuild(&self, settings: &Settings) -> Result<RebuildReport, StoreError> {
        let built_at = chrono::Utc::now().timestamp();
        let report = match self.collect(settings) {
            Ok((rules, dropped)) => {
                info!(rules = rules.len(), dropped, "index rebuilt");
                RebuildReport { index: Index { rules, built_at }, error: None, dropped }
            }
            Err(e) => {
                let message = format!("Index rebuild failed: {}", e);
                warn!(error = %e, "index rebuild failed, persisting empty index");
                RebuildReport { index: Index { rules: Vec::new(), built_at }, error: Some(message), dropped: 0 }
            }
        };

        save(self.kv, keys::INDEX, &report.index)?;
        match &report.error {
            Some(message) => save(self.kv, keys::REBUILD_ERROR, message)?,
            None => self.kv.delete(keys::REBUILD_ERROR)?,
        }
        Ok(report)
    }
}

fn valid_context_terms(terms: &[String], regex: bool, case: bool) -> Vec<String> {
    terms
        .iter()
        .filter(|t| !t.is_empty())
        .filter(|t| compile(t, MatchKind::classify(t, regex), case).is_ok())
        .cloned()
        .collect()
}

/// Counts for the overview screen.
pub fn summarize(index: &Index) -> IndexSummary {
    let mut per: BTreeMap<DocId, usize> = BTreeMap::new();
    for rule in &index.rules {
        *per.entry(rule.target).or_insert(0) += 1;
    }
    let mut per_target: Vec<TargetCount> = per.into_iter().map(|(target, phrases)| TargetCount { target, phrases }).collect();
    per_target.sort_by(|a, b| b.phrases.cmp(&a.phrases).then(a.target.cmp(&b.target)));
    IndexSummary { total_phrases: index.rules.len(), total_targets: per_target.len(), per_target }
}

#[cfg(test)]
mod tests;
