//! Call-scoped rule context.
//!
//! Everything the rewriter needs from storage (settings, compiled internal
//! rules with their permalinks, compiled external rules) is loaded into one
//! `LinkContext`. Build it once per render or per scan batch and drop it
//! afterwards; nothing is cached between calls.

use super::prefilter::{gateable, LiteralPrefilter};
use crate::config::{AttrMode, Settings};
use crate::error::StoreError;
use crate::index::Index;
use crate::pattern::{compile, MatchKind, Pattern};
use crate::rules::{ExternalRule, IndexedRule};
use crate::store::{keys, load_or_default, DocumentStore, KeyValueStore};
use tracing::debug;

/// An index rule ready to run.
#[derive(Debug, Clone)]
pub struct InternalRule {
    pub rule: IndexedRule,
    pub pattern: Pattern,
    pub context: Vec<Pattern>,
    pub url: String,
    pub title: Option<String>,
}

/// An external rule ready to run. `idx` is its position in the stored list.
#[derive(Debug, Clone)]
pub struct ExternalEntry {
    pub idx: usize,
    pub rule: ExternalRule,
    pub pattern: Pattern,
    pub context: Vec<Pattern>,
}

#[derive(Debug, Clone)]
pub struct LinkContext {
    pub settings: Settings,
    pub(crate) internal: Vec<InternalRule>,
    pub(crate) external: Vec<ExternalEntry>,
    pub(crate) prefilter: LiteralPrefilter,
}

fn compile_context(terms: &[String], regex: bool, case: bool) -> Vec<Pattern> {
    terms
        .iter()
        .filter_map(|t| compile(t, MatchKind::classify(t, regex), case).ok())
        .collect()
}

fn gate_phrase<'a>(kind: MatchKind, phrase: &'a str, case: bool) -> Option<&'a str> {
    (kind == MatchKind::Literal && gateable(phrase, case)).then_some(phrase)
}

impl LinkContext {
    /// Compile `index` and `external` against the current document store.
    ///
    /// Rules that fail to compile, and internal rules whose destination has no
    /// permalink, are dropped.
    pub fn new(settings: Settings, index: &Index, external: &[ExternalRule], docs: &dyn DocumentStore) -> Self {
        let needs_title = settings.title_mode == AttrMode::PostTitle || settings.aria_mode == AttrMode::PostTitle;

        let mut internal = Vec::with_capacity(index.rules.len());
        for rule in &index.rules {
            let Some(url) = docs.resolve_url(rule.target) else {
                debug!(target_doc = rule.target, "no permalink, rule skipped");
                continue;
            };
            let pattern = match compile(&rule.phrase, rule.kind, rule.case) {
                Ok(p) => p,
                Err(e) => {
                    debug!(phrase = %rule.phrase, error = %e, "rule skipped");
                    continue;
                }
            };
            let context = if rule.context_enabled {
                compile_context(&rule.context, rule.context_regex, rule.context_case)
            } else {
                Vec::new()
            };
            let title = if needs_title { docs.title(rule.target) } else { None };
            internal.push(InternalRule { rule: rule.clone(), pattern, context, url, title });
        }

        let mut compiled_external = Vec::with_capacity(external.len());
        for (idx, rule) in external.iter().enumerate() {
            let pattern = match compile(&rule.phrase, rule.match_kind(), rule.case) {
                Ok(p) => p,
                Err(e) => {
                    debug!(phrase = %rule.phrase, error = %e, "external rule skipped");
                    continue;
                }
            };
            let context = compile_context(&rule.context, rule.context_regex, rule.context_case);
            compiled_external.push(ExternalEntry { idx, rule: rule.clone(), pattern, context });
        }

        let internal_gates: Vec<Option<&str>> =
            internal.iter().map(|r| gate_phrase(r.rule.kind, &r.rule.phrase, r.rule.case)).collect();
        let external_gates: Vec<Option<&str>> =
            compiled_external.iter().map(|r| gate_phrase(r.rule.match_kind(), &r.rule.phrase, r.rule.case)).collect();
        let prefilter = LiteralPrefilter::build(&internal_gates, &external_gates);

        Self { settings, internal, external: compiled_external, prefilter }
    }

    /// Load settings, index and external rules from the store.
    pub fn load(kv: &dyn KeyValueStore, docs: &dyn DocumentStore) -> Result<Self, StoreError> {
        let settings: Settings = load_or_default::<Settings>(kv, keys::SETTINGS)?.sanitized();
        let index: Index = load_or_default(kv, keys::INDEX)?;
        let external: Vec<ExternalRule> = load_or_default(kv, keys::EXTERNAL_RULES)?;
        Ok(Self::new(settings, &index, &external, docs))
    }

    pub fn has_rules(&self) -> bool {
        !self.internal.is_empty() || !self.external.is_empty()
    }

    pub fn internal_rules(&self) -> &[InternalRule] {
        &self.internal
    }

    pub fn external_rules(&self) -> &[ExternalEntry] {
        &self.external
    }
}
