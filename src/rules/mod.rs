//! Rule records and their deserialization boundary.
//!
//! # Architecture
//!
//! - `PhraseRule` - one phrase stored on a destination document
//! - `DocumentRuleMeta` - everything stored per document (rules + overrides)
//! - `ExternalRule` - a site-wide phrase → URL rule
//! - `IndexedRule` - a flattened, ordered entry of the compiled index
//!
//! Stored records are loose (older versions wrote bare strings, forms post
//! comma-separated text). All of that is normalized here, once, so the rest of
//! the crate only sees closed, typed records.

use crate::config::{parse_tag_list, tag_list, AttrMode};
use crate::error::StoreError;
use crate::pattern::MatchKind;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::sync::OnceLock;

pub type DocId = u64;

/// Current shape of `DocumentRuleMeta`.
pub const RULE_SCHEMA_VERSION: u32 = 2;

fn context_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[,\n]+").expect("static regex"))
}

fn id_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,;]+").expect("static regex"))
}

/// Split free text into context terms ("pricing, plans\ncost").
pub fn parse_context_terms(raw: &str) -> Vec<String> {
    context_separator()
        .split(raw)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Positive, unique document ids from free text.
pub fn parse_id_list(raw: &str) -> Vec<DocId> {
    let mut out: Vec<DocId> = Vec::new();
    for part in id_separator().split(raw) {
        if let Ok(id) = part.trim().parse::<i64>() {
            if id > 0 && !out.contains(&(id as DocId)) {
                out.push(id as DocId);
            }
        }
    }
    out
}

// =============================================================================
// Lenient field decoders
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrList<T> {
    Text(String),
    List(Vec<T>),
}

fn context_terms<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<TextOrList<String>>::deserialize(d)? {
        None => Vec::new(),
        Some(TextOrList::Text(s)) => parse_context_terms(&s),
        Some(TextOrList::List(items)) => items.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string).collect(),
    })
}

fn id_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<DocId>, D::Error> {
    Ok(match Option::<TextOrList<i64>>::deserialize(d)? {
        None => Vec::new(),
        Some(TextOrList::Text(s)) => parse_id_list(&s),
        Some(TextOrList::List(items)) => {
            let mut out: Vec<DocId> = Vec::new();
            for id in items.into_iter().filter(|id| *id > 0).map(|id| id as DocId) {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
            out
        }
    })
}

fn default_max_per_page() -> u32 {
    1
}

fn default_attr_mode() -> AttrMode {
    AttrMode::Phrase
}

// =============================================================================
// Per-document rules
// =============================================================================

/// One phrase stored on a destination document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRule {
    pub phrase: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub case: bool,
    #[serde(default, deserialize_with = "context_terms")]
    pub context: Vec<String>,
    #[serde(default)]
    pub context_regex: bool,
    #[serde(default)]
    pub context_case: bool,
}

impl PhraseRule {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            regex: false,
            case: false,
            context: Vec::new(),
            context_regex: false,
            context_case: false,
        }
    }

    /// Trim the phrase and drop flags that make no sense together.
    pub fn normalized(mut self) -> Self {
        self.phrase = self.phrase.trim().to_string();
        self.case = self.case && !self.regex;
        self.context_case = self.context_case && !self.context_regex;
        self
    }

    pub fn match_kind(&self) -> MatchKind {
        MatchKind::classify(&self.phrase, self.regex)
    }
}

/// Legacy records stored a bare phrase string.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRule {
    Phrase(String),
    Full(PhraseRule),
}

fn stored_rules<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<PhraseRule>, D::Error> {
    let raw = Option::<Vec<StoredRule>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|r| match r {
            StoredRule::Phrase(p) => PhraseRule::new(&p),
            StoredRule::Full(r) => r,
        })
        .map(PhraseRule::normalized)
        .collect())
}

/// Everything stored on one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentRuleMeta {
    pub version: u32,
    /// Phrases linking *to* this document
    #[serde(deserialize_with = "stored_rules")]
    pub rules: Vec<PhraseRule>,
    /// This document never receives outgoing links
    pub no_outgoing: bool,
    #[serde(deserialize_with = "tag_list")]
    pub allowed_tags: Vec<String>,
    pub context_enabled: bool,
    /// Per-destination cap override; None = global default
    pub max_per_target: Option<i64>,
    /// Destination priority, clamped to 0..=100 when read
    pub target_priority: i64,
}

impl Default for DocumentRuleMeta {
    fn default() -> Self {
        Self {
            version: RULE_SCHEMA_VERSION,
            rules: Vec::new(),
            no_outgoing: false,
            allowed_tags: Vec::new(),
            context_enabled: false,
            max_per_target: None,
            target_priority: 0,
        }
    }
}

impl DocumentRuleMeta {
    /// Reject records written by a newer schema; upgrade older ones.
    pub fn migrate(mut self) -> Result<Self, StoreError> {
        match self.version {
            // version 0 predates the field; 1 stored bare strings, handled by `stored_rules`
            0..=RULE_SCHEMA_VERSION => {
                self.version = RULE_SCHEMA_VERSION;
                Ok(self)
            }
            v => Err(StoreError::UnsupportedVersion(v)),
        }
    }

    pub fn cap_override(&self) -> Option<u32> {
        self.max_per_target.map(|n| n.clamp(0, u32::MAX as i64) as u32)
    }

    pub fn destination_priority(&self) -> u8 {
        self.target_priority.clamp(0, 100) as u8
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
            && !self.no_outgoing
            && self.allowed_tags.is_empty()
            && !self.context_enabled
            && self.max_per_target.is_none()
            && self.target_priority == 0
    }
}

// =============================================================================
// External rules
// =============================================================================

/// A site-wide phrase → URL rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRule {
    #[serde(default)]
    pub phrase: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub case: bool,
    #[serde(default, deserialize_with = "context_terms")]
    pub context: Vec<String>,
    #[serde(default)]
    pub context_regex: bool,
    #[serde(default)]
    pub context_case: bool,
    #[serde(default)]
    pub rel: String,
    #[serde(default = "default_attr_mode")]
    pub title_mode: AttrMode,
    #[serde(default)]
    pub title_custom: String,
    #[serde(default = "default_attr_mode")]
    pub aria_mode: AttrMode,
    #[serde(default)]
    pub aria_custom: String,
    #[serde(default)]
    pub class: String,
    /// Links per page for this rule. 0 = unlimited
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
    #[serde(default, deserialize_with = "tag_list")]
    pub allowed_tags: Vec<String>,
    /// Document types this rule applies to; empty = all processed types
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default, deserialize_with = "id_list")]
    pub exclude_ids: Vec<DocId>,
}

impl ExternalRule {
    pub fn new(phrase: &str, url: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            url: url.to_string(),
            regex: false,
            case: false,
            context: Vec::new(),
            context_regex: false,
            context_case: false,
            rel: String::new(),
            title_mode: AttrMode::Phrase,
            title_custom: String::new(),
            aria_mode: AttrMode::Phrase,
            aria_custom: String::new(),
            class: String::new(),
            max_per_page: 1,
            allowed_tags: Vec::new(),
            types: Vec::new(),
            exclude_ids: Vec::new(),
        }
    }

    /// Normalize one rule; `None` when phrase or URL is missing.
    pub fn sanitized(mut self) -> Option<Self> {
        self.phrase = self.phrase.trim().to_string();
        self.url = self.url.trim().to_string();
        if self.phrase.is_empty() || self.url.is_empty() {
            return None;
        }
        self.case = self.case && !self.regex;
        self.context_case = self.context_case && !self.context_regex;
        self.rel = self.rel.trim().to_string();
        self.class = self.class.trim().to_string();
        // destination titles only exist for internal documents
        if self.title_mode == AttrMode::PostTitle {
            self.title_mode = AttrMode::Phrase;
        }
        if self.aria_mode == AttrMode::PostTitle {
            self.aria_mode = AttrMode::Phrase;
        }
        self.allowed_tags = parse_tag_list(&self.allowed_tags.join(","));
        self.types = self
            .types
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Some(self)
    }

    pub fn match_kind(&self) -> MatchKind {
        MatchKind::classify(&self.phrase, self.regex)
    }

    /// Does this rule run on a document of `doc_type` with id `source`?
    pub fn applies_to(&self, source: Option<DocId>, doc_type: Option<&str>) -> bool {
        if let Some(t) = doc_type {
            if !self.types.is_empty() && !self.types.iter().any(|x| x == t) {
                return false;
            }
        }
        match source {
            Some(id) => !self.exclude_ids.contains(&id),
            None => true,
        }
    }
}

/// Sanitize a list of loosely shaped external rules (form posts, imports).
pub fn sanitize_external_rules(raw: &serde_json::Value) -> Vec<ExternalRule> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|v| v.is_object())
        .filter_map(|v| serde_json::from_value::<ExternalRule>(v.clone()).ok())
        .filter_map(ExternalRule::sanitized)
        .collect()
}

// =============================================================================
// Index entries
// =============================================================================

/// One entry of the compiled index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRule {
    pub phrase: String,
    pub kind: MatchKind,
    pub case: bool,
    pub target: DocId,
    pub max_per_target: Option<u32>,
    pub priority: u32,
    pub target_priority: u8,
    #[serde(default)]
    pub allowed_tags: Vec<String>,
    #[serde(default)]
    pub context_enabled: bool,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub context_regex: bool,
    #[serde(default)]
    pub context_case: bool,
}

impl IndexedRule {
    /// Index ordering: destination priority desc, priority asc, target asc, phrase.
    pub fn index_order(a: &Self, b: &Self) -> Ordering {
        b.target_priority
            .cmp(&a.target_priority)
            .then(a.priority.cmp(&b.priority))
            .then(a.target.cmp(&b.target))
            .then_with(|| a.phrase.cmp(&b.phrase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_string_rules_migrate() {
        let meta: DocumentRuleMeta = serde_json::from_value(json!({
            "version": 1,
            "rules": ["  WordPress ", {"phrase": "[words] plugin", "regex": false}]
        }))
        .unwrap();
        let meta = meta.migrate().unwrap();
        assert_eq!(meta.version, RULE_SCHEMA_VERSION);
        assert_eq!(meta.rules[0].phrase, "WordPress");
        assert_eq!(meta.rules[1].match_kind(), MatchKind::Token);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let meta = DocumentRuleMeta { version: 99, ..Default::default() };
        assert_eq!(meta.migrate().unwrap_err(), StoreError::UnsupportedVersion(99));
    }

    #[test]
    fn test_overrides_are_clamped() {
        let meta = DocumentRuleMeta { max_per_target: Some(-3), target_priority: 250, ..Default::default() };
        assert_eq!(meta.cap_override(), Some(0));
        assert_eq!(meta.destination_priority(), 100);
    }

    #[test]
    fn test_regex_rule_is_never_case_sensitive() {
        let rule = PhraseRule { regex: true, case: true, ..PhraseRule::new("a+") }.normalized();
        assert!(!rule.case);
    }

    #[test]
    fn test_external_rule_sanitation() {
        let raw = json!([
            {"phrase": " Rust ", "url": "https://rust-lang.org", "context": "systems, language\nfast",
             "exclude_ids": "4, 7;x 7", "title_mode": "post_title", "allowed_tags": "P, li"},
            {"phrase": "", "url": "https://example.com"},
            {"phrase": "no url"},
            "not an object"
        ]);
        let rules = sanitize_external_rules(&raw);
        assert_eq!(rules.len(), 1);
        let r = &rules[0];
        assert_eq!(r.phrase, "Rust");
        assert_eq!(r.context, vec!["systems", "language", "fast"]);
        assert_eq!(r.exclude_ids, vec![4, 7]);
        assert_eq!(r.title_mode, AttrMode::Phrase);
        assert_eq!(r.allowed_tags, vec!["p", "li"]);
        assert_eq!(r.max_per_page, 1);
    }

    #[test]
    fn test_external_rule_applies_to() {
        let mut r = ExternalRule::new("x", "https://x.test");
        r.types = vec!["post".into()];
        r.exclude_ids = vec![3];
        assert!(r.applies_to(Some(1), Some("post")));
        assert!(!r.applies_to(Some(1), Some("page")));
        assert!(!r.applies_to(Some(3), Some("post")));
    }

    #[test]
    fn test_index_order() {
        let base = IndexedRule {
            phrase: "b".into(),
            kind: MatchKind::Literal,
            case: false,
            target: 2,
            max_per_target: None,
            priority: 0,
            target_priority: 10,
            allowed_tags: vec![],
            context_enabled: false,
            context: vec![],
            context_regex: false,
            context_case: false,
        };
        let high = IndexedRule { target_priority: 50, priority: 3, target: 9, ..base.clone() };
        let same_a = IndexedRule { phrase: "a".into(), ..base.clone() };
        let mut rules = vec![base.clone(), same_a.clone(), high.clone()];
        rules.sort_by(IndexedRule::index_order);
        assert_eq!(rules, vec![high, same_a, base]);
    }
}
