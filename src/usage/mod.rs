//! UsageMap: which sources link to which destinations, and with what text.
//!
//! Destinations are keyed by document id (internal links) or by the position
//! of the rule in the external rule list (external links). Every render of a
//! source replaces that source's whole contribution, so re-rendering the same
//! content never inflates the counts.

use crate::error::StoreError;
use crate::rules::DocId;
use crate::store::{load_or_default, save, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Context fragments kept per destination per source.
pub const MAX_CONTEXTS: usize = 20;

// =============================================================================
// Types
// =============================================================================

/// The markup surrounding one generated link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub phrase: String,
    pub html: String,
    pub tag: String,
    #[serde(default)]
    pub manual: bool,
}

/// What one source contributes to one destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUsage {
    pub count: u64,
    #[serde(default)]
    pub phrases: BTreeMap<String, u64>,
    #[serde(default)]
    pub contexts: Vec<ContextSnippet>,
}

impl SourceUsage {
    /// Count one link whose visible text was `matched`.
    pub fn record(&mut self, matched: &str, snippet: Option<ContextSnippet>) {
        self.count += 1;
        *self.phrases.entry(matched.to_string()).or_insert(0) += 1;
        if let Some(s) = snippet {
            self.push_context(s);
        }
    }

    /// Add a snippet unless an identical one is present; the oldest go first past the cap.
    pub fn push_context(&mut self, snippet: ContextSnippet) {
        if self.contexts.iter().any(|c| c.phrase == snippet.phrase && c.html == snippet.html) {
            return;
        }
        self.contexts.push(snippet);
        if self.contexts.len() > MAX_CONTEXTS {
            let excess = self.contexts.len() - MAX_CONTEXTS;
            self.contexts.drain(..excess);
        }
    }

    pub fn contexts_by_phrase(&self) -> BTreeMap<&str, Vec<&ContextSnippet>> {
        let mut out: BTreeMap<&str, Vec<&ContextSnippet>> = BTreeMap::new();
        for c in &self.contexts {
            out.entry(c.phrase.as_str()).or_default().push(c);
        }
        out
    }
}

/// Display data for external destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLabel {
    pub phrase: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<UsageLabel>,
    #[serde(default)]
    pub sources: BTreeMap<DocId, SourceUsage>,
}

impl UsageEntry {
    fn recount(&mut self) {
        self.count = self.sources.values().map(|s| s.count).sum();
    }
}

/// One contribution of a source to a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub destination: u64,
    pub usage: SourceUsage,
    pub label: Option<UsageLabel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageMap {
    entries: BTreeMap<u64, UsageEntry>,
}

// =============================================================================
// UsageMap
// =============================================================================

impl UsageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, destination: u64) -> Option<&UsageEntry> {
        self.entries.get(&destination)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &UsageEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all link counts.
    pub fn total_links(&self) -> u64 {
        self.entries.values().map(|e| e.count).sum()
    }

    /// Remove everything `source` contributed. Entries left without sources are dropped.
    pub fn purge_source(&mut self, source: DocId) {
        for entry in self.entries.values_mut() {
            if entry.sources.remove(&source).is_some() {
                entry.recount();
            }
        }
        self.entries.retain(|_, e| !e.sources.is_empty());
    }

    pub fn remove_destination(&mut self, destination: u64) -> Option<UsageEntry> {
        self.entries.remove(&destination)
    }

    fn insert(&mut self, source: DocId, contribution: Contribution) {
        if contribution.usage.count == 0 {
            return;
        }
        let entry = self.entries.entry(contribution.destination).or_default();
        if contribution.label.is_some() {
            entry.label = contribution.label;
        }
        let slot = entry.sources.entry(source).or_default();
        slot.count += contribution.usage.count;
        for (text, n) in contribution.usage.phrases {
            *slot.phrases.entry(text).or_insert(0) += n;
        }
        for c in contribution.usage.contexts {
            slot.push_context(c);
        }
        entry.recount();
    }

    /// Purge `source`, then add its current contributions.
    pub fn replace_source(&mut self, source: DocId, contributions: impl IntoIterator<Item = Contribution>) {
        self.purge_source(source);
        for c in contributions {
            self.insert(source, c);
        }
    }
}

/// Load the map at `key`, replace `source`'s contribution, and store it back.
pub fn apply_contributions(
    kv: &dyn KeyValueStore,
    key: &str,
    source: DocId,
    contributions: Vec<Contribution>,
) -> Result<UsageMap, StoreError> {
    let mut map: UsageMap = load_or_default(kv, key)?;
    map.replace_source(source, contributions);
    save(kv, key, &map)?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(texts: &[&str]) -> SourceUsage {
        let mut u = SourceUsage::default();
        for t in texts {
            u.record(t, None);
        }
        u
    }

    fn contribution(destination: u64, texts: &[&str]) -> Contribution {
        Contribution { destination, usage: usage(texts), label: None }
    }

    #[test]
    fn test_replace_source_does_not_double_count() {
        let mut map = UsageMap::new();
        for _ in 0..3 {
            map.replace_source(10, vec![contribution(1, &["Rust", "rust"])]);
        }
        let entry = map.get(1).unwrap();
        assert_eq!(entry.count, 2);
        assert_eq!(entry.sources[&10].phrases["Rust"], 1);
        assert_eq!(entry.sources[&10].phrases["rust"], 1);
    }

    #[test]
    fn test_sources_are_additive() {
        let mut map = UsageMap::new();
        map.replace_source(10, vec![contribution(1, &["a"])]);
        map.replace_source(11, vec![contribution(1, &["a", "a"])]);
        assert_eq!(map.get(1).unwrap().count, 3);
        assert_eq!(map.total_links(), 3);
    }

    #[test]
    fn test_purge_drops_empty_destinations() {
        let mut map = UsageMap::new();
        map.replace_source(10, vec![contribution(1, &["a"]), contribution(2, &["b"])]);
        map.replace_source(11, vec![contribution(2, &["b"])]);
        map.replace_source(10, Vec::new());
        assert!(map.get(1).is_none());
        assert_eq!(map.get(2).unwrap().count, 1);
    }

    #[test]
    fn test_context_cap_evicts_oldest() {
        let mut u = SourceUsage::default();
        for i in 0..(MAX_CONTEXTS + 5) {
            u.push_context(ContextSnippet { phrase: "p".into(), html: format!("<p>{}</p>", i), tag: "p".into(), manual: false });
        }
        assert_eq!(u.contexts.len(), MAX_CONTEXTS);
        assert_eq!(u.contexts[0].html, "<p>5</p>");
        assert_eq!(u.contexts.last().unwrap().html, format!("<p>{}</p>", MAX_CONTEXTS + 4));
    }

    #[test]
    fn test_context_dedupes_on_phrase_and_html() {
        let mut u = SourceUsage::default();
        let s = ContextSnippet { phrase: "p".into(), html: "<p>x</p>".into(), tag: "p".into(), manual: false };
        u.push_context(s.clone());
        u.push_context(s);
        assert_eq!(u.contexts.len(), 1);
        assert_eq!(u.contexts_by_phrase()["p"].len(), 1);
    }

    #[test]
    fn test_serializes_with_numeric_keys() {
        let mut map = UsageMap::new();
        map.replace_source(7, vec![contribution(3, &["x"])]);
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["3"]["count"], 1);
        let back: UsageMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }
}
