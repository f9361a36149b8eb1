//! Tests for the index builder

use super::*;
use crate::store::{load, DocStatus, DocumentRecord, MemoryDocuments, MemoryRuleMeta, MemoryStore};
use serde_json::json;

fn setup() -> (MemoryDocuments, MemoryRuleMeta, MemoryStore) {
    let docs = MemoryDocuments::new();
    for id in 1..=4 {
        docs.insert(DocumentRecord::new(id, "post", "body"));
    }
    (docs, MemoryRuleMeta::new(), MemoryStore::new())
}

// ----------------------------------------------------------------------------
// Requirement 1: ordering
// ----------------------------------------------------------------------------

#[test]
fn test_higher_destination_priority_comes_first() {
    let (docs, meta, kv) = setup();
    meta.put_raw(1, json!({"rules": [{"phrase": "alpha"}], "target_priority": 10}));
    meta.put_raw(2, json!({"rules": [{"phrase": "beta"}], "target_priority": 50}));

    let report = IndexBuilder::new(&docs, &meta, &kv).rebuild(&Settings::default()).unwrap();
    let targets: Vec<DocId> = report.index.rules.iter().map(|r| r.target).collect();
    assert_eq!(targets, vec![2, 1]);
    assert!(report.error.is_none());
}

#[test]
fn test_insertion_order_then_target_then_phrase() {
    let (docs, meta, kv) = setup();
    meta.put_raw(3, json!({"rules": ["zeta", "eta"]}));
    meta.put_raw(1, json!({"rules": ["omega", "alpha"]}));

    let (rules, _) = IndexBuilder::new(&docs, &meta, &kv).collect(&Settings::default()).unwrap();
    let order: Vec<(&str, u32)> = rules.iter().map(|r| (r.phrase.as_str(), r.priority)).collect();
    assert_eq!(order, vec![("omega", 0), ("zeta", 0), ("alpha", 1), ("eta", 1)]);
}

// ----------------------------------------------------------------------------
// Requirement 2: per-document overrides
// ----------------------------------------------------------------------------

#[test]
fn test_overrides_copied_onto_rules() {
    let (docs, meta, kv) = setup();
    meta.put_raw(
        1,
        json!({
            "rules": [{"phrase": "rust", "context": ["systems", "memory"]}],
            "max_per_target": 3,
            "target_priority": 140,
            "allowed_tags": "p, li",
            "context_enabled": true
        }),
    );
    let (rules, _) = IndexBuilder::new(&docs, &meta, &kv).collect(&Settings::default()).unwrap();
    let r = &rules[0];
    assert_eq!(r.max_per_target, Some(3));
    assert_eq!(r.target_priority, 100);
    assert_eq!(r.allowed_tags, vec!["p", "li"]);
    assert_eq!(r.context, vec!["systems", "memory"]);
}

#[test]
fn test_context_ignored_without_flag() {
    let (docs, meta, kv) = setup();
    meta.put_raw(1, json!({"rules": [{"phrase": "rust", "context": "systems"}]}));
    let (rules, _) = IndexBuilder::new(&docs, &meta, &kv).collect(&Settings::default()).unwrap();
    assert!(rules[0].context.is_empty());
}

// ----------------------------------------------------------------------------
// Requirement 3: invalid and ineligible rules
// ----------------------------------------------------------------------------

#[test]
fn test_invalid_regex_dropped_without_aborting() {
    let (docs, meta, kv) = setup();
    meta.put_raw(1, json!({"rules": [{"phrase": "(broken", "regex": true}, {"phrase": "fine"}, {"phrase": "   "}]}));
    let report = IndexBuilder::new(&docs, &meta, &kv).rebuild(&Settings::default()).unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(report.index.rules.len(), 1);
    assert_eq!(report.index.rules[0].phrase, "fine");
}

#[test]
fn test_unpublished_and_foreign_types_skipped() {
    let (docs, meta, kv) = setup();
    docs.set_status(2, DocStatus::Draft);
    docs.insert(DocumentRecord::new(9, "product", "x"));
    meta.put_raw(2, json!({"rules": ["draft phrase"]}));
    meta.put_raw(9, json!({"rules": ["product phrase"]}));
    meta.put_raw(1, json!({"rules": ["kept", "kept"]}));
    let (rules, _) = IndexBuilder::new(&docs, &meta, &kv).collect(&Settings::default()).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].phrase, "kept");
}

// ----------------------------------------------------------------------------
// Requirement 4: enumeration failure
// ----------------------------------------------------------------------------

#[test]
fn test_enumeration_failure_persists_empty_index() {
    let (docs, meta, kv) = setup();
    meta.put_raw(1, json!({"rules": ["kept"]}));
    let builder = IndexBuilder::new(&docs, &meta, &kv);
    builder.rebuild(&Settings::default()).unwrap();

    docs.set_unavailable(true);
    let report = builder.rebuild(&Settings::default()).unwrap();
    assert!(report.index.is_empty());
    let message = report.error.unwrap();
    assert!(message.starts_with("Index rebuild failed"));

    let stored: Index = load(&kv, keys::INDEX).unwrap().unwrap();
    assert!(stored.is_empty());
    let recorded: Option<String> = load(&kv, keys::REBUILD_ERROR).unwrap();
    assert_eq!(recorded, Some(message));

    docs.set_unavailable(false);
    builder.rebuild(&Settings::default()).unwrap();
    assert!(!kv.contains(keys::REBUILD_ERROR));
}

#[test]
fn test_summarize_counts_targets() {
    let (docs, meta, kv) = setup();
    meta.put_raw(1, json!({"rules": ["a"]}));
    meta.put_raw(2, json!({"rules": ["b", "c"]}));
    let report = IndexBuilder::new(&docs, &meta, &kv).rebuild(&Settings::default()).unwrap();
    let s = summarize(&report.index);
    assert_eq!(s.total_phrases, 3);
    assert_eq!(s.total_targets, 2);
    assert_eq!(s.per_target[0], TargetCount { target: 2, phrases: 2 });
}
