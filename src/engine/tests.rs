//! Tests for LinkManager

use super::*;
use crate::store::{DocumentRecord, MemoryDocuments, MemoryRuleMeta, MemoryStore};
use serde_json::json;

type Manager = LinkManager<MemoryStore, MemoryDocuments, MemoryRuleMeta>;

const BODY: &str = "<p>We ship Rust code.</p><p>Serde handles JSON.</p>";

fn manager() -> Manager {
    let docs = MemoryDocuments::new();
    for id in 1..=4 {
        docs.insert(DocumentRecord::new(id, "post", BODY));
    }
    let m = LinkManager::new(MemoryStore::new(), docs, MemoryRuleMeta::new());
    m.save_settings(Settings { min_content_length: 0, min_element_length: 0, ..Settings::default() }).unwrap();
    m
}

fn rules(phrases: &[&str]) -> DocumentRuleMeta {
    DocumentRuleMeta { rules: phrases.iter().map(|p| PhraseRule::new(p)).collect(), ..Default::default() }
}

// ----------------------------------------------------------------------------
// Requirement 1: rendering and usage
// ----------------------------------------------------------------------------

#[test]
fn test_render_document_links_and_records_usage() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();

    let html = m.render_document(2).unwrap();
    assert!(html.contains("<a href=\"/?p=1\""));
    let usage = m.usage_internal().unwrap();
    assert_eq!(usage.get(1).unwrap().count, 1);
    assert_eq!(usage.get(1).unwrap().sources[&2].phrases["Rust"], 1);
}

#[test]
fn test_repeated_renders_do_not_drift() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    let first = m.render_document(2).unwrap();
    let second = m.render_document(2).unwrap();
    assert_eq!(first, second);
    assert_eq!(m.usage_internal().unwrap().get(1).unwrap().count, 1);
}

#[test]
fn test_render_fails_open() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    let broken = "<div>Rust <em>code</div>";
    assert_eq!(m.render(broken, &RenderContext::for_document(2, "post")), broken);
    assert!(m.usage_internal().unwrap().is_empty());
}

#[test]
fn test_render_without_source_records_nothing() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    let html = m.render(BODY, &RenderContext::default());
    assert!(html.contains("/?p=1"));
    assert!(m.usage_internal().unwrap().is_empty());
}

#[test]
fn test_timing_accumulates_only_when_enabled() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    m.render_document(2);
    assert_eq!(m.take_timing_ms(), 0.0);

    let s = Settings { log_internal_timing: true, ..m.settings().unwrap() };
    m.save_settings(s).unwrap();
    m.render_document(2);
    assert!(m.take_timing_ms() >= 0.0);
    assert_eq!(m.take_timing_ms(), 0.0);
}

// ----------------------------------------------------------------------------
// Requirement 2: document lifecycle
// ----------------------------------------------------------------------------

#[test]
fn test_rebuild_only_when_rules_change() {
    let m = manager();
    assert!(m.update_document_rules(1, rules(&["rust", " rust "])).unwrap());
    assert_eq!(m.index().unwrap().len(), 1);
    assert!(!m.update_document_rules(1, rules(&["rust"])).unwrap());
    assert!(m.update_document_rules(1, rules(&[])).unwrap());
    assert!(m.index().unwrap().is_empty());
}

#[test]
fn test_deleted_document_is_forgotten() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    m.update_document_rules(3, rules(&["serde"])).unwrap();
    m.render_document(1);
    m.render_document(2);
    assert!(m.usage_internal().unwrap().get(3).unwrap().sources.contains_key(&1));

    m.docs().remove(1);
    m.on_document_deleted(1).unwrap();
    let usage = m.usage_internal().unwrap();
    assert!(usage.get(1).is_none());
    assert!(!usage.get(3).unwrap().sources.contains_key(&1));
    assert!(m.index().unwrap().rules.iter().all(|r| r.target != 1));
}

#[test]
fn test_publish_triggers_auto_scan_when_enabled() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    assert!(m.on_document_published(1).unwrap().is_none());

    let s = Settings { auto_scan_on_save: true, ..m.settings().unwrap() };
    m.save_settings(s).unwrap();
    let summary = m.on_document_published(1).unwrap().unwrap();
    assert_eq!(summary.scanned, 4);
    assert_eq!(summary.internal_links, 3);
    let log = m.activity().unwrap().recent(5).unwrap();
    assert!(log.iter().any(|e| e.message == "Auto scan started after save: 4 pages queued."));
}

#[test]
fn test_rebuild_failure_is_reported() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    m.docs().set_unavailable(true);
    let report = m.rebuild_index().unwrap();
    assert!(report.index.is_empty());
    assert!(m.rebuild_error().unwrap().unwrap().starts_with("Index rebuild failed"));
}

// ----------------------------------------------------------------------------
// Requirement 3: external rules, maintenance, import/export
// ----------------------------------------------------------------------------

#[test]
fn test_save_external_rules_sanitizes_and_scans() {
    let m = manager();
    let s = Settings { auto_scan_on_external: true, ..m.settings().unwrap() };
    m.save_settings(s).unwrap();

    let saved = m
        .save_external_rules(&json!([
            {"phrase": " serde ", "url": "https://serde.rs", "exclude_ids": "2, 2; x"},
            {"phrase": "", "url": "https://nowhere.example"}
        ]))
        .unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].phrase, "serde");
    assert_eq!(saved[0].exclude_ids, vec![2]);
    assert_eq!(m.usage_external().unwrap().get(0).unwrap().count, 3);
}

#[test]
fn test_reset_usage_abandons_scan() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    m.start_scan().unwrap();
    m.scan_step(Some(1)).unwrap();
    m.reset_usage().unwrap();
    assert!(m.usage_internal().unwrap().is_empty());
    assert!(!matches!(m.scan_phase().unwrap(), ScanPhase::Scanning(_)));
}

#[test]
fn test_purge_removes_all_rule_data() {
    let m = manager();
    m.update_document_rules(1, rules(&["rust"])).unwrap();
    m.update_document_rules(3, DocumentRuleMeta { no_outgoing: true, ..rules(&["serde"]) }).unwrap();
    m.save_external_rules(&json!([{"phrase": "serde", "url": "https://serde.rs"}])).unwrap();
    m.run_scan().unwrap();

    assert_eq!(m.purge().unwrap(), 2);
    assert!(m.index().unwrap().is_empty());
    assert!(m.meta().ids().unwrap().is_empty());
    assert_eq!(m.meta().read(3).unwrap(), DocumentRuleMeta::default());
    assert!(m.external_rules().unwrap().is_empty());
    assert!(m.usage_internal().unwrap().is_empty());
    assert_eq!(m.scan_phase().unwrap(), ScanPhase::Idle);

    // nothing comes back on the next rebuild
    assert!(m.rebuild_index().unwrap().index.is_empty());
    assert_eq!(m.render_document(2).unwrap(), BODY);
}

#[test]
fn test_import_rebuilds_and_logs() {
    let source = manager();
    source.update_document_rules(2, rules(&["serde"])).unwrap();
    let bundle = serde_json::to_string(&source.export().unwrap()).unwrap();

    let target = manager();
    let (report, rebuilt) = target.import(&bundle).unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(rebuilt.index.len(), 1);
    assert_eq!(target.index_summary().unwrap().total_targets, 1);
    let page = target.activity_page(1, 10).unwrap();
    assert_eq!(page.entries[0].message, "Import finished and index rebuilt.");
}
