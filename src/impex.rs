//! Import / export of settings, external rules and per-document rules.
//!
//! The bundle is plain JSON so it can move between sites. Imports go through
//! the same sanitation as form input; rebuilding the index afterwards is the
//! caller's job.

use crate::config::Settings;
use crate::error::{ImportError, StoreError};
use crate::rules::{sanitize_external_rules, DocId, DocumentRuleMeta, ExternalRule, PhraseRule};
use crate::store::{keys, load_or_default, save, KeyValueStore, RuleMetaStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedRules {
    pub rules: Vec<PhraseRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_target: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub settings: Settings,
    pub external: Vec<ExternalRule>,
    pub posts: BTreeMap<DocId, ExportedRules>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub settings: bool,
    pub external: Option<usize>,
    pub documents: usize,
}

pub fn export(kv: &dyn KeyValueStore, meta: &dyn RuleMetaStore) -> Result<ExportBundle, StoreError> {
    let settings: Settings = load_or_default(kv, keys::SETTINGS)?;
    let external: Vec<ExternalRule> = load_or_default(kv, keys::EXTERNAL_RULES)?;

    let mut posts = BTreeMap::new();
    for id in meta.ids()? {
        let m = match meta.read(id) {
            Ok(m) => m,
            Err(e) => {
                warn!(target_doc = id, error = %e, "not exported");
                continue;
            }
        };
        if m.rules.is_empty() && m.max_per_target.is_none() && m.target_priority == 0 {
            continue;
        }
        posts.insert(
            id,
            ExportedRules {
                rules: m.rules,
                max_per_target: m.max_per_target,
                priority: (m.target_priority != 0).then_some(m.target_priority),
            },
        );
    }
    Ok(ExportBundle { settings, external, posts })
}

/// Integer from a number or a numeric string; None for null, missing or junk.
fn loose_int(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn import_document(meta: &dyn RuleMetaStore, id: DocId, payload: &Value) -> Result<(), StoreError> {
    let rules = match payload.get("rules") {
        Some(r) if payload.is_object() => r,
        _ => payload,
    };
    let mut record = meta.read(id).unwrap_or_default();
    if rules.is_array() {
        let parsed: DocumentRuleMeta = serde_json::from_value(json!({ "rules": rules }))
            .map_err(|e| StoreError::Serde { key: format!("posts.{}", id), reason: e.to_string() })?;
        record.rules = parsed.rules.into_iter().filter(|r| !r.phrase.is_empty()).collect();
    }
    record.max_per_target = loose_int(payload.get("max_per_target")).map(|n| n.max(0));
    record.target_priority = loose_int(payload.get("priority")).map(|n| n.clamp(0, 100)).unwrap_or(0);
    meta.write(id, &record)
}

/// Apply an export bundle. Sections that are missing are left alone.
pub fn import(kv: &dyn KeyValueStore, meta: &dyn RuleMetaStore, raw: &str) -> Result<ImportReport, ImportError> {
    let data: Value = serde_json::from_str(raw).map_err(|e| ImportError::InvalidJson(e.to_string()))?;
    let Some(data) = data.as_object() else {
        return Err(ImportError::NotAnObject);
    };
    let mut report = ImportReport::default();

    if let Some(raw_settings) = data.get("settings") {
        match serde_json::from_value::<Settings>(raw_settings.clone()) {
            Ok(s) => {
                save(kv, keys::SETTINGS, &s.sanitized())?;
                report.settings = true;
            }
            Err(e) => warn!(error = %e, "imported settings ignored"),
        }
    }

    if let Some(raw_external) = data.get("external").filter(|v| v.is_array()) {
        let rules = sanitize_external_rules(raw_external);
        save(kv, keys::EXTERNAL_RULES, &rules)?;
        report.external = Some(rules.len());
    }

    if let Some(posts) = data.get("posts").and_then(Value::as_object) {
        for (key, payload) in posts {
            let Some(id) = key.trim().parse::<DocId>().ok().filter(|&id| id > 0) else {
                continue;
            };
            match import_document(meta, id, payload) {
                Ok(()) => report.documents += 1,
                Err(e) => warn!(target_doc = id, error = %e, "document rules not imported"),
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryRuleMeta, MemoryStore};

    #[test]
    fn test_export_then_import_elsewhere() {
        let kv = MemoryStore::new();
        let meta = MemoryRuleMeta::new();
        meta.put_raw(4, json!({"rules": ["alpha", {"phrase": "beta", "case": true}], "max_per_target": 3, "target_priority": 20}));
        meta.put_raw(5, json!({"no_outgoing": true}));
        save(&kv, keys::EXTERNAL_RULES, &vec![ExternalRule::new("serde", "https://serde.rs")]).unwrap();

        let bundle = export(&kv, &meta).unwrap();
        assert_eq!(bundle.posts.len(), 1);
        assert_eq!(bundle.posts[&4].priority, Some(20));

        let json = serde_json::to_string(&bundle).unwrap();
        let kv2 = MemoryStore::new();
        let meta2 = MemoryRuleMeta::new();
        let report = import(&kv2, &meta2, &json).unwrap();
        assert!(report.settings);
        assert_eq!(report.external, Some(1));
        assert_eq!(report.documents, 1);

        let imported = meta2.read(4).unwrap();
        assert_eq!(imported.rules.len(), 2);
        assert!(imported.rules[1].case);
        assert_eq!(imported.max_per_target, Some(3));
        assert_eq!(imported.target_priority, 20);
    }

    #[test]
    fn test_import_accepts_bare_rule_lists_and_clamps() {
        let kv = MemoryStore::new();
        let meta = MemoryRuleMeta::new();
        let raw = r#"{"posts": {"7": ["gamma"], "8": {"rules": ["delta"], "priority": "250", "max_per_target": -2}, "x": ["nope"]}}"#;
        let report = import(&kv, &meta, raw).unwrap();
        assert_eq!(report.documents, 2);
        assert!(!report.settings);
        assert_eq!(meta.read(7).unwrap().rules[0].phrase, "gamma");
        let eight = meta.read(8).unwrap();
        assert_eq!(eight.target_priority, 100);
        assert_eq!(eight.max_per_target, Some(0));
    }

    #[test]
    fn test_import_rejects_non_objects() {
        let kv = MemoryStore::new();
        let meta = MemoryRuleMeta::new();
        assert!(matches!(import(&kv, &meta, "[1, 2]"), Err(ImportError::NotAnObject)));
        assert!(matches!(import(&kv, &meta, "{oops"), Err(ImportError::InvalidJson(_))));
    }
}
