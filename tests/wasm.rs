//! Browser-side tests for the LinkEngine bindings.
#![cfg(target_arch = "wasm32")]

use linkcore::LinkEngine;
use serde_json::json;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn js(value: serde_json::Value) -> JsValue {
    serde_wasm_bindgen::to_value(&value).unwrap()
}

fn engine() -> LinkEngine {
    let engine = LinkEngine::js_new();
    engine
        .js_save_settings(js(json!({"min_content_length": 0, "min_element_length": 0, "rel": "", "title_mode": "none", "aria_mode": "none", "default_class": ""})))
        .unwrap();
    engine
        .js_upsert_document(js(json!({"id": 1, "url": "/rust", "content": "<p>About Rust.</p>"})))
        .unwrap();
    engine
        .js_upsert_document(js(json!({"id": 2, "url": "/blog", "content": "<p>I write rust daily.</p>"})))
        .unwrap();
    engine
}

#[wasm_bindgen_test]
fn test_render_document_links_phrase() {
    let engine = engine();
    assert!(engine.js_set_document_rules(1, js(json!({"rules": ["rust"]}))).unwrap());
    let html = engine.js_render_document(2).unwrap();
    assert_eq!(html, "<p>I write <a href=\"/rust\">rust</a> daily.</p>");
}

#[wasm_bindgen_test]
fn test_render_accepts_missing_context() {
    let engine = engine();
    engine.js_set_document_rules(1, js(json!({"rules": ["rust"]}))).unwrap();
    let html = engine.js_render("<p>rust</p>", JsValue::UNDEFINED);
    assert_eq!(html, "<p><a href=\"/rust\">rust</a></p>");
}

#[wasm_bindgen_test]
fn test_scan_reports_progress() {
    let engine = engine();
    engine.js_set_document_rules(1, js(json!({"rules": ["rust"]}))).unwrap();
    engine.js_start_scan().unwrap();
    let progress: serde_json::Value = serde_wasm_bindgen::from_value(engine.js_scan_step(10).unwrap()).unwrap();
    assert_eq!(progress["done"], true);
    assert_eq!(progress["total"], 2);
}

#[wasm_bindgen_test]
fn test_invalid_rules_are_rejected() {
    let engine = engine();
    assert!(engine.js_set_document_rules(1, js(json!({"rules": 5}))).is_err());
}

#[wasm_bindgen_test]
fn test_export_import_roundtrip() {
    let engine = engine();
    engine.js_set_document_rules(1, js(json!({"rules": ["rust"]}))).unwrap();
    let bundle = engine.js_export_json().unwrap();

    let other = self::engine();
    assert!(other.js_import_json(&bundle).is_ok());
    assert!(other.js_import_json("not json").is_err());
}
