//! LinkCore: Phrase Autolinker + Resumable Site Scanner
//!
//! Turns configured phrases into links toward internal documents or external
//! URLs while rendering content, and keeps site-wide counts of which pages
//! link where.
//!
//! # Architecture
//!
//! ## Rules
//! - `pattern/` - Pattern Compiler: literal / regex / token phrases → boundary-aware matchers
//! - `rules/` - per-document rule records, external rules, legacy migration
//! - `index/` - Rule Index Builder: one globally ordered rule list
//!
//! ## Rewriting
//! - `html/` - arena markup tree parsed and serialized through html5ever
//! - `rewriter/` - Content Rewriter: tree walk, caps, context, cross-inline matches
//! - `usage/` - UsageMap: per-destination, per-source link counts and context snippets
//!
//! ## Orchestration
//! - `scan/` - resumable batched scan rebuilding the usage maps
//! - `engine/` - LinkManager: lifecycle hooks, maintenance, import/export
//! - `store/` - collaborator traits and in-memory implementations
//! - `wasm.rs` - `LinkEngine` JS facade
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { LinkEngine } from 'linkcore';
//!
//! await init();
//! const engine = new LinkEngine();
//! engine.upsertDocument({ id: 1, url: '/rust', content: '...' });
//! engine.setDocumentRules(1, { rules: ['rust'] });
//! engine.renderDocument(2);
//! ```

pub mod activity;
pub mod config;
pub mod engine;
pub mod error;
pub mod html;
pub mod impex;
pub mod index;
pub mod pattern;
pub mod rewriter;
pub mod rules;
pub mod scan;
pub mod store;
pub mod usage;
pub mod wasm;

pub use config::Settings;
pub use engine::LinkManager;
pub use error::{CompileError, ImportError, ParseError, PatternError, RewriteError, StoreError};
pub use pattern::{compile, MatchKind, Pattern};
pub use rewriter::{rewrite, LinkContext, RenderContext, RewriteOutcome, Surface};
pub use rules::{DocId, DocumentRuleMeta, ExternalRule, PhraseRule};
pub use scan::{ScanOrchestrator, ScanPhase, ScanProgress, ScanState, ScanSummary};
pub use wasm::LinkEngine;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("linkcore v{}", env!("CARGO_PKG_VERSION"))
}
