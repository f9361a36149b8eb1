//! Content Rewriter: turns matching phrases into links.
//!
//! # Architecture
//!
//! - `context.rs` - LinkContext: compiled rules for one render or scan batch
//! - `prefilter.rs` - Aho-Corasick gate for literal phrases
//! - `link.rs` - attribute resolution and link template rendering
//! - `cross_inline.rs` - phrases split across a formatting element and the text after it
//!
//! # Pass
//! 1. Early exits (surface, length, opt-out, document type, no rules)
//! 2. Parse into the arena; a parse failure leaves the content untouched
//! 3. Snapshot the text nodes, then for each node: base skip, tag skip lists,
//!    minimum element length, internal rules then external rules, first match wins
//! 4. Serialize without the synthetic wrapper
//!
//! Counters live on the pass and start from zero every time, so the same
//! input always produces the same output and the same match log.

pub mod context;
pub mod cross_inline;
pub mod link;
pub mod prefilter;

pub use context::{ExternalEntry, InternalRule, LinkContext};
pub use link::{resolve_attr, LinkAttrs};

use crate::error::RewriteError;
use crate::html::{Document, NodeId};
use crate::pattern::{MatchKind, Pattern, Span};
use crate::rules::DocId;
use crate::usage::{ContextSnippet, Contribution, SourceUsage, UsageLabel};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Ancestors that never receive links.
const BASE_SKIP_TAGS: &[&str] = &["a", "script", "style", "code", "pre"];

/// Longest context snippet kept, in grapheme clusters.
const SNIPPET_LIMIT: usize = 8000;

// =============================================================================
// Types
// =============================================================================

/// Where the content is being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// A single document view
    #[default]
    Singular,
    /// Listings: archives, search results, home page loops
    Archive,
    Admin,
    Feed,
    Api,
}

/// The document being rendered and how.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderContext {
    pub source: Option<DocId>,
    pub doc_type: Option<String>,
    pub surface: Surface,
    /// The source document opted out of outgoing links
    pub no_outgoing: bool,
    /// Process regardless of surface (scans, explicit calls)
    pub force: bool,
    /// Record external matches for the external usage map
    pub collect_external: bool,
}

impl RenderContext {
    pub fn for_document(id: DocId, doc_type: &str) -> Self {
        Self { source: Some(id), doc_type: Some(doc_type.to_string()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SurfaceDisabled,
    EmptyContent,
    TooShort,
    NotSingular,
    OptedOut,
    TypeExcluded,
    NoRules,
}

/// Matches recorded during one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLog {
    pub internal: BTreeMap<DocId, SourceUsage>,
    pub external: BTreeMap<usize, SourceUsage>,
    pub external_labels: BTreeMap<usize, UsageLabel>,
    pub links: u32,
}

impl MatchLog {
    pub fn internal_contributions(&self) -> Vec<Contribution> {
        self.internal
            .iter()
            .map(|(target, usage)| Contribution { destination: *target, usage: usage.clone(), label: None })
            .collect()
    }

    pub fn external_contributions(&self) -> Vec<Contribution> {
        self.external
            .iter()
            .map(|(idx, usage)| Contribution {
                destination: *idx as u64,
                usage: usage.clone(),
                label: self.external_labels.get(idx).cloned(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteOutcome {
    pub html: String,
    pub log: MatchLog,
    pub skipped: Option<SkipReason>,
    pub elapsed_us: u64,
}

impl RewriteOutcome {
    fn unchanged(html: &str, reason: SkipReason) -> Self {
        Self { html: html.to_string(), log: MatchLog::default(), skipped: Some(reason), elapsed_us: 0 }
    }

    pub fn changed(&self) -> bool {
        self.log.links > 0
    }
}

// =============================================================================
// Entry Points
// =============================================================================

fn strip_blocks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("static regex"))
}

fn strip_tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

/// Character length of the content with all markup removed and references decoded.
pub fn plain_text_len(html: &str) -> usize {
    let without_blocks = strip_blocks().replace_all(html, "");
    let text = strip_tags().replace_all(&without_blocks, "");
    html_escape::decode_html_entities(&text).trim().chars().count()
}

fn precheck(ctx: &LinkContext, html: &str, render: &RenderContext) -> Option<SkipReason> {
    let settings = &ctx.settings;
    if !render.force && matches!(render.surface, Surface::Admin | Surface::Feed | Surface::Api) {
        return Some(SkipReason::SurfaceDisabled);
    }
    if html.trim().is_empty() {
        return Some(SkipReason::EmptyContent);
    }
    if plain_text_len(html) < settings.min_content_length {
        return Some(SkipReason::TooShort);
    }
    if !render.force && render.surface == Surface::Archive && !settings.process_on_archives {
        return Some(SkipReason::NotSingular);
    }
    if let Some(t) = render.doc_type.as_deref() {
        if !settings.processes_type(t) {
            return Some(SkipReason::TypeExcluded);
        }
    }
    if render.no_outgoing {
        return Some(SkipReason::OptedOut);
    }
    if !ctx.has_rules() {
        return Some(SkipReason::NoRules);
    }
    None
}

/// Rewrite `html`, reporting failures.
pub fn rewrite(ctx: &LinkContext, html: &str, render: &RenderContext) -> Result<RewriteOutcome, RewriteError> {
    let started = instant::Instant::now();
    if let Some(reason) = precheck(ctx, html, render) {
        return Ok(RewriteOutcome::unchanged(html, reason));
    }

    let internal: Vec<usize> = ctx
        .internal
        .iter()
        .enumerate()
        .filter(|(_, r)| Some(r.rule.target) != render.source)
        .map(|(i, _)| i)
        .collect();
    let external: Vec<usize> = ctx
        .external
        .iter()
        .enumerate()
        .filter(|(_, r)| r.rule.applies_to(render.source, render.doc_type.as_deref()))
        .map(|(i, _)| i)
        .collect();
    if internal.is_empty() && external.is_empty() {
        return Ok(RewriteOutcome::unchanged(html, SkipReason::NoRules));
    }

    let doc = Document::parse(html)?;
    let mut pass = Pass {
        ctx,
        doc,
        internal,
        external,
        collect_external: render.collect_external,
        per_target: BTreeMap::new(),
        per_external: BTreeMap::new(),
        total: 0,
        log: MatchLog::default(),
    };
    pass.walk()?;

    let html = if pass.log.links == 0 { html.to_string() } else { pass.doc.serialize() };
    Ok(RewriteOutcome {
        html,
        log: pass.log,
        skipped: None,
        elapsed_us: started.elapsed().as_micros() as u64,
    })
}

/// Fail-open entry point: any failure yields the original content.
pub fn render(ctx: &LinkContext, html: &str, render: &RenderContext) -> String {
    match rewrite(ctx, html, render) {
        Ok(outcome) => outcome.html,
        Err(e) => {
            warn!(source = ?render.source, error = %e, "rewrite failed, serving original content");
            html.to_string()
        }
    }
}

// =============================================================================
// Pass
// =============================================================================

enum Attempt {
    Fired,
    Missed,
    /// Page-wide cap reached: stop the whole walk
    Stop,
}

struct Pass<'c> {
    ctx: &'c LinkContext,
    doc: Document,
    /// Eligible rules, as positions in the context lists
    internal: Vec<usize>,
    external: Vec<usize>,
    collect_external: bool,
    per_target: BTreeMap<DocId, u32>,
    per_external: BTreeMap<usize, u32>,
    total: u32,
    log: MatchLog,
}

impl<'c> Pass<'c> {
    fn page_cap_reached(&self) -> bool {
        let cap = self.ctx.settings.max_total_per_page;
        cap > 0 && self.total >= cap
    }

    fn base_skip(&self, node: NodeId) -> bool {
        let marker = self.ctx.settings.no_autolink_class.as_str();
        self.doc.ancestors(node).any(|a| {
            self.doc
                .element(a)
                .map(|el| BASE_SKIP_TAGS.contains(&el.tag.as_str()) || el.has_class(marker))
                .unwrap_or(false)
        })
    }

    fn in_tags(&self, node: NodeId, tags: &[String]) -> bool {
        if tags.is_empty() {
            return false;
        }
        self.doc.ancestors(node).any(|a| self.doc.tag(a).map(|t| tags.iter().any(|x| x == t)).unwrap_or(false))
    }

    fn context_ok(&self, patterns: &[Pattern], element_text: &mut Option<String>, element: NodeId) -> Result<bool, RewriteError> {
        if patterns.is_empty() {
            return Ok(true);
        }
        let text = element_text.get_or_insert_with(|| self.doc.text_content(element));
        for p in patterns {
            if !p.is_match(text)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn walk(&mut self) -> Result<(), RewriteError> {
        let ctx = self.ctx;
        let settings = &ctx.settings;
        let internal = self.internal.clone();
        let external = self.external.clone();

        'nodes: for node in self.doc.text_nodes() {
            if !self.doc.is_attached(node) || self.base_skip(node) {
                continue;
            }
            let skip_internal = self.in_tags(node, &settings.skip_elements_internal);
            let base_skip_external = self.in_tags(node, &settings.skip_elements_external);
            if skip_internal && base_skip_external {
                continue;
            }
            let text = match self.doc.text(node) {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => continue,
            };

            let element = self.doc.closest_element(node);
            let mut element_text: Option<String> = None;
            if settings.min_element_length > 0 {
                let et = self.doc.text_content(element);
                if et.chars().count() < settings.min_element_length {
                    continue;
                }
                element_text = Some(et);
            }

            let hits = ctx.prefilter.scan(&text);

            if !skip_internal {
                for &i in &internal {
                    let rule = &ctx.internal[i];
                    let limit = rule.rule.max_per_target.unwrap_or(settings.max_per_target);
                    if limit > 0 && self.per_target.get(&rule.rule.target).copied().unwrap_or(0) >= limit {
                        continue;
                    }
                    if self.page_cap_reached() {
                        break 'nodes;
                    }
                    if !rule.rule.allowed_tags.is_empty() && !self.in_tags(node, &rule.rule.allowed_tags) {
                        continue;
                    }
                    if !self.context_ok(&rule.context, &mut element_text, element)? {
                        continue;
                    }
                    match self.attempt_internal(node, &text, i, hits.internal(i))? {
                        Attempt::Fired => continue 'nodes,
                        Attempt::Stop => break 'nodes,
                        Attempt::Missed => {}
                    }
                }
            }

            for &i in &external {
                let entry = &ctx.external[i];
                if entry.rule.allowed_tags.is_empty() {
                    if base_skip_external {
                        continue;
                    }
                } else if !self.in_tags(node, &entry.rule.allowed_tags) {
                    continue;
                }
                if !self.context_ok(&entry.context, &mut element_text, element)? {
                    continue;
                }
                if self.page_cap_reached() {
                    break 'nodes;
                }
                let limit = entry.rule.max_per_page;
                if limit > 0 && self.per_external.get(&entry.idx).copied().unwrap_or(0) >= limit {
                    continue;
                }
                match self.attempt_external(node, &text, i, hits.external(i))? {
                    Attempt::Fired => continue 'nodes,
                    Attempt::Stop => break 'nodes,
                    Attempt::Missed => {}
                }
            }
        }
        Ok(())
    }

    fn internal_attrs(&self, rule: &InternalRule, matched: &str) -> LinkAttrs {
        let s = &self.ctx.settings;
        LinkAttrs {
            url: rule.url.clone(),
            rel: s.rel.clone(),
            title: resolve_attr(s.title_mode, &s.title_custom, matched, rule.title.as_deref()),
            aria: resolve_attr(s.aria_mode, &s.aria_custom, matched, rule.title.as_deref()),
            class: s.default_class.clone(),
        }
    }

    fn external_attrs(&self, entry: &ExternalEntry, matched: &str) -> LinkAttrs {
        let r = &entry.rule;
        let class = if r.class.is_empty() { self.ctx.settings.default_class.clone() } else { r.class.clone() };
        LinkAttrs {
            url: r.url.clone(),
            rel: r.rel.clone(),
            title: resolve_attr(r.title_mode, &r.title_custom, matched, None),
            aria: resolve_attr(r.aria_mode, &r.aria_custom, matched, None),
            class,
        }
    }

    fn attempt_internal(&mut self, node: NodeId, text: &str, i: usize, candidate: bool) -> Result<Attempt, RewriteError> {
        let ctx = self.ctx;
        let rule = &ctx.internal[i];
        let linked = self.attempt(node, text, &rule.pattern, rule.rule.kind, candidate, |pass, matched| {
            pass.internal_attrs(rule, matched)
        })?;
        let Some((matched, anchor)) = linked else {
            return Ok(Attempt::Missed);
        };
        let snippet = self.snippet(anchor, &matched);
        self.log.internal.entry(rule.rule.target).or_default().record(&matched, Some(snippet));
        *self.per_target.entry(rule.rule.target).or_insert(0) += 1;
        self.count_link();
        debug!(target_doc = rule.rule.target, matched = %matched, "internal link");
        Ok(if self.page_cap_reached() { Attempt::Stop } else { Attempt::Fired })
    }

    fn attempt_external(&mut self, node: NodeId, text: &str, i: usize, candidate: bool) -> Result<Attempt, RewriteError> {
        let ctx = self.ctx;
        let entry = &ctx.external[i];
        let linked = self.attempt(node, text, &entry.pattern, entry.rule.match_kind(), candidate, |pass, matched| {
            pass.external_attrs(entry, matched)
        })?;
        let Some((matched, anchor)) = linked else {
            return Ok(Attempt::Missed);
        };
        if self.collect_external {
            let snippet = self.snippet(anchor, &matched);
            self.log.external.entry(entry.idx).or_default().record(&matched, Some(snippet));
            self.log
                .external_labels
                .insert(entry.idx, UsageLabel { phrase: entry.rule.phrase.clone(), url: entry.rule.url.clone() });
        }
        *self.per_external.entry(entry.idx).or_insert(0) += 1;
        self.count_link();
        debug!(rule = entry.idx, matched = %matched, "external link");
        Ok(if self.page_cap_reached() { Attempt::Stop } else { Attempt::Fired })
    }

    fn count_link(&mut self) {
        self.total += 1;
        self.log.links += 1;
    }

    /// Direct match, then cross-inline for literal phrases.
    /// Returns the matched text and the node holding the new link.
    fn attempt<F>(
        &mut self,
        node: NodeId,
        text: &str,
        pattern: &Pattern,
        kind: MatchKind,
        candidate: bool,
        attrs: F,
    ) -> Result<Option<(String, NodeId)>, RewriteError>
    where
        F: Fn(&Self, &str) -> LinkAttrs,
    {
        if candidate {
            if let Some(span) = pattern.find(text)? {
                if span.end > span.start {
                    let matched = text[span.start..span.end].to_string();
                    let link = attrs(self, &matched);
                    if let Some(anchor) = self.splice(node, text, span, &link, &matched) {
                        return Ok(Some((matched, anchor)));
                    }
                }
            }
        }
        if self.ctx.settings.cross_inline && kind == MatchKind::Literal {
            if let Some(split) = cross_inline::find(&self.doc, node, pattern)? {
                let link = attrs(self, &split.matched);
                let anchor = cross_inline::apply(&mut self.doc, node, &split, &link);
                return Ok(Some((split.matched, anchor)));
            }
        }
        Ok(None)
    }

    /// Replace `node` with before / link markup / after. `None` when the
    /// rendered template is not valid markup.
    fn splice(&mut self, node: NodeId, text: &str, span: Span, link: &LinkAttrs, matched: &str) -> Option<NodeId> {
        let markup = link.render(&self.ctx.settings.link_template, matched);
        let fragment = match self.doc.parse_fragment(&markup) {
            Ok(f) if !f.is_empty() => f,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "link template produced invalid markup");
                return None;
            }
        };
        let anchor = fragment[0];
        let mut parts = Vec::with_capacity(fragment.len() + 2);
        if span.start > 0 {
            parts.push(self.doc.create_text(&text[..span.start]));
        }
        parts.extend(fragment);
        if span.end < text.len() {
            parts.push(self.doc.create_text(&text[span.end..]));
        }
        self.doc.replace_with(node, &parts);
        Some(anchor)
    }

    /// Context of a new link, labelled with the text it matched.
    fn snippet(&self, anchor: NodeId, matched: &str) -> ContextSnippet {
        let element = self.doc.closest_element(anchor);
        let html = self.doc.outer_html(element);
        let html = html.trim();
        let html = if html.graphemes(true).nth(SNIPPET_LIMIT).is_some() {
            let mut cut: String = html.graphemes(true).take(SNIPPET_LIMIT).collect();
            cut.push('…');
            cut
        } else {
            html.to_string()
        };
        ContextSnippet {
            phrase: matched.to_string(),
            html,
            tag: self.doc.tag(element).unwrap_or("div").to_string(),
            manual: false,
        }
    }
}
