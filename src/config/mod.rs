//! Global settings for the rewriter, the index builder and the scanner.
//!
//! Every field carries an explicit serde default so that partially stored
//! records (or records written by an older version) load without surprises.
//! `Settings::sanitized()` applies the same normalization the settings form
//! would, so callers can trust the values after loading.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_LINK_TEMPLATE: &str = r#"<a href="{url}"{rel}{title}{aria}{class}>{text}</a>"#;
pub const DEFAULT_LINK_CLASS: &str = "linkcore-link";
pub const DEFAULT_NO_AUTOLINK_CLASS: &str = "linkcore--no-autolink";

// =============================================================================
// Attribute Modes
// =============================================================================

/// How a `title` or `aria-label` attribute is produced for a generated link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttrMode {
    /// Attribute is not emitted
    None,
    /// Attribute equals the matched text
    #[default]
    Phrase,
    /// Attribute equals the destination document's title (internal links only)
    PostTitle,
    /// Attribute equals a fixed string
    Custom,
}

impl AttrMode {
    /// Lenient parse used for form input and legacy records.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "phrase" => Some(Self::Phrase),
            "post_title" => Some(Self::PostTitle),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rel: String,
    pub title_mode: AttrMode,
    pub title_custom: String,
    pub aria_mode: AttrMode,
    pub aria_custom: String,
    pub default_class: String,
    /// Links per destination per page. 0 = unlimited
    pub max_per_target: u32,
    /// Links per page across all destinations. 0 = unlimited
    pub max_total_per_page: u32,
    #[serde(alias = "process_post_types")]
    pub process_doc_types: Vec<String>,
    pub min_content_length: usize,
    pub min_element_length: usize,
    pub link_template: String,
    pub process_on_archives: bool,
    #[serde(deserialize_with = "tag_list")]
    pub skip_elements_internal: Vec<String>,
    #[serde(deserialize_with = "tag_list")]
    pub skip_elements_external: Vec<String>,
    pub cross_inline: bool,
    pub log_internal_timing: bool,
    pub auto_scan_on_save: bool,
    pub auto_scan_on_external: bool,
    /// Retention of the activity log. None = keep everything
    pub activity_log_limit: Option<usize>,
    pub no_autolink_class: String,
    pub scan_batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rel: "nofollow".to_string(),
            title_mode: AttrMode::Phrase,
            title_custom: String::new(),
            aria_mode: AttrMode::Phrase,
            aria_custom: String::new(),
            default_class: DEFAULT_LINK_CLASS.to_string(),
            max_per_target: 1,
            max_total_per_page: 0,
            process_doc_types: vec!["post".to_string(), "page".to_string()],
            min_content_length: 200,
            min_element_length: 20,
            link_template: DEFAULT_LINK_TEMPLATE.to_string(),
            process_on_archives: false,
            skip_elements_internal: Vec::new(),
            skip_elements_external: Vec::new(),
            cross_inline: false,
            log_internal_timing: false,
            auto_scan_on_save: false,
            auto_scan_on_external: false,
            activity_log_limit: None,
            no_autolink_class: DEFAULT_NO_AUTOLINK_CLASS.to_string(),
            scan_batch_size: 5,
        }
    }
}

impl Settings {
    /// Normalize user-provided values.
    ///
    /// - the link template must contain both `{url}` and `{text}`
    /// - tag lists are re-parsed (lowercase, alphanumeric, unique)
    /// - document types are trimmed and deduplicated
    /// - retention and batch sizes are at least 1
    pub fn sanitized(mut self) -> Self {
        let template = self.link_template.trim();
        if !template.contains("{url}") || !template.contains("{text}") {
            self.link_template = DEFAULT_LINK_TEMPLATE.to_string();
        } else {
            self.link_template = template.to_string();
        }

        self.rel = self.rel.trim().to_string();
        self.default_class = self.default_class.trim().to_string();
        self.skip_elements_internal = parse_tag_list(&self.skip_elements_internal.join(","));
        self.skip_elements_external = parse_tag_list(&self.skip_elements_external.join(","));

        let mut types: Vec<String> = Vec::new();
        for t in self.process_doc_types.iter().map(|t| t.trim()) {
            if !t.is_empty() && !types.iter().any(|x| x == t) {
                types.push(t.to_string());
            }
        }
        self.process_doc_types = types;

        self.activity_log_limit = self.activity_log_limit.map(|n| n.max(1));
        self.scan_batch_size = self.scan_batch_size.max(1);
        if self.no_autolink_class.trim().is_empty() {
            self.no_autolink_class = DEFAULT_NO_AUTOLINK_CLASS.to_string();
        }
        self
    }

    pub fn processes_type(&self, doc_type: &str) -> bool {
        self.process_doc_types.iter().any(|t| t == doc_type)
    }
}

// =============================================================================
// Tag Lists
// =============================================================================

fn tag_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[,;|\s/\-]+").expect("static regex"))
}

fn tag_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9]*$").expect("static regex"))
}

/// Parse a free-form list of element names ("h1, h2 | blockquote").
///
/// Names are lowercased, anything that is not a plain tag name is dropped,
/// and duplicates keep their first position.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    let lowered = raw.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    for part in tag_separator().split(&lowered) {
        let part = part.trim();
        if part.is_empty() || !tag_name().is_match(part) {
            continue;
        }
        if !out.iter().any(|t| t == part) {
            out.push(part.to_string());
        }
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagListInput {
    Text(String),
    List(Vec<String>),
}

/// Accept either `"h1, h2"` or `["h1", "h2"]`.
pub(crate) fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Option::<TagListInput>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(TagListInput::Text(s)) => parse_tag_list(&s),
        Some(TagListInput::List(items)) => parse_tag_list(&items.join(",")),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.rel, "nofollow");
        assert_eq!(s.max_per_target, 1);
        assert_eq!(s.max_total_per_page, 0);
        assert_eq!(s.min_content_length, 200);
        assert_eq!(s.min_element_length, 20);
        assert_eq!(s.process_doc_types, vec!["post", "page"]);
        assert_eq!(s.title_mode, AttrMode::Phrase);
        assert!(!s.cross_inline);
    }

    #[test]
    fn test_partial_record_fills_defaults() {
        let s: Settings = serde_json::from_str(r#"{"max_per_target": 3, "skip_elements_internal": "H1, h2;blockquote"}"#).unwrap();
        assert_eq!(s.max_per_target, 3);
        assert_eq!(s.rel, "nofollow");
        assert_eq!(s.skip_elements_internal, vec!["h1", "h2", "blockquote"]);
    }

    #[test]
    fn test_tag_list_accepts_arrays() {
        let s: Settings = serde_json::from_str(r#"{"skip_elements_external": ["LI", "li", "h3"]}"#).unwrap();
        assert_eq!(s.skip_elements_external, vec!["li", "h3"]);
    }

    #[test]
    fn test_parse_tag_list_drops_garbage() {
        assert_eq!(parse_tag_list("h1/h2 - 3x, <div>, p"), vec!["h1", "h2", "p"]);
        assert!(parse_tag_list("   ").is_empty());
    }

    #[test]
    fn test_sanitized_restores_broken_template() {
        let mut s = Settings::default();
        s.link_template = "<a href=\"{url}\">link</a>".to_string();
        s.activity_log_limit = Some(0);
        let s = s.sanitized();
        assert_eq!(s.link_template, DEFAULT_LINK_TEMPLATE);
        assert_eq!(s.activity_log_limit, Some(1));
    }

    #[test]
    fn test_attr_mode_parse() {
        assert_eq!(AttrMode::parse(" Post_Title "), Some(AttrMode::PostTitle));
        assert_eq!(AttrMode::parse("bogus"), None);
    }
}
