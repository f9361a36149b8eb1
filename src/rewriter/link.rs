//! Link markup: attribute resolution and template rendering.

use crate::config::AttrMode;
use crate::html::Element;
use html_escape::{encode_double_quoted_attribute, encode_text};

/// Resolved attributes of one generated link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAttrs {
    pub url: String,
    pub rel: String,
    pub title: Option<String>,
    pub aria: Option<String>,
    pub class: String,
}

/// Value of a `title`/`aria-label` attribute under `mode`.
pub fn resolve_attr(mode: AttrMode, custom: &str, matched: &str, destination_title: Option<&str>) -> Option<String> {
    let value = match mode {
        AttrMode::None => return None,
        AttrMode::Phrase => matched,
        AttrMode::PostTitle => destination_title.unwrap_or(""),
        AttrMode::Custom => custom,
    };
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn optional_attr(name: &str, value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => format!(" {}=\"{}\"", name, encode_double_quoted_attribute(v)),
        _ => String::new(),
    }
}

impl LinkAttrs {
    /// Fill `template` placeholders. Unknown `{...}` sequences are kept as written.
    pub fn render(&self, template: &str, text: &str) -> String {
        let mut out = String::with_capacity(template.len() + self.url.len() + text.len() + 64);
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            let Some(close) = tail.find('}') else {
                out.push_str(tail);
                return out;
            };
            let key = &tail[1..close];
            let replacement = match key {
                "url" => Some(encode_double_quoted_attribute(&self.url).into_owned()),
                "text" => Some(encode_text(text).into_owned()),
                "rel" => Some(optional_attr("rel", Some(&self.rel))),
                "title" => Some(optional_attr("title", self.title.as_deref())),
                "aria" => Some(optional_attr("aria-label", self.aria.as_deref())),
                "class" => Some(optional_attr("class", Some(&self.class))),
                _ => None,
            };
            match replacement {
                Some(r) => {
                    out.push_str(&r);
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Set the attributes directly on an anchor element.
    pub fn apply(&self, anchor: &mut Element) {
        anchor.set_attr("href", &self.url);
        if !self.rel.is_empty() {
            anchor.set_attr("rel", &self.rel);
        }
        if let Some(t) = &self.title {
            anchor.set_attr("title", t);
        }
        if let Some(a) = &self.aria {
            anchor.set_attr("aria-label", a);
        }
        if !self.class.is_empty() {
            anchor.set_attr("class", &self.class);
        }
    }
}
