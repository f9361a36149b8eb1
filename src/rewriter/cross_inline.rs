//! Phrases split across the end of a formatting element and the text after it.
//!
//! `<strong>Word</strong>Press` becomes
//! `<a ...><strong>Word</strong>Press</a>`: the link wraps a copy of the
//! formatting element holding the first half, followed by the second half.

use super::link::LinkAttrs;
use crate::error::PatternError;
use crate::html::{Document, NodeId};
use crate::pattern::Pattern;

/// Inline elements a phrase may straddle.
pub const FORMAT_TAGS: &[&str] = &["b", "strong", "i", "em", "u", "mark"];

/// A match that starts inside `node` and ends inside `next`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub parent: NodeId,
    pub next: NodeId,
    pub first: String,
    pub second: String,
    pub start: usize,
    pub end: usize,
    pub matched: String,
}

/// Look for a match of `pattern` across `node` (last child of a formatting
/// element) and the text node right after that element.
pub fn find(doc: &Document, node: NodeId, pattern: &Pattern) -> Result<Option<Split>, PatternError> {
    let Some(parent) = doc.parent(node) else { return Ok(None) };
    if parent == doc.root() {
        return Ok(None);
    }
    match doc.tag(parent) {
        Some(tag) if FORMAT_TAGS.contains(&tag) => {}
        _ => return Ok(None),
    }
    if doc.children(parent).last() != Some(&node) {
        return Ok(None);
    }
    let Some(next) = doc.next_sibling(parent) else { return Ok(None) };
    let (Some(first), Some(second)) = (doc.text(node), doc.text(next)) else {
        return Ok(None);
    };
    if first.is_empty() || second.is_empty() {
        return Ok(None);
    }

    let split_at = first.len();
    let hay = format!("{}{}", first, second);
    let span = pattern.find_all(&hay)?.into_iter().find(|s| s.start < split_at && split_at < s.end);
    Ok(span.map(|s| Split {
        parent,
        next,
        first: first.to_string(),
        second: second.to_string(),
        start: s.start,
        end: s.end,
        matched: hay[s.start..s.end].to_string(),
    }))
}

/// Rewrite the tree for `split` and return the new anchor.
pub fn apply(doc: &mut Document, node: NodeId, split: &Split, link: &LinkAttrs) -> NodeId {
    let split_at = split.first.len();
    let before = &split.first[..split.start];
    let head = &split.first[split.start..];
    let tail = &split.second[..split.end - split_at];
    let after = &split.second[split.end - split_at..];

    let anchor = doc.create_element("a");
    if let Some(el) = doc.element_mut(anchor) {
        link.apply(el);
    }
    let format = doc.shallow_clone(split.parent);
    let head_node = doc.create_text(head);
    doc.append_child(format, head_node);
    doc.append_child(anchor, format);
    let tail_node = doc.create_text(tail);
    doc.append_child(anchor, tail_node);
    doc.insert_after(split.parent, &[anchor]);

    if after.is_empty() {
        doc.detach(split.next);
    } else {
        doc.set_text(split.next, after);
    }
    if before.is_empty() {
        doc.detach(node);
        if doc.children(split.parent).is_empty() {
            doc.detach(split.parent);
        }
    } else {
        doc.set_text(node, before);
    }
    anchor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{compile, MatchKind};

    fn link() -> LinkAttrs {
        LinkAttrs { url: "/wp".into(), rel: String::new(), title: None, aria: None, class: String::new() }
    }

    fn first_text(doc: &Document) -> NodeId {
        doc.text_nodes()[0]
    }

    #[test]
    fn test_split_phrase_is_wrapped() {
        let mut doc = Document::parse("<p><strong>Word</strong>Press rocks</p>").unwrap();
        let pattern = compile("WordPress", MatchKind::Literal, false).unwrap();
        let node = first_text(&doc);
        let split = find(&doc, node, &pattern).unwrap().unwrap();
        assert_eq!(split.matched, "WordPress");
        apply(&mut doc, node, &split, &link());
        assert_eq!(doc.serialize(), "<p><a href=\"/wp\"><strong>Word</strong>Press</a> rocks</p>");
    }

    #[test]
    fn test_keeps_text_before_the_match() {
        let mut doc = Document::parse("<p><em>Try Word</em>Press</p>").unwrap();
        let pattern = compile("WordPress", MatchKind::Literal, false).unwrap();
        let node = first_text(&doc);
        let split = find(&doc, node, &pattern).unwrap().unwrap();
        apply(&mut doc, node, &split, &link());
        assert_eq!(doc.serialize(), "<p><em>Try </em><a href=\"/wp\"><em>Word</em>Press</a></p>");
    }

    #[test]
    fn test_requires_a_real_split() {
        let doc = Document::parse("<p><b>WordPress</b> and more</p>").unwrap();
        let pattern = compile("WordPress", MatchKind::Literal, false).unwrap();
        assert!(find(&doc, first_text(&doc), &pattern).unwrap().is_none());
    }

    #[test]
    fn test_only_formatting_parents() {
        let doc = Document::parse("<p><span>Word</span>Press</p>").unwrap();
        let pattern = compile("WordPress", MatchKind::Literal, false).unwrap();
        assert!(find(&doc, first_text(&doc), &pattern).unwrap().is_none());
    }
}
