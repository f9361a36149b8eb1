//! Tests for the arena markup tree

use super::*;

// ----------------------------------------------------------------------------
// Requirement 1: round trips
// ----------------------------------------------------------------------------

#[test]
fn test_well_formed_markup_round_trips() {
    let inputs = [
        "<p class=\"x\">Hello <strong>World</strong></p>",
        "<p>Tom &amp; Jerry</p><!-- note --><br>",
        "<script>if (a < b) { x = '</p>'; }</script><p>after</p>",
        "<div data-x=\"1 > 0\">x</div>",
    ];
    for input in inputs {
        let doc = Document::parse(input).unwrap();
        assert_eq!(doc.serialize(), input, "round trip failed for {input}");
    }
}

#[test]
fn test_markup_is_normalized() {
    let doc = Document::parse("<ul><li>one<li>two</ul><p class='x'>y</p>").unwrap();
    assert_eq!(doc.serialize(), "<ul><li>one</li><li>two</li></ul><p class=\"x\">y</p>");
}

#[test]
fn test_optional_end_tags_close_implicitly() {
    let doc = Document::parse("<p>first<p>second<div>block</div>").unwrap();
    assert_eq!(doc.children(doc.root()).len(), 3);
    assert_eq!(doc.serialize(), "<p>first</p><p>second</p><div>block</div>");
}

// ----------------------------------------------------------------------------
// Requirement 2: character references
// ----------------------------------------------------------------------------

#[test]
fn test_named_references_are_decoded() {
    let doc = Document::parse("<p>Un caf&eacute; au lait &mdash; s&#252;&#x00DF;</p>").unwrap();
    let text = doc.text_nodes()[0];
    assert_eq!(doc.text(text), Some("Un café au lait \u{2014} süß"));
    assert_eq!(doc.serialize(), "<p>Un café au lait \u{2014} süß</p>");
}

#[test]
fn test_escaped_ampersand_survives() {
    let doc = Document::parse("<p>Type &amp;eacute; here</p>").unwrap();
    let text = doc.text_nodes()[0];
    assert_eq!(doc.text(text), Some("Type &eacute; here"));
    assert_eq!(doc.serialize(), "<p>Type &amp;eacute; here</p>");
}

#[test]
fn test_nbsp_is_escaped_on_output() {
    let doc = Document::parse("<p>a&nbsp;b</p>").unwrap();
    assert_eq!(doc.text(doc.text_nodes()[0]), Some("a\u{a0}b"));
    assert_eq!(doc.serialize(), "<p>a&nbsp;b</p>");
}

// ----------------------------------------------------------------------------
// Requirement 3: malformed input
// ----------------------------------------------------------------------------

#[test]
fn test_malformed_markup_is_rejected() {
    let inputs = [
        "<p>open <a href=\"x\">never closed",
        "<div>text</span></div>",
        "<p class=\"x",
        "<!-- dangling",
        "<div>Rust <em>code</div>",
    ];
    for input in inputs {
        assert!(matches!(Document::parse(input), Err(ParseError::Malformed(_))), "accepted {input}");
    }
}

// ----------------------------------------------------------------------------
// Requirement 4: traversal & mutation
// ----------------------------------------------------------------------------

#[test]
fn test_text_nodes_skip_whitespace_and_raw() {
    let doc = Document::parse("<p>a</p>\n  <script>var x;</script><p> b </p>").unwrap();
    let texts: Vec<&str> = doc.text_nodes().into_iter().filter_map(|id| doc.text(id)).collect();
    assert_eq!(texts, vec!["a", " b "]);
}

#[test]
fn test_text_content_ignores_comments_and_scripts() {
    let doc = Document::parse("<div>one<!-- two --><style>p{}</style> three</div>").unwrap();
    assert_eq!(doc.text_content(doc.root()), "one three");
}

#[test]
fn test_ancestors_exclude_root() {
    let doc = Document::parse("<div class=\"keep no-link\"><em>deep</em></div>").unwrap();
    let text = doc.text_nodes()[0];
    let tags: Vec<&str> = doc.ancestors(text).filter_map(|id| doc.tag(id)).collect();
    assert_eq!(tags, vec!["em", "div"]);
    let div = doc.ancestors(text).nth(1).unwrap();
    assert!(doc.element(div).unwrap().has_class("no-link"));
}

#[test]
fn test_replace_with_fragment() {
    let mut doc = Document::parse("<p>see the docs here</p>").unwrap();
    let text = doc.text_nodes()[0];
    let before = doc.create_text("see the ");
    let mut parts = vec![before];
    parts.extend(doc.parse_fragment("<a href=\"/docs\">docs</a>").unwrap());
    parts.push(doc.create_text(" here"));
    doc.replace_with(text, &parts);
    assert_eq!(doc.serialize(), "<p>see the <a href=\"/docs\">docs</a> here</p>");
    assert!(!doc.is_attached(text));
}

#[test]
fn test_edited_nodes_are_escaped() {
    let mut doc = Document::parse("<p title=\"a\">x</p>").unwrap();
    let text = doc.text_nodes()[0];
    doc.set_text(text, "1 < 2 & caf&eacute;");
    let p = doc.children(doc.root())[0];
    doc.element_mut(p).unwrap().set_attr("title", "say \"hi\"");
    assert_eq!(doc.serialize(), "<p title=\"say &quot;hi&quot;\">1 &lt; 2 &amp; caf&amp;eacute;</p>");
}

#[test]
fn test_shallow_clone_copies_attributes_only() {
    let mut doc = Document::parse("<strong class=\"b\">Word</strong>").unwrap();
    let strong = doc.children(doc.root())[0];
    let clone = doc.shallow_clone(strong);
    assert!(doc.children(clone).is_empty());
    let inner = doc.create_text("W");
    doc.append_child(clone, inner);
    assert_eq!(doc.outer_html(clone), "<strong class=\"b\">W</strong>");
    assert_eq!(doc.text_content(doc.root()), "Word");
}
