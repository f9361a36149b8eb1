//! html5ever front end.
//!
//! Content is parsed as a `<body>` fragment into an `RcDom`, then copied into
//! the arena. html5ever recovers from every error, but a recovered tree may
//! not be what the author wrote (misnested tags get reparented, stray closing
//! tags vanish), so any reported error rejects the input.

use super::{Document, Element, NodeData, NodeId, RAW_TEXT_TAGS};
use crate::error::ParseError;
use html5ever::tendril::TendrilSink;
use html5ever::{local_name, namespace_url, ns, parse_fragment, ParseOpts, QualName};
use markup5ever_rcdom::{Handle, NodeData as DomData, RcDom};

/// Parse `html` and append the resulting nodes under `container`.
pub fn parse_into(doc: &mut Document, container: NodeId, html: &str) -> Result<(), ParseError> {
    let context = QualName::new(None, ns!(html), local_name!("body"));
    let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new()).one(html);
    if let Some(reason) = dom.errors.first() {
        return Err(ParseError::Malformed(reason.to_string()));
    }

    // document -> <html> -> fragment content
    let children = dom.document.children.borrow();
    if let Some(html_root) = children.first() {
        copy_children(doc, html_root, container, false);
    }
    Ok(())
}

fn attr_name(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local),
        None => name.local.to_string(),
    }
}

fn copy_children(doc: &mut Document, handle: &Handle, parent: NodeId, raw: bool) {
    for child in handle.children.borrow().iter() {
        let data = match &child.data {
            DomData::Element { name, attrs, template_contents, .. } => {
                let mut element = Element::new(&name.local);
                element.attrs = attrs.borrow().iter().map(|a| (attr_name(&a.name), a.value.to_string())).collect();
                let raw_children = raw || RAW_TEXT_TAGS.contains(&element.tag.as_str());
                let id = doc.push(NodeData::Element(element));
                doc.append_child(parent, id);
                copy_children(doc, child, id, raw_children);
                if let Some(contents) = template_contents.borrow().as_ref() {
                    copy_children(doc, contents, id, true);
                }
                continue;
            }
            DomData::Text { contents } => {
                let text = contents.borrow().to_string();
                if raw {
                    NodeData::Raw(text)
                } else {
                    NodeData::Text(text)
                }
            }
            DomData::Comment { contents } => NodeData::Comment(contents.to_string()),
            _ => continue,
        };
        let id = doc.push(data);
        doc.append_child(parent, id);
    }
}
