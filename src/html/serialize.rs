//! Arena → markup through html5ever's serializer.
//!
//! html5ever takes care of escaping: `&`, `<`, `>` and U+00A0 in text, `&`,
//! `"` and U+00A0 in attribute values, nothing inside script or style.

use super::{Document, NodeData, NodeId};
use html5ever::serialize::{serialize, Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::{namespace_url, ns, LocalName, QualName};
use std::io;

fn element_name(tag: &str) -> QualName {
    QualName::new(None, ns!(html), LocalName::from(tag))
}

fn attr_name(name: &str) -> QualName {
    QualName::new(None, ns!(), LocalName::from(name))
}

/// One node of a document, as seen by html5ever.
struct Subtree<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl Subtree<'_> {
    fn write<S: Serializer>(&self, serializer: &mut S, id: NodeId) -> io::Result<()> {
        match self.doc.data(id) {
            NodeData::Element(el) => {
                let name = element_name(&el.tag);
                let attrs: Vec<(QualName, &str)> =
                    el.attrs().iter().map(|(n, v)| (attr_name(n), v.as_str())).collect();
                serializer.start_elem(name.clone(), attrs.iter().map(|(n, v)| (n, *v)))?;
                self.write_children(serializer, id)?;
                serializer.end_elem(name)
            }
            NodeData::Text(text) | NodeData::Raw(text) => serializer.write_text(text),
            NodeData::Comment(text) => serializer.write_comment(text),
        }
    }

    fn write_children<S: Serializer>(&self, serializer: &mut S, id: NodeId) -> io::Result<()> {
        for &child in self.doc.children(id) {
            self.write(serializer, child)?;
        }
        Ok(())
    }
}

impl Serialize for Subtree<'_> {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        match traversal_scope {
            TraversalScope::IncludeNode => self.write(serializer, self.id),
            TraversalScope::ChildrenOnly(_) => self.write_children(serializer, self.id),
        }
    }
}

impl Document {
    /// Markup of `id` including itself; the root yields only its content.
    pub fn outer_html(&self, id: NodeId) -> String {
        let traversal_scope = if id == self.root {
            TraversalScope::ChildrenOnly(None)
        } else {
            TraversalScope::IncludeNode
        };
        let opts = SerializeOpts { traversal_scope, ..Default::default() };
        let mut out = Vec::new();
        if let Err(e) = serialize(&mut out, &Subtree { doc: self, id }, opts) {
            tracing::warn!(error = %e, "markup serialization failed");
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Serialize the document without the synthetic wrapper.
    pub fn serialize(&self) -> String {
        self.outer_html(self.root)
    }
}
