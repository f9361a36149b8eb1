//! Arena-backed markup tree used by the rewriter.
//!
//! # Architecture
//!
//! - `parse.rs` - html5ever fragment parsing into an `RcDom`, copied into the arena
//! - `serialize.rs` - the arena walked through html5ever's `HtmlSerializer`
//!
//! Nodes live in one `Vec` and refer to each other by `NodeId`, so structural
//! edits never invalidate ids that a caller collected earlier. The whole input
//! sits under a synthetic root that is never written back out. Text is held
//! decoded; the serializer escapes it again on the way out.

pub mod parse;
pub mod serialize;

use crate::error::ParseError;

/// Elements whose text content is not prose (never linked, never measured).
pub const RAW_TEXT_TAGS: &[&str] =
    &["script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes", "noscript", "template"];

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_ascii_lowercase(), attrs: Vec::new() }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attrs.push((name, value.to_string())),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|v| v.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(Element),
    /// Decoded prose
    Text(String),
    /// Text inside script, style and the other raw-text elements
    Raw(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Parse `html` as the content of a synthetic wrapper element.
    ///
    /// Any error html5ever reports while building the tree is returned; the
    /// caller treats such content as unsafe to rewrite.
    pub fn parse(html: &str) -> Result<Self, ParseError> {
        let mut doc = Self::empty();
        let root = doc.root;
        parse::parse_into(&mut doc, root, html)?;
        Ok(doc)
    }

    fn empty() -> Self {
        let root = Node { data: NodeData::Element(Element::new("div")), parent: None, children: Vec::new() };
        Self { nodes: vec![root], root: NodeId(0) }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Parse a markup fragment into detached nodes owned by this document.
    pub fn parse_fragment(&mut self, html: &str) -> Result<Vec<NodeId>, ParseError> {
        let holder = self.push(NodeData::Element(Element::new("div")));
        parse::parse_into(self, holder, html)?;
        let children = std::mem::take(&mut self.nodes[holder.0].children);
        for &c in &children {
            self.nodes[c.0].parent = None;
        }
        Ok(children)
    }

    pub(crate) fn push(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node { data, parent: None, children: Vec::new() });
        NodeId(self.nodes.len() - 1)
    }

    pub fn create_text(&mut self, value: &str) -> NodeId {
        self.push(NodeData::Text(value.to_string()))
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(Element::new(tag)))
    }

    /// Copy of an element without its children.
    pub fn shallow_clone(&mut self, id: NodeId) -> NodeId {
        let data = self.nodes[id.0].data.clone();
        self.push(data)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: &str) {
        if let NodeData::Text(t) = &mut self.nodes[id.0].data {
            *t = value.to_string();
        }
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Element ancestors from the nearest outward, excluding the synthetic root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p)).filter(move |&p| p != self.root)
    }

    /// Nearest enclosing element (the synthetic root for top-level text).
    pub fn closest_element(&self, id: NodeId) -> NodeId {
        self.parent(id).unwrap_or(self.root)
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Insert `new_nodes` right after `reference`, in order.
    pub fn insert_after(&mut self, reference: NodeId, new_nodes: &[NodeId]) {
        let Some(parent) = self.parent(reference) else { return };
        for &n in new_nodes {
            self.detach(n);
        }
        let Some(pos) = self.children(parent).iter().position(|&c| c == reference) else { return };
        for (offset, &n) in new_nodes.iter().enumerate() {
            self.nodes[n.0].parent = Some(parent);
            self.nodes[parent.0].children.insert(pos + 1 + offset, n);
        }
    }

    /// Replace `id` with `new_nodes` at the same position.
    pub fn replace_with(&mut self, id: NodeId, new_nodes: &[NodeId]) {
        self.insert_after(id, new_nodes);
        self.detach(id);
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    /// Depth-first snapshot of text nodes with non-whitespace content.
    pub fn text_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match &self.nodes[id.0].data {
                NodeData::Text(t) if !t.trim().is_empty() => out.push(id),
                NodeData::Element(_) => stack.extend(self.children(id).iter().rev()),
                _ => {}
            }
        }
        out
    }

    /// Concatenated decoded prose below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].data {
            NodeData::Text(t) => out.push_str(t),
            NodeData::Element(_) => {
                for &c in self.children(id) {
                    self.collect_text(c, out);
                }
            }
            NodeData::Raw(_) | NodeData::Comment(_) => {}
        }
    }
}

#[cfg(test)]
mod tests;
