//! Arena-backed node tree with DOM semantics.
//!
//! Nodes live in a [`SlotMap`] and are addressed by generational [`NodeId`]s, so a
//! handle to a freed node never aliases a newer one. Every attached node is owned by
//! its parent's child list. [`Document::detach`] orphans a node without freeing it;
//! [`Document::sweep`] frees everything no longer reachable from the root.

use miette::Diagnostic;
use slotmap::SlotMap;
use smol_str::SmolStr;

use verso_common::ParseError;

use crate::html;

slotmap::new_key_type! {
    /// Handle to a node in a [`Document`].
    pub struct NodeId;
}

/// Errors from structural misuse of the tree.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum DomError {
    #[error("node {0:?} has been freed")]
    #[diagnostic(code(verso::dom::freed))]
    Freed(NodeId),

    #[error("node {0:?} is not an element")]
    #[diagnostic(code(verso::dom::not_an_element))]
    NotAnElement(NodeId),

    #[error("cannot insert {child:?} into {parent:?}")]
    #[diagnostic(
        code(verso::dom::hierarchy),
        help("a node cannot become a descendant of itself or of a text node")
    )]
    HierarchyRequest { parent: NodeId, child: NodeId },

    #[error("node {0:?} has no parent")]
    #[diagnostic(code(verso::dom::missing_parent))]
    MissingParent(NodeId),

    #[error("offset {offset} is out of bounds for node {node:?} (length {len})")]
    #[diagnostic(code(verso::dom::offset))]
    InvalidOffset {
        node: NodeId,
        offset: usize,
        len: usize,
    },

    #[error(transparent)]
    #[diagnostic_source]
    Parse(#[from] ParseError),
}

pub type DomResult<T> = Result<T, DomError>;

/// Payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element {
        /// Lowercase tag name.
        tag: SmolStr,
        /// Attributes in insertion order, names lowercase.
        attrs: Vec<(SmolStr, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            first_child: None,
            last_child: None,
            prev: None,
            next: None,
        }
    }
}

/// Class carried by the editable root.
pub const ROOT_CLASS: &str = "se-wrapper-wysiwyg";

/// The editable tree. The root is a `div` standing in for the contenteditable host.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(NodeData::Element {
            tag: SmolStr::new_static("div"),
            attrs: vec![
                (SmolStr::new_static("class"), ROOT_CLASS.to_owned()),
                (SmolStr::new_static("contenteditable"), "true".to_owned()),
            ],
        }));
        Self { nodes, root }
    }

    /// Build a document whose root holds the parsed `html`.
    pub fn from_html(html: &str) -> DomResult<Self> {
        let mut doc = Self::new();
        let root = doc.root;
        doc.set_inner_html(root, html)?;
        Ok(doc)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    /// True if `id` still refers to a live node.
    pub fn exists(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ---- creation ----

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.insert(Node::new(NodeData::Element {
            tag: SmolStr::new(tag.to_ascii_lowercase()),
            attrs: Vec::new(),
        }))
    }

    /// Create an element with attributes and optional inner HTML.
    pub fn create_element_with(
        &mut self,
        tag: &str,
        attrs: &[(&str, &str)],
        inner_html: Option<&str>,
    ) -> DomResult<NodeId> {
        let el = self.create_element(tag);
        for (name, value) in attrs {
            self.set_attr(el, name, value);
        }
        if let Some(inner) = inner_html {
            self.set_inner_html(el, inner)?;
        }
        Ok(el)
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.nodes.insert(Node::new(NodeData::Text(text.into())))
    }

    // ---- links ----

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id).map(|n| &n.data)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.first_child)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.last_child)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.prev)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.next)
    }

    /// Previous sibling that is an element.
    pub fn prev_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.prev_sibling(id);
        while let Some(n) = cur {
            if self.is_element(n) {
                return Some(n);
            }
            cur = self.prev_sibling(n);
        }
        None
    }

    /// Next sibling that is an element.
    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.next_sibling(id);
        while let Some(n) = cur {
            if self.is_element(n) {
                return Some(n);
            }
            cur = self.next_sibling(n);
        }
        None
    }

    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).find(|c| self.is_element(*c))
    }

    pub fn last_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.child_nodes(id)
            .into_iter()
            .rev()
            .find(|c| self.is_element(*c))
    }

    /// Borrowing iterator over the children of `id`.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.first_child(id),
        }
    }

    /// Snapshot of the children of `id`, for callers that mutate while iterating.
    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).collect()
    }

    /// Element children only.
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).filter(|c| self.is_element(*c)).collect()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).count()
    }

    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).nth(index)
    }

    /// Position of `id` among its siblings.
    pub fn index_in_parent(&self, id: NodeId) -> usize {
        let mut idx = 0;
        let mut cur = self.prev_sibling(id);
        while let Some(p) = cur {
            idx += 1;
            cur = self.prev_sibling(p);
        }
        idx
    }

    /// Iterator over the strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// Descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_nodes(id).into_iter().rev().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            let mut kids = self.child_nodes(n);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Inclusive containment, like `Node.contains`.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if !self.exists(node) {
            return false;
        }
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// True if the node is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(self.root, id)
    }

    // ---- kinds ----

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Element { .. }))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Text(_)))
    }

    /// Lowercase tag name, `None` for text or freed nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { tag, .. }) => Some(tag.as_str()),
            _ => None,
        }
    }

    /// Case-insensitive tag comparison.
    pub fn tag_is(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id).is_some_and(|t| t.eq_ignore_ascii_case(tag))
    }

    /// DOM `nodeName`: uppercase tag for elements, `#text` for text nodes.
    pub fn node_name(&self, id: NodeId) -> String {
        match self.data(id) {
            Some(NodeData::Element { tag, .. }) => tag.to_ascii_uppercase(),
            Some(NodeData::Text(_)) => "#text".to_owned(),
            None => String::new(),
        }
    }

    // ---- text ----

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Replace the data of a text node. No-op on elements.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let Some(Node {
            data: NodeData::Text(t),
            ..
        }) = self.nodes.get_mut(id)
        {
            *t = text.into();
        }
    }

    /// Length in chars for text nodes, child count for elements.
    pub fn node_len(&self, id: NodeId) -> usize {
        match self.data(id) {
            Some(NodeData::Text(t)) => t.chars().count(),
            Some(NodeData::Element { .. }) => self.child_count(id),
            None => 0,
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        match self.data(id) {
            Some(NodeData::Text(t)) => t.clone(),
            Some(NodeData::Element { .. }) => {
                let mut out = String::new();
                for d in self.descendants(id) {
                    if let Some(t) = self.text(d) {
                        out.push_str(t);
                    }
                }
                out
            }
            None => String::new(),
        }
    }

    /// `textContent = text`: replaces all children with one text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        if self.is_text(id) {
            self.set_text(id, text);
            return;
        }
        for child in self.child_nodes(id) {
            self.detach(child);
        }
        if !text.is_empty() {
            let t = self.create_text(text);
            // id is an element here, so this cannot fail
            let _ = self.append_child(id, t);
        }
    }

    /// Split a text node at char `offset`. The tail moves to a new sibling which is returned.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> DomResult<NodeId> {
        let text = self.text(id).ok_or(DomError::NotAnElement(id))?;
        let len = text.chars().count();
        if offset > len {
            return Err(DomError::InvalidOffset {
                node: id,
                offset,
                len,
            });
        }
        let byte = char_to_byte(text, offset);
        let tail = text[byte..].to_owned();
        let head = text[..byte].to_owned();
        self.set_text(id, head);
        let new = self.create_text(tail);
        if let Some(parent) = self.parent(id) {
            let next = self.next_sibling(id);
            self.insert_before(parent, new, next)?;
        }
        Ok(new)
    }

    /// Merge adjacent text nodes and drop empty ones below `id`, like `Node.normalize`.
    pub fn normalize(&mut self, id: NodeId) {
        let mut child = self.first_child(id);
        while let Some(c) = child {
            let next = self.next_sibling(c);
            if self.is_text(c) {
                if self.text(c).is_some_and(str::is_empty) {
                    self.detach(c);
                } else if let Some(n) = next.filter(|n| self.is_text(*n)) {
                    let joined = format!(
                        "{}{}",
                        self.text(c).unwrap_or_default(),
                        self.text(n).unwrap_or_default()
                    );
                    self.set_text(c, joined);
                    self.detach(n);
                    continue;
                }
            } else {
                self.normalize(c);
            }
            child = next;
        }
    }

    // ---- attributes ----

    pub fn attrs(&self, id: NodeId) -> &[(SmolStr, String)] {
        match self.data(id) {
            Some(NodeData::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(Node {
            data: NodeData::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            if let Some(slot) = attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                slot.1 = value.to_owned();
            } else {
                attrs.push((SmolStr::new(name.to_ascii_lowercase()), value.to_owned()));
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(Node {
            data: NodeData::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
    }

    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attr(id, "class")
            .map(|c| c.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).contains(&class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if !self.is_element(id) || self.has_class(id, class) {
            return;
        }
        let mut list: Vec<String> = self.classes(id).into_iter().map(str::to_owned).collect();
        list.push(class.to_owned());
        self.set_attr(id, "class", &list.join(" "));
    }

    /// Remove a class; the attribute goes away when no class remains.
    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let list: Vec<String> = self
            .classes(id)
            .into_iter()
            .filter(|c| *c != class)
            .map(str::to_owned)
            .collect();
        if list.is_empty() {
            self.remove_attr(id, "class");
        } else {
            self.set_attr(id, "class", &list.join(" "));
        }
    }

    /// Parsed `style` declarations in order.
    pub fn style_declarations(&self, id: NodeId) -> Vec<(String, String)> {
        parse_style(self.attr(id, "style").unwrap_or_default())
    }

    pub fn style(&self, id: NodeId, property: &str) -> Option<String> {
        self.style_declarations(id)
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(property))
            .map(|(_, v)| v)
    }

    /// Set one style property. An empty value removes it, and an empty style removes the attribute.
    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) {
        let mut decls = self.style_declarations(id);
        decls.retain(|(k, _)| !k.eq_ignore_ascii_case(property));
        if !value.is_empty() {
            decls.push((property.to_ascii_lowercase(), value.to_owned()));
        }
        if decls.is_empty() {
            self.remove_attr(id, "style");
        } else {
            self.set_attr(id, "style", &format_style(&decls));
        }
    }

    // ---- mutation ----

    fn check_insert(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        if !self.exists(parent) {
            return Err(DomError::Freed(parent));
        }
        if !self.exists(child) {
            return Err(DomError::Freed(child));
        }
        if !self.is_element(parent) || self.contains(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        Ok(())
    }

    /// Append `child` to `parent`, moving it out of its current position first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` under `parent`; `None` appends.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        if reference == Some(child) {
            return Ok(());
        }
        self.check_insert(parent, child)?;
        if let Some(r) = reference
            && self.parent(r) != Some(parent)
        {
            return Err(DomError::HierarchyRequest { parent, child: r });
        }
        self.detach(child);

        let prev = match reference {
            Some(r) => self.prev_sibling(r),
            None => self.last_child(parent),
        };
        if let Some(n) = self.nodes.get_mut(child) {
            n.parent = Some(parent);
            n.prev = prev;
            n.next = reference;
        }
        match prev {
            Some(p) => {
                if let Some(n) = self.nodes.get_mut(p) {
                    n.next = Some(child);
                }
            }
            None => {
                if let Some(n) = self.nodes.get_mut(parent) {
                    n.first_child = Some(child);
                }
            }
        }
        match reference {
            Some(r) => {
                if let Some(n) = self.nodes.get_mut(r) {
                    n.prev = Some(child);
                }
            }
            None => {
                if let Some(n) = self.nodes.get_mut(parent) {
                    n.last_child = Some(child);
                }
            }
        }
        Ok(())
    }

    /// Insert `new` right after `node` in its parent.
    pub fn insert_after(&mut self, node: NodeId, new: NodeId) -> DomResult<()> {
        let parent = self.parent(node).ok_or(DomError::MissingParent(node))?;
        let next = self.next_sibling(node);
        self.insert_before(parent, new, next)
    }

    /// Remove a node from its parent. The node stays alive until the next [`sweep`](Self::sweep).
    pub fn detach(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let (parent, prev, next) = (node.parent, node.prev, node.next);
        let Some(parent) = parent else {
            return;
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.nodes.get_mut(p) {
                    n.next = next;
                }
            }
            None => {
                if let Some(n) = self.nodes.get_mut(parent) {
                    n.first_child = next;
                }
            }
        }
        match next {
            Some(x) => {
                if let Some(n) = self.nodes.get_mut(x) {
                    n.prev = prev;
                }
            }
            None => {
                if let Some(n) = self.nodes.get_mut(parent) {
                    n.last_child = prev;
                }
            }
        }
        if let Some(n) = self.nodes.get_mut(id) {
            n.parent = None;
            n.prev = None;
            n.next = None;
        }
    }

    /// Put `new` where `old` is and detach `old`.
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) -> DomResult<()> {
        let parent = self.parent(old).ok_or(DomError::MissingParent(old))?;
        if old == new {
            return Ok(());
        }
        self.insert_before(parent, new, Some(old))?;
        self.detach(old);
        Ok(())
    }

    /// `cloneNode(false)`: same tag and attributes, no children.
    pub fn clone_shallow(&mut self, id: NodeId) -> DomResult<NodeId> {
        let data = self.data(id).cloned().ok_or(DomError::Freed(id))?;
        Ok(self.nodes.insert(Node::new(data)))
    }

    /// `cloneNode(true)`.
    pub fn clone_deep(&mut self, id: NodeId) -> DomResult<NodeId> {
        let copy = self.clone_shallow(id)?;
        for child in self.child_nodes(id) {
            let c = self.clone_deep(child)?;
            self.append_child(copy, c)?;
        }
        Ok(copy)
    }

    /// Move every child of `from` to the end of `to`.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) -> DomResult<()> {
        for child in self.child_nodes(from) {
            self.append_child(to, child)?;
        }
        Ok(())
    }

    /// Replace an element by its children.
    pub fn unwrap(&mut self, id: NodeId) -> DomResult<()> {
        let parent = self.parent(id).ok_or(DomError::MissingParent(id))?;
        for child in self.child_nodes(id) {
            self.insert_before(parent, child, Some(id))?;
        }
        self.detach(id);
        Ok(())
    }

    /// Free every node that is not reachable from the root. Returns how many were freed.
    pub fn sweep(&mut self) -> usize {
        let mut live = std::collections::HashSet::new();
        live.insert(self.root);
        live.extend(self.descendants(self.root));
        let before = self.nodes.len();
        self.nodes.retain(|id, _| live.contains(&id));
        let freed = before - self.nodes.len();
        if freed > 0 {
            tracing::trace!(target: "verso::dom", freed, "swept detached nodes");
        }
        freed
    }

    // ---- html ----

    pub fn inner_html(&self, id: NodeId) -> String {
        html::serialize_children(self, id)
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        html::serialize_node(self, id)
    }

    /// Replace the children of `id` with the parsed `html`.
    pub fn set_inner_html(&mut self, id: NodeId, markup: &str) -> DomResult<()> {
        if !self.is_element(id) {
            return Err(DomError::NotAnElement(id));
        }
        let nodes = html::parse_fragment(self, markup)?;
        for child in self.child_nodes(id) {
            self.detach(child);
        }
        for n in nodes {
            self.append_child(id, n)?;
        }
        Ok(())
    }
}

/// Iterator returned by [`Document::children`].
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = self.doc.next_sibling(cur);
        Some(cur)
    }
}

/// Iterator returned by [`Document::ancestors`].
pub struct Ancestors<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = self.doc.parent(cur);
        Some(cur)
    }
}

/// Byte index of the char at `offset`, clamped to the string length.
pub fn char_to_byte(s: &str, offset: usize) -> usize {
    s.char_indices()
        .nth(offset)
        .map(|(b, _)| b)
        .unwrap_or(s.len())
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (k, v) = decl.split_once(':')?;
            let (k, v) = (k.trim(), v.trim());
            (!k.is_empty() && !v.is_empty()).then(|| (k.to_ascii_lowercase(), v.to_owned()))
        })
        .collect()
}

fn format_style(decls: &[(String, String)]) -> String {
    decls
        .iter()
        .map(|(k, v)| format!("{k}: {v};"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Document {
        Document::from_html(html).unwrap()
    }

    #[test]
    fn insert_and_detach_keep_links_consistent() {
        let mut d = Document::new();
        let root = d.root();
        let a = d.create_element("p");
        let b = d.create_element("p");
        let c = d.create_element("p");
        d.append_child(root, a).unwrap();
        d.append_child(root, c).unwrap();
        d.insert_before(root, b, Some(c)).unwrap();
        assert_eq!(d.child_nodes(root), vec![a, b, c]);
        assert_eq!(d.index_in_parent(c), 2);

        d.detach(b);
        assert_eq!(d.child_nodes(root), vec![a, c]);
        assert_eq!(d.next_sibling(a), Some(c));
        assert_eq!(d.prev_sibling(c), Some(a));
        assert!(!d.is_attached(b));
        assert!(d.exists(b));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut d = doc("<div><p>x</p></div>");
        let div = d.first_child(d.root()).unwrap();
        let p = d.first_child(div).unwrap();
        let err = d.append_child(p, div).unwrap_err();
        assert!(matches!(err, DomError::HierarchyRequest { .. }));
        let text = d.first_child(p).unwrap();
        let q = d.create_element("q");
        assert!(d.append_child(text, q).is_err());
    }

    #[test]
    fn split_text_counts_chars() {
        let mut d = doc("<p>héllo</p>");
        let p = d.first_child(d.root()).unwrap();
        let t = d.first_child(p).unwrap();
        let tail = d.split_text(t, 2).unwrap();
        assert_eq!(d.text(t), Some("hé"));
        assert_eq!(d.text(tail), Some("llo"));
        assert_eq!(d.next_sibling(t), Some(tail));
        assert!(matches!(
            d.split_text(t, 9),
            Err(DomError::InvalidOffset { len: 2, .. })
        ));
    }

    #[test]
    fn sweep_frees_orphans_only() {
        let mut d = doc("<p>a</p><p>b</p>");
        let second = d.last_child(d.root()).unwrap();
        let text = d.first_child(second).unwrap();
        d.detach(second);
        assert_eq!(d.sweep(), 2);
        assert!(!d.exists(second));
        assert!(!d.exists(text));
        assert_eq!(d.inner_html(d.root()), "<p>a</p>");
    }

    #[test]
    fn freed_ids_are_not_reused() {
        let mut d = Document::new();
        let a = d.create_text("a");
        d.sweep();
        let b = d.create_text("b");
        assert_ne!(a, b);
        assert_eq!(d.text(a), None);
    }

    #[test]
    fn class_and_style_helpers() {
        let mut d = doc(r#"<p class="a b" style="margin-left: 10px;">x</p>"#);
        let p = d.first_child(d.root()).unwrap();
        assert!(d.has_class(p, "b"));
        d.remove_class(p, "a");
        d.remove_class(p, "b");
        assert_eq!(d.attr(p, "class"), None);
        assert_eq!(d.style(p, "margin-left").as_deref(), Some("10px"));
        d.set_style(p, "margin-left", "");
        assert_eq!(d.attr(p, "style"), None);
    }

    #[test]
    fn normalize_joins_text() {
        let mut d = Document::new();
        let root = d.root();
        let p = d.create_element("p");
        d.append_child(root, p).unwrap();
        for t in ["a", "", "b"] {
            let n = d.create_text(t);
            d.append_child(p, n).unwrap();
        }
        d.normalize(root);
        assert_eq!(d.child_count(p), 1);
        assert_eq!(d.text_content(p), "ab");
    }

    #[test]
    fn clone_deep_copies_subtree() {
        let mut d = doc("<ul><li>a<b>b</b></li></ul>");
        let ul = d.first_child(d.root()).unwrap();
        let copy = d.clone_deep(ul).unwrap();
        assert_ne!(copy, ul);
        assert_eq!(d.outer_html(copy), d.outer_html(ul));
        assert!(!d.is_attached(copy));
    }
}
