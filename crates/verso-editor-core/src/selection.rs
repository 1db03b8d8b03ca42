//! Selection manager: the editor's range and the node it points at.
//!
//! Ranges are plain values over [`NodeId`]s. Every setter validates the endpoints
//! against the live tree and falls back to a default caret instead of keeping a
//! range that points into freed or detached nodes.

use serde::{Deserialize, Serialize};
use verso_editor_dom::query::{self, parent_element};
use verso_editor_dom::{Document, NodeId, ZERO_WIDTH_STR};

use crate::editor::Editor;
use crate::error::EditorResult;

/// Start and end boundary points, offsets in chars for text and child indices for elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start_container: NodeId,
    pub start_offset: usize,
    pub end_container: NodeId,
    pub end_offset: usize,
}

impl Range {
    pub fn new(start_container: NodeId, start_offset: usize, end_container: NodeId, end_offset: usize) -> Self {
        Self {
            start_container,
            start_offset,
            end_container,
            end_offset,
        }
    }

    pub fn caret(container: NodeId, offset: usize) -> Self {
        Self::new(container, offset, container, offset)
    }

    pub fn is_collapsed(&self) -> bool {
        self.start_container == self.end_container && self.start_offset == self.end_offset
    }

    /// Deepest node containing both containers.
    pub fn common_ancestor(&self, doc: &Document) -> NodeId {
        let mut chain = vec![self.start_container];
        chain.extend(doc.ancestors(self.start_container));
        std::iter::once(self.end_container)
            .chain(doc.ancestors(self.end_container))
            .find(|n| chain.contains(n))
            .unwrap_or_else(|| doc.root())
    }

    /// Both containers are attached and the offsets fit them.
    pub fn is_live(&self, doc: &Document) -> bool {
        doc.is_attached(self.start_container)
            && doc.is_attached(self.end_container)
            && self.start_offset <= doc.node_len(self.start_container)
            && self.end_offset <= doc.node_len(self.end_container)
    }
}

/// A range expressed as node paths from the root, stable across node identity changes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangePath {
    pub start_path: Vec<usize>,
    pub start_offset: usize,
    pub end_path: Vec<usize>,
    pub end_offset: usize,
}

impl RangePath {
    pub fn from_range(doc: &Document, range: &Range) -> Self {
        Self {
            start_path: query::node_path(doc, range.start_container, None),
            start_offset: range.start_offset,
            end_path: query::node_path(doc, range.end_container, None),
            end_offset: range.end_offset,
        }
    }

    pub fn resolve(&self, doc: &Document) -> Range {
        let root = doc.root();
        Range::new(
            query::node_from_path(doc, &self.start_path, root),
            self.start_offset,
            query::node_from_path(doc, &self.end_path, root),
            self.end_offset,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SelectionState {
    pub range: Option<Range>,
    /// Node the selection points at, refreshed with every range change.
    pub node: Option<NodeId>,
}

fn text_len(doc: &Document, node: NodeId) -> usize {
    doc.text_content(node).chars().count()
}

impl Editor {
    /// The current range, or a caret at the start of the first line when none is valid.
    pub fn get_range(&mut self) -> Range {
        if let Some(range) = self.selection.range.filter(|r| r.is_live(&self.doc)) {
            return range;
        }
        let range = self.create_default_range();
        self.range_info(range);
        range
    }

    /// The stored range without repairing it.
    pub fn range(&self) -> Option<Range> {
        self.selection.range.filter(|r| r.is_live(&self.doc))
    }

    fn create_default_range(&mut self) -> Range {
        let root = self.doc.root();
        let mut focus = match self.doc.first_element_child(root) {
            Some(el) => el,
            None => {
                let line = self.create_line(None);
                // root is a live element and line is fresh, so this cannot fail
                let _ = self.doc.append_child(root, line);
                line
            }
        };
        while !self.format.is_line(&self.doc, focus)
            && !self.format.is_component(&self.doc, focus)
            && let Some(child) = self.doc.first_element_child(focus)
        {
            focus = child;
        }
        if self.format.is_line(&self.doc, focus) {
            focus = query::edge_child_nodes(&self.doc, focus, None).0;
        }
        Range::caret(focus, 0)
    }

    /// Set the range. Offsets clamp to the text length and a line container is
    /// redirected to the child at the offset so the caret never sits on a line wrapper.
    ///
    /// Invalid endpoints are logged and replaced with the default caret; `None` is returned then.
    pub fn set_range(&mut self, sc: NodeId, so: usize, ec: NodeId, eo: usize) -> Option<Range> {
        let (sc, so) = self.redirect_line_point(sc, so);
        let (ec, eo) = self.redirect_line_point(ec, eo);
        let range = Range::new(sc, so, ec, eo);
        if !range.is_live(&self.doc) {
            tracing::warn!(
                target: "verso::selection",
                start_offset = so,
                end_offset = eo,
                "range endpoints are detached or out of bounds, falling back to the default caret"
            );
            let fallback = self.create_default_range();
            self.range_info(fallback);
            return None;
        }
        self.range_info(range);
        Some(range)
    }

    pub fn set_caret(&mut self, node: NodeId, offset: usize) -> Option<Range> {
        self.set_range(node, offset, node, offset)
    }

    fn redirect_line_point(&self, node: NodeId, offset: usize) -> (NodeId, usize) {
        let doc = &self.doc;
        let offset = offset.min(text_len(doc, node));
        if !self.format.is_line(doc, node) {
            return (node, offset);
        }
        let target = doc
            .child_at(node, offset)
            .or_else(|| offset.checked_sub(1).and_then(|o| doc.child_at(node, o)))
            .unwrap_or(node);
        let offset = match offset {
            0 => 0,
            _ if doc.is_element(target) => doc.node_len(target).min(1),
            _ => text_len(doc, target),
        };
        (target, offset)
    }

    fn range_info(&mut self, range: Range) {
        let doc = &self.doc;
        let node = if range.is_collapsed() {
            let common = range.common_ancestor(doc);
            if doc.is_root(common) {
                doc.element_children(common)
                    .get(range.start_offset)
                    .copied()
                    .unwrap_or(common)
            } else {
                common
            }
        } else {
            range.end_container
        };
        self.selection.range = Some(range);
        self.selection.node = Some(node);
    }

    /// Forget the range.
    pub fn remove_range(&mut self) {
        self.selection = Default::default();
    }

    /// The node the selection points at, re-initialised if it was detached.
    pub fn get_node(&mut self) -> NodeId {
        if !self.selection.node.is_some_and(|n| self.doc.is_attached(n)) {
            self.init_selection();
        }
        if let Some(node) = self.selection.node {
            return node;
        }
        let doc = &self.doc;
        let edge = doc
            .first_child(doc.root())
            .and_then(|first| {
                std::iter::once(first)
                    .chain(doc.descendants(first))
                    .find(|n| doc.is_text(*n) || doc.child_count(*n) == 0)
            });
        match edge {
            Some(node) => {
                self.selection.node = Some(node);
                node
            }
            None => {
                self.init_selection();
                self.selection.node.unwrap_or_else(|| self.doc.root())
            }
        }
    }

    pub(crate) fn init_selection(&mut self) {
        let mut range = self.get_range();
        if self.format.is_line(&self.doc, range.end_container) && range.end_offset == 0 {
            let len = if self.doc.is_text(range.start_container) {
                self.doc.node_len(range.start_container)
            } else {
                range.start_offset
            };
            if let Some(r) = self.set_range(range.start_container, range.start_offset, range.start_container, len) {
                range = r;
            }
        }
        self.range_info(range);
    }

    /// True when the range has no real insertion point: it sits on the root or inside a component.
    pub fn is_none(&self, range: &Range) -> bool {
        let doc = &self.doc;
        let common = range.common_ancestor(doc);
        (doc.is_root(range.start_container) && doc.is_root(range.end_container))
            || query::is_figure(doc, common)
            || doc
                .tag(common)
                .is_some_and(|t| matches!(t, "img" | "iframe" | "video" | "audio"))
            || self.format.is_component(doc, common)
    }

    /// Make sure the range has an insertion point, adding an empty default line after
    /// `container` (or at the top) when it does not.
    pub fn get_range_and_add_line(&mut self, range: Range, container: Option<NodeId>) -> EditorResult<Range> {
        if !self.is_none(&range) {
            return Ok(range);
        }
        let root = self.doc.root();
        let line = self.create_line(None);
        let reference = match container.filter(|c| *c != root && self.doc.parent(*c) == Some(root)) {
            Some(c) => self.doc.next_element_sibling(c),
            None => self.doc.first_element_child(root),
        };
        self.doc.insert_before(root, line, reference)?;
        tracing::debug!(target: "verso::selection", "added a line for a range without insertion point");
        let br = self.doc.first_child(line).unwrap_or(line);
        Ok(self.set_range(br, 0, br, 0).unwrap_or(Range::caret(line, 0)))
    }

    /// Normalize the range so both endpoints are text nodes.
    ///
    /// Descends into element children, wraps loose inline content into a line, and puts a
    /// zero-width text node in front of a lone `<br>`. Returns false when there is no
    /// valid selection.
    pub fn reset_range_to_text_node(&mut self) -> bool {
        let range = self.get_range();
        if self.is_none(&range) {
            return false;
        }
        match self.text_node_range(range) {
            Ok(r) => {
                self.set_range(r.start_container, r.start_offset, r.end_container, r.end_offset);
                true
            }
            Err(err) => {
                tracing::warn!(target: "verso::selection", error = %err, "could not normalize the range");
                false
            }
        }
    }

    fn text_node_range(&mut self, range: Range) -> EditorResult<Range> {
        let Range {
            start_container: mut sc,
            start_offset: mut so,
            end_container: mut ec,
            end_offset: mut eo,
        } = range;
        let collapsed = range.is_collapsed();

        if self.format.is_line(&self.doc, sc) {
            match self.doc.child_at(sc, so) {
                Some(child) => {
                    sc = child;
                    so = 0;
                }
                None => {
                    sc = self.doc.last_child(sc).unwrap_or(sc);
                    so = text_len(&self.doc, sc);
                }
            }
            while self.doc.is_element(sc)
                && let Some(first) = self.doc.first_child(sc)
            {
                sc = first;
                so = 0;
            }
        }
        if collapsed {
            (ec, eo) = (sc, so);
        } else if self.format.is_line(&self.doc, ec) {
            if eo == 0 {
                ec = self.doc.first_child(ec).unwrap_or(ec);
                while self.doc.is_element(ec)
                    && let Some(first) = self.doc.first_child(ec)
                {
                    ec = first;
                }
            } else {
                ec = self
                    .doc
                    .child_at(ec, eo - 1)
                    .or_else(|| self.doc.last_child(ec))
                    .unwrap_or(ec);
                while self.doc.is_element(ec)
                    && let Some(last) = self.doc.last_child(ec)
                {
                    ec = last;
                }
                eo = text_len(&self.doc, ec);
            }
        }

        // start
        let root = self.doc.root();
        let mut temp = if sc == root {
            self.doc.first_child(root).unwrap_or(root)
        } else {
            sc
        };
        let mut temp_offset = so;
        if query::is_break(&self.doc, temp) || (self.doc.is_element(temp) && self.doc.child_count(temp) > 0) {
            let only_break = query::is_break(&self.doc, temp);
            if !only_break {
                while self.doc.is_element(temp) && !query::is_break(&self.doc, temp) {
                    let next = self
                        .doc
                        .child_at(temp, temp_offset)
                        .or_else(|| self.doc.next_element_sibling(temp))
                        .or_else(|| self.doc.next_sibling(temp));
                    temp_offset = 0;
                    match next {
                        Some(n) => temp = n,
                        None => break,
                    }
                }
                self.wrap_loose_node(temp)?;
            }
            if query::is_break(&self.doc, temp) {
                let sentinel = self.insert_sentinel_before(temp)?;
                temp = sentinel;
                if only_break && sc == ec {
                    ec = sentinel;
                    eo = 1;
                    if collapsed {
                        temp_offset = 1;
                    }
                }
            }
        }
        sc = temp;
        so = temp_offset;
        if collapsed {
            return Ok(Range::caret(sc, so));
        }

        // end
        let mut temp = if ec == root {
            self.doc.last_child(root).unwrap_or(root)
        } else {
            ec
        };
        let mut temp_offset = eo;
        if query::is_break(&self.doc, temp) || (self.doc.is_element(temp) && self.doc.child_count(temp) > 0) {
            let only_break = query::is_break(&self.doc, temp);
            if !only_break {
                let mut first_level = true;
                while self.doc.is_element(temp) && !query::is_break(&self.doc, temp) {
                    let next = if first_level {
                        self.doc
                            .child_at(temp, temp_offset.saturating_sub(1))
                            .or_else(|| self.doc.first_child(temp))
                    } else if temp_offset > 0 {
                        self.doc.last_child(temp)
                    } else {
                        self.doc.first_child(temp)
                    };
                    first_level = false;
                    let Some(next) = next else {
                        break;
                    };
                    temp = next;
                    if temp_offset > 0 {
                        temp_offset = text_len(&self.doc, temp);
                    }
                }
                self.wrap_loose_node(temp)?;
            }
            if query::is_break(&self.doc, temp) {
                let br = temp;
                let sentinel = self.insert_sentinel_before(br)?;
                temp = sentinel;
                temp_offset = 1;
                if only_break && self.doc.prev_sibling(sentinel).is_none() {
                    self.doc.detach(br);
                }
            }
        }
        Ok(Range::new(sc, so, temp, temp_offset))
    }

    /// Wrap a node that is not inside any line into a new line.
    fn wrap_loose_node(&mut self, node: NodeId) -> EditorResult<()> {
        let line = self.format.get_line(&self.doc, node, None);
        let block = line.and_then(|l| self.format.get_block(&self.doc, l, None));
        if line != block {
            return Ok(());
        }
        let Some(parent) = self.doc.parent(node) else {
            return Ok(());
        };
        let in_cell = parent_element(&self.doc, node, |n| query::is_table_cell(&self.doc, n), None).is_some();
        let tag = if in_cell { "div".to_owned() } else { self.options.default_line.clone() };
        let wrapper = self.doc.create_element(&tag);
        self.doc.insert_before(parent, wrapper, Some(node))?;
        self.doc.append_child(wrapper, node)?;
        tracing::trace!(target: "verso::selection", tag, "wrapped loose node into a line");
        Ok(())
    }

    pub(crate) fn insert_sentinel_before(&mut self, node: NodeId) -> EditorResult<NodeId> {
        let parent = self
            .doc
            .parent(node)
            .ok_or(verso_editor_dom::DomError::MissingParent(node))?;
        let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
        self.doc.insert_before(parent, sentinel, Some(node))?;
        Ok(sentinel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_common::EditorOptions;

    fn editor(html: &str) -> Editor {
        Editor::new(EditorOptions::default())
            .unwrap()
            .with_content(html)
            .unwrap()
    }

    #[test]
    fn common_ancestor_of_siblings() {
        let doc = Document::from_html("<p><b>a</b><i>b</i></p>").unwrap();
        let p = doc.first_child(doc.root()).unwrap();
        let a = doc.first_child(doc.first_child(p).unwrap()).unwrap();
        let b = doc.first_child(doc.last_child(p).unwrap()).unwrap();
        assert_eq!(Range::new(a, 0, b, 1).common_ancestor(&doc), p);
        assert_eq!(Range::caret(a, 0).common_ancestor(&doc), a);
    }

    #[test]
    fn set_range_clamps_and_redirects_lines() {
        let mut ed = editor("<p>abc</p>");
        let p = ed.doc.first_child(ed.doc.root()).unwrap();
        let text = ed.doc.first_child(p).unwrap();

        let r = ed.set_range(text, 9, text, 9).unwrap();
        assert_eq!(r, Range::caret(text, 3));

        let r = ed.set_range(p, 1, p, 1).unwrap();
        assert_eq!(r, Range::caret(text, 3));
        assert_eq!(ed.get_node(), text);
    }

    #[test]
    fn detached_endpoints_fall_back() {
        let mut ed = editor("<p>abc</p><p>d</p>");
        let second = ed.doc.last_child(ed.doc.root()).unwrap();
        let text = ed.doc.first_child(second).unwrap();
        ed.doc.detach(second);
        assert!(ed.set_range(text, 0, text, 0).is_none());
        let range = ed.get_range();
        assert!(range.is_live(&ed.doc));
        let first = ed.doc.first_child(ed.doc.root()).unwrap();
        assert!(ed.doc.contains(first, range.start_container));
    }

    #[test]
    fn empty_root_gets_a_default_line() {
        let mut ed = editor("");
        let range = ed.get_range();
        assert!(range.is_live(&ed.doc));
        assert_eq!(ed.doc.inner_html(ed.doc.root()), "<p><br></p>");
    }

    #[test]
    fn default_caret_sits_in_the_first_leaf() {
        let mut ed = editor("<ul><li>one</li><li>two</li></ul>");
        let range = ed.get_range();
        assert_eq!(ed.doc.text(range.start_container), Some("one"));
        assert_eq!(range.start_offset, 0);

        let mut ed = editor("<blockquote><p><b>q</b></p></blockquote>");
        let range = ed.get_range();
        assert_eq!(ed.doc.text(range.start_container), Some("q"));
    }

    #[test]
    fn none_ranges() {
        let mut ed = editor(r#"<p>a</p><figure class="se-component"><img src="x"></figure>"#);
        let root = ed.doc.root();
        assert!(ed.is_none(&Range::caret(root, 0)));
        let figure = ed.doc.last_child(root).unwrap();
        let img = ed.doc.first_child(figure).unwrap();
        assert!(ed.is_none(&Range::caret(img, 0)));
        let text = ed.doc.first_child(ed.doc.first_child(root).unwrap()).unwrap();
        assert!(!ed.is_none(&Range::caret(text, 0)));

        let r = ed.get_range_and_add_line(Range::caret(root, 0), None).unwrap();
        assert!(!ed.is_none(&r));
        assert_eq!(
            ed.doc.inner_html(root),
            r#"<p><br></p><p>a</p><figure class="se-component"><img src="x"></figure>"#
        );
    }

    #[test]
    fn reset_puts_a_sentinel_before_a_lone_break() {
        let mut ed = editor("<p><br></p>");
        let p = ed.doc.first_child(ed.doc.root()).unwrap();
        let br = ed.doc.first_child(p).unwrap();
        ed.set_range(br, 0, br, 0);
        assert!(ed.reset_range_to_text_node());
        let range = ed.get_range();
        assert_eq!(range, Range::caret(range.start_container, 1));
        assert_eq!(ed.doc.text(range.start_container), Some(ZERO_WIDTH_STR));
        assert_eq!(ed.doc.inner_html(p), "\u{200B}<br>");
    }

    #[test]
    fn reset_descends_into_inline_elements() {
        let mut ed = editor("<p><b><i>xy</i></b>z</p>");
        let p = ed.doc.first_child(ed.doc.root()).unwrap();
        let b = ed.doc.first_child(p).unwrap();
        ed.selection.range = Some(Range::caret(b, 0));
        assert!(ed.reset_range_to_text_node());
        let range = ed.get_range();
        assert_eq!(ed.doc.text(range.start_container), Some("xy"));
        assert!(range.is_collapsed());
    }
}
