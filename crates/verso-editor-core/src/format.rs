//! Format classification: lines, blocks, br-lines, closures and text styles.
//!
//! Classification reads only tag names and marker classes, so it is safe to call
//! repeatedly in the middle of a mutation.

use std::rc::Rc;

use regex::{Regex, RegexBuilder};
use verso_common::FormatPatterns;
use verso_editor_dom::query::{self, Edge};
use verso_editor_dom::{Document, NodeId};

use crate::component::{ComponentInfo, ComponentRegistry};
use crate::editor::Editor;
use crate::error::EditorResult;
use crate::selection::Range;

/// Optional filter applied by the `get_*` walkers.
pub type Validation<'a> = Option<&'a dyn Fn(NodeId) -> bool>;

const LINE_MARKER: &str = "__se__format__line_";
const BR_LINE_MARKER: &str = "__se__format__br_line_";
const CLOSURE_BR_LINE_MARKER: &str = "__se__format__br_line__closure_";
const BLOCK_MARKER: &str = "__se__format__block_";
const CLOSURE_BLOCK_MARKER: &str = "__se__format__block_closure_";

fn compile(patterns: &[&str]) -> EditorResult<Option<Regex>> {
    let joined: Vec<&str> = patterns.iter().copied().filter(|p| !p.is_empty()).collect();
    if joined.is_empty() {
        return Ok(None);
    }
    let re = RegexBuilder::new(&format!("^(?:{})$", joined.join("|")))
        .case_insensitive(true)
        .build()?;
    Ok(Some(re))
}

fn test(re: &Option<Regex>, name: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(name))
}

fn has_marker(doc: &Document, node: NodeId, prefix: &str) -> bool {
    doc.classes(node)
        .iter()
        .any(|c| c.len() > prefix.len() && c.starts_with(prefix))
}

/// Compiled classifier over the configured [`FormatPatterns`].
pub struct Format {
    line: Option<Regex>,
    br_line: Option<Regex>,
    closure_br_line: Option<Regex>,
    block: Option<Regex>,
    closure_block: Option<Regex>,
    text_style: Option<Regex>,
    registry: Rc<dyn ComponentRegistry>,
}

impl std::fmt::Debug for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Format")
            .field("line", &self.line.as_ref().map(Regex::as_str))
            .field("block", &self.block.as_ref().map(Regex::as_str))
            .finish_non_exhaustive()
    }
}

impl Format {
    pub fn new(patterns: &FormatPatterns, registry: Rc<dyn ComponentRegistry>) -> EditorResult<Self> {
        Ok(Self {
            line: compile(&[&patterns.line, &patterns.br_line, &patterns.closure_br_line])?,
            br_line: compile(&[&patterns.br_line, &patterns.closure_br_line])?,
            closure_br_line: compile(&[&patterns.closure_br_line])?,
            block: compile(&[&patterns.block, &patterns.closure_block])?,
            closure_block: compile(&[&patterns.closure_block])?,
            text_style: compile(&[&patterns.text_style])?,
            registry,
        })
    }

    pub fn registry(&self) -> &Rc<dyn ComponentRegistry> {
        &self.registry
    }

    pub fn is_component(&self, doc: &Document, node: NodeId) -> bool {
        self.registry.is(doc, node)
    }

    pub fn component(&self, doc: &Document, node: NodeId) -> Option<ComponentInfo> {
        self.registry.get(doc, node)
    }

    /// Excluded nodes, components and the root are never formats.
    fn non_format(&self, doc: &Document, node: NodeId) -> bool {
        query::is_exclude_format(doc, node) || self.is_component(doc, node) || doc.is_root(node)
    }

    pub fn is_line_name(&self, name: &str) -> bool {
        test(&self.line, name)
    }

    /// A line tag that is not also a block tag (so not `td`/`th`).
    pub fn is_line_only_name(&self, name: &str) -> bool {
        test(&self.line, name) && !test(&self.block, name)
    }

    pub fn is_br_line_name(&self, name: &str) -> bool {
        test(&self.br_line, name)
    }

    pub fn is_block_name(&self, name: &str) -> bool {
        test(&self.block, name)
    }

    pub fn is_text_style_name(&self, name: &str) -> bool {
        test(&self.text_style, name)
    }

    /// `P DIV H1-6 LI TH TD DETAILS`, br-lines, and `__se__format__line_*` elements.
    pub fn is_line(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        (test(&self.line, tag)
            || has_marker(doc, node, LINE_MARKER)
            || has_marker(doc, node, BR_LINE_MARKER))
            && !self.non_format(doc, node)
    }

    pub fn is_line_only(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node).is_some_and(|t| self.is_line_only_name(t)) && self.is_line(doc, node)
    }

    /// Lines whose internal breaks are `<br>` (`PRE`).
    pub fn is_br_line(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        (test(&self.br_line, tag) || has_marker(doc, node, BR_LINE_MARKER)) && !self.non_format(doc, node)
    }

    pub fn is_closure_br_line(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        (test(&self.closure_br_line, tag) || has_marker(doc, node, CLOSURE_BR_LINE_MARKER))
            && !self.non_format(doc, node)
    }

    /// Wrappers of lines and components.
    pub fn is_block(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        (test(&self.block, tag) || has_marker(doc, node, BLOCK_MARKER)) && !self.non_format(doc, node)
    }

    /// Blocks that cannot be left with Enter or Backspace.
    pub fn is_closure_block(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag(node) else {
            return false;
        };
        (test(&self.closure_block, tag) || has_marker(doc, node, CLOSURE_BLOCK_MARKER))
            && !self.non_format(doc, node)
    }

    pub fn is_text_style_node(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node).is_some_and(|t| test(&self.text_style, t))
    }

    /// Inline nodes that must stay whole when text is re-wrapped.
    pub fn is_non_split_node(&self, doc: &Document, node: NodeId) -> bool {
        doc.tag(node)
            .is_some_and(|t| matches!(t, "a" | "label" | "code" | "summary"))
    }

    /// Elements that never hold text.
    pub fn not_text_node(&self, doc: &Document, node: NodeId) -> bool {
        doc.is_element(node)
            && (self.is_component(doc, node)
                || doc.tag(node).is_some_and(|t| {
                    matches!(
                        t,
                        "br" | "input" | "select" | "canvas" | "img" | "iframe" | "audio" | "video"
                    )
                }))
    }

    /// Elements copied as they are when text nodes change.
    pub fn is_ignore_node_change(&self, doc: &Document, node: NodeId) -> bool {
        doc.is_element(node)
            && (query::is_non_editable(doc, node)
                || !self.is_text_style_node(doc, node)
                || self.is_component(doc, node))
    }

    /// Places a caret must not land in.
    pub fn is_exclude_selection_element(&self, doc: &Document, node: NodeId) -> bool {
        !doc.tag_is(node, "figcaption") && (self.is_component(doc, node) || query::is_figure(doc, node))
    }

    /// Nearest line around `node`. A block on the way answers with its first element child.
    pub fn get_line(&self, doc: &Document, node: NodeId, validation: Validation<'_>) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if doc.is_root(n) {
                return None;
            }
            if self.is_block(doc, n) {
                return doc.first_element_child(n);
            }
            if self.is_line(doc, n) && validation.is_none_or(|v| v(n)) {
                return Some(n);
            }
            cur = doc.parent(n);
        }
        None
    }

    pub fn get_br_line(&self, doc: &Document, node: NodeId, validation: Validation<'_>) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if doc.is_root(n) {
                return None;
            }
            if self.is_br_line(doc, n) && validation.is_none_or(|v| v(n)) {
                return Some(n);
            }
            cur = doc.parent(n);
        }
        None
    }

    /// Nearest block around `node`, skipping `thead`, `tbody` and `tr`.
    pub fn get_block(&self, doc: &Document, node: NodeId, validation: Validation<'_>) -> Option<NodeId> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if doc.is_root(n) {
                return None;
            }
            if self.is_block(doc, n)
                && !doc.tag(n).is_some_and(|t| matches!(t, "thead" | "tbody" | "tr"))
                && validation.is_none_or(|v| v(n))
            {
                return Some(n);
            }
            cur = doc.parent(n);
        }
        None
    }

    /// Is (`node`, `offset`) at the front (or end) of its whole line.
    pub fn is_edge_line(&self, doc: &Document, node: NodeId, offset: usize, dir: Option<Edge>) -> bool {
        if !query::is_edge_point(doc, node, offset, dir) {
            return false;
        }
        let sibling = |n: NodeId| match dir {
            Some(Edge::Front) => doc.prev_sibling(n),
            _ => doc.next_sibling(n),
        };
        let mut result = false;
        let mut cur = Some(node);
        while let Some(n) = cur {
            if self.is_line(doc, n) || doc.is_root(n) {
                break;
            }
            match sibling(n) {
                None => {}
                Some(s) if query::is_break(doc, s) && sibling(s).is_none() => {}
                Some(_) => return false,
            }
            result = true;
            cur = doc.parent(n);
        }
        result
    }
}

impl Editor {
    /// Insert an empty line after `element` and return it.
    ///
    /// Inside a br-line the new "line" is a `<br>`. The tag comes from `line_tag`, the
    /// current plain line, or the default line, in that order.
    pub fn add_line(&mut self, element: NodeId, line_tag: Option<&str>) -> EditorResult<Option<NodeId>> {
        let Some(parent) = self.doc.parent(element) else {
            return Ok(None);
        };
        let node = self.get_node();
        let current = self.format.get_line(&self.doc, node, None);
        let doc = &self.doc;
        let new_line = if !self.format.is_br_line(doc, element)
            && self.format.is_br_line(doc, current.unwrap_or(parent))
        {
            self.doc.create_element("br")
        } else {
            let plain_current = current.filter(|c| {
                self.format.is_line(doc, *c)
                    && !self.format.is_block(doc, *c)
                    && !self.format.is_br_line(doc, *c)
            });
            let tag = match (line_tag, plain_current) {
                (Some(t), _) => t.to_owned(),
                (None, Some(c)) => doc.tag(c).unwrap_or("p").to_owned(),
                (None, None) => self.options.default_line.clone(),
            };
            let el = self.doc.create_element_with(&tag, &[], Some("<br>"))?;
            if line_tag.is_none()
                && let Some(c) = current.filter(|c| self.format.is_line(&self.doc, *c))
            {
                query::copy_tag_attributes(&mut self.doc, el, c, &["id"]);
            }
            el
        };

        if query::is_table_cell(&self.doc, element) {
            self.doc.append_child(element, new_line)?;
        } else {
            let next = self.doc.next_element_sibling(element);
            self.doc.insert_before(parent, new_line, next)?;
        }
        Ok(Some(new_line))
    }

    /// Lines covered by the current selection, in document order.
    pub fn get_lines(&mut self, validation: Validation<'_>) -> Vec<NodeId> {
        match self.range_for_lines() {
            Some(range) => self.lines_in_range(range, validation),
            None => Vec::new(),
        }
    }

    /// The normalized range, widened to the whole content when it sits on the root.
    fn range_for_lines(&mut self) -> Option<Range> {
        if !self.reset_range_to_text_node() {
            return None;
        }
        let range = self.get_range();
        let root = self.doc.root();
        if range.start_container != root {
            return Some(range);
        }
        let children = self.doc.element_children(root);
        let (first, last) = (*children.first()?, *children.last()?);
        let end = self.doc.text_content(last).trim().chars().count();
        Some(self.set_range(first, 0, last, end).unwrap_or(range))
    }

    fn lines_in_range(&self, range: Range, validation: Validation<'_>) -> Vec<NodeId> {
        let doc = &self.doc;
        let format = &self.format;
        let common = range.common_ancestor(doc);
        let mut lines = query::list_children(doc, common, |n| match validation {
            Some(v) => v(n),
            None => format.is_line(doc, n),
        });
        if !doc.is_root(common)
            && !format.is_block(doc, common)
            && let Some(line) = format.get_line(doc, common, None)
        {
            lines.insert(0, line);
        }
        if range.start_container == range.end_container || lines.len() == 1 {
            return lines;
        }

        let start_line = format.get_line(doc, range.start_container, None);
        let end_line = format.get_line(doc, range.end_container, None);
        let only_table = |n: NodeId| !query::is_table_elements(doc, n) || query::is_table(doc, n);
        let lift = |el: Option<NodeId>| {
            el.map(|e| match doc.parent(e) {
                Some(p) if query::is_table_elements(doc, e) && query::is_list_cell(doc, p) => p,
                _ => e,
            })
        };
        let start_block = lift(start_line.and_then(|l| format.get_block(doc, l, Some(&only_table))));
        let end_block = lift(end_line.and_then(|l| format.get_block(doc, l, Some(&only_table))));
        let same_block = start_block == end_block;

        let mut start_idx = None;
        let mut end_idx = None;
        for (i, line) in lines.iter().enumerate() {
            let line = Some(*line);
            if start_line == line || (!same_block && line == start_block) {
                start_idx = Some(i);
                continue;
            }
            if end_line == line || (!same_block && line == end_block) {
                end_idx = Some(i);
                break;
            }
        }
        let start = start_idx.unwrap_or(0);
        let end = end_idx.unwrap_or(lines.len().saturating_sub(1));
        if start > end {
            return Vec::new();
        }
        lines[start..=end].to_vec()
    }

    /// Selected lines plus whole components touched by the selection.
    ///
    /// With `remove_duplicate`, entries nested inside an earlier entry are dropped.
    pub fn get_lines_and_components(&mut self, remove_duplicate: bool) -> Vec<NodeId> {
        let common = self.get_range().common_ancestor(&self.doc);
        let mut lines = if query::is_table_elements(&self.doc, common) {
            self.get_lines(None)
        } else {
            self.lines_with_components(common)
        };

        if remove_duplicate {
            let mut i = 0;
            while i < lines.len() {
                if (0..i).any(|j| self.doc.contains(lines[j], lines[i])) {
                    lines.remove(i);
                } else {
                    i += 1;
                }
            }
        }
        lines
    }

    fn lines_with_components(&mut self, common: NodeId) -> Vec<NodeId> {
        let Some(range) = self.range_for_lines() else {
            return Vec::new();
        };
        let doc = &self.doc;
        let format = &self.format;
        let component_of = |n: NodeId| query::parent_element(doc, n, |c| format.is_component(doc, c), None);
        let my_component = component_of(common);
        let check = |n: NodeId| {
            let component = component_of(n);
            (format.is_line(doc, n) && (component.is_none() || component == my_component))
                || (format.is_component(doc, n) && format.get_line(doc, n, None).is_none())
        };
        self.lines_in_range(range, Some(&check))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FigureRegistry;

    fn format() -> Format {
        Format::new(&FormatPatterns::default(), Rc::new(FigureRegistry)).unwrap()
    }

    #[test]
    fn classifies_default_tags() {
        let f = format();
        let doc = Document::from_html(concat!(
            "<p>a</p><pre>b</pre><ul><li>c</li></ul><blockquote><p>d</p></blockquote>",
            r#"<table><tbody><tr><td>e</td></tr></tbody></table><div class="katex">f</div>"#,
        ))
        .unwrap();
        let kids = doc.child_nodes(doc.root());
        let (p, pre, ul, quote, table, katex) = (kids[0], kids[1], kids[2], kids[3], kids[4], kids[5]);
        let li = doc.first_child(ul).unwrap();
        let td = query::list_children(&doc, table, |n| doc.tag_is(n, "td"))[0];

        assert!(f.is_line(&doc, p) && !f.is_block(&doc, p));
        assert!(f.is_line(&doc, pre) && f.is_br_line(&doc, pre));
        assert!(f.is_block(&doc, ul) && f.is_line(&doc, li));
        assert!(f.is_block(&doc, quote));
        assert!(f.is_closure_block(&doc, td) && f.is_line(&doc, td));
        assert!(!f.is_block(&doc, table), "tables are components");
        assert!(!f.is_line(&doc, katex));
        assert!(!f.is_line(&doc, doc.root()));
        assert!(f.is_line_only_name("P") && !f.is_line_only_name("TD"));
        assert!(f.is_line_only(&doc, p) && !f.is_line_only(&doc, td));
    }

    #[test]
    fn marker_classes_classify() {
        let f = format();
        let doc = Document::from_html(concat!(
            r#"<span class="__se__format__line_x">a</span>"#,
            r#"<span class="__se__format__br_line_y">b</span>"#,
            r#"<section class="__se__format__block_closure_z">c</section>"#,
            r#"<span class="__se__format__line_">d</span>"#,
        ))
        .unwrap();
        let kids = doc.child_nodes(doc.root());
        assert!(f.is_line(&doc, kids[0]));
        assert!(f.is_br_line(&doc, kids[1]) && f.is_line(&doc, kids[1]));
        assert!(f.is_block(&doc, kids[2]) && f.is_closure_block(&doc, kids[2]));
        assert!(!f.is_line(&doc, kids[3]), "the marker needs a suffix");
    }

    #[test]
    fn get_line_and_block_walk_up() {
        let f = format();
        let doc = Document::from_html("<blockquote><p><b>x</b></p></blockquote><ul><li>y</li></ul>").unwrap();
        let quote = doc.first_child(doc.root()).unwrap();
        let p = doc.first_child(quote).unwrap();
        let x = doc.first_child(doc.first_child(p).unwrap()).unwrap();
        assert_eq!(f.get_line(&doc, x, None), Some(p));
        assert_eq!(f.get_block(&doc, x, None), Some(quote));
        assert_eq!(f.get_line(&doc, quote, None), Some(p));
        assert_eq!(f.get_line(&doc, doc.root(), None), None);

        let not_p = |n: NodeId| !doc.tag_is(n, "p");
        assert_eq!(f.get_line(&doc, x, Some(&not_p)), Some(p), "the block answers first");
    }

    #[test]
    fn edge_lines_ignore_trailing_breaks() {
        let f = format();
        let doc = Document::from_html("<p><b>ab</b><br></p><p><i>c</i>d</p>").unwrap();
        let kids = doc.child_nodes(doc.root());
        let ab = doc.first_child(doc.first_child(kids[0]).unwrap()).unwrap();
        assert!(f.is_edge_line(&doc, ab, 2, Some(Edge::End)));
        assert!(f.is_edge_line(&doc, ab, 0, Some(Edge::Front)));
        let c = doc.first_child(doc.first_child(kids[1]).unwrap()).unwrap();
        assert!(!f.is_edge_line(&doc, c, 1, Some(Edge::End)));
    }
}
