//! Removing the selected range and inserting nodes or markup at the caret.

use verso_common::FormatPatterns;
use verso_editor_dom::html::{decode_entities, parse_fragment};
use verso_editor_dom::query::{self, Edge, parent_element};
use verso_editor_dom::unicode::is_zero_width;
use verso_editor_dom::{Document, DomError, NodeId, ZERO_WIDTH_STR};

use crate::editor::Editor;
use crate::error::{EditorError, EditorResult};
use crate::transform;

/// Sanitizes markup before it reaches the tree.
pub trait HtmlCleaner {
    /// With `require_line`, inline content is wrapped into the default line even
    /// when the markup holds no line of its own.
    fn clean(&self, html: &str, require_line: bool) -> String;
}

/// Degraded path for markup that cannot be inserted as nodes.
pub trait FallbackInserter {
    /// Build the nodes to insert in place of `html`.
    fn nodes(&self, doc: &mut Document, html: &str) -> EditorResult<Vec<NodeId>>;
}

/// Inserts the markup verbatim as a text node.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapedTextInserter;

impl FallbackInserter for EscapedTextInserter {
    fn nodes(&self, doc: &mut Document, html: &str) -> EditorResult<Vec<NodeId>> {
        if html.is_empty() {
            return Err(EditorError::Insert("empty fragment".to_owned()));
        }
        Ok(vec![doc.create_text(decode_entities(html))])
    }
}

const DROPPED_TAGS: &[&str] = &[
    "script", "style", "meta", "link", "title", "head", "noscript", "object", "template",
];
const UNWRAPPED_TAGS: &[&str] = &["html", "body"];

fn tag_in(doc: &Document, node: NodeId, tags: &[&str]) -> bool {
    doc.tag(node)
        .is_some_and(|t| tags.iter().any(|d| t.eq_ignore_ascii_case(d)))
}

/// Default [`HtmlCleaner`]: drops non-content elements, unwraps bare spans and
/// groups loose inline runs into lines.
#[derive(Debug, Clone)]
pub struct BasicCleaner {
    default_line: String,
    inline: Vec<String>,
}

impl BasicCleaner {
    pub fn new(default_line: &str) -> Self {
        Self {
            default_line: default_line.to_owned(),
            inline: Vec::new(),
        }
        .with_text_styles(&FormatPatterns::default().text_style)
    }

    /// Inline tags, `|`-separated as in [`FormatPatterns::text_style`].
    pub fn with_text_styles(mut self, tags: &str) -> Self {
        self.inline = tags
            .split('|')
            .filter(|t| !t.is_empty())
            .map(str::to_ascii_lowercase)
            .chain(["img".to_owned(), "wbr".to_owned()])
            .collect();
        self
    }

    fn is_inline(&self, doc: &Document, node: NodeId) -> bool {
        doc.is_text(node)
            || doc
                .tag(node)
                .is_some_and(|t| self.inline.iter().any(|i| t.eq_ignore_ascii_case(i)))
    }

    fn strip(&self, doc: &mut Document, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            if tag_in(doc, node, DROPPED_TAGS) {
                continue;
            }
            if doc.is_element(node) {
                strip_inside(doc, node);
            }
            if tag_in(doc, node, UNWRAPPED_TAGS) || query::is_span_without_attr(doc, node) {
                let children = doc.child_nodes(node);
                for child in &children {
                    doc.detach(*child);
                }
                out.extend(self.strip(doc, children));
            } else {
                out.push(node);
            }
        }
        out
    }

    fn flush(&self, doc: &mut Document, run: &mut Vec<NodeId>, keep_empty: bool, out: &mut String) {
        let blank = run
            .iter()
            .all(|n| doc.is_text(*n) && doc.text(*n).is_some_and(|t| t.trim().is_empty()));
        if blank && !keep_empty {
            run.clear();
            return;
        }
        let line = doc.create_element(&self.default_line);
        let mut filled = false;
        for node in run.drain(..) {
            if blank {
                continue;
            }
            if doc.append_child(line, node).is_ok() {
                filled = true;
            }
        }
        if !filled {
            let br = doc.create_element("br");
            let _ = doc.append_child(line, br);
        }
        out.push_str(&doc.outer_html(line));
    }
}

fn strip_inside(doc: &mut Document, element: NodeId) {
    for child in doc.child_nodes(element) {
        if tag_in(doc, child, DROPPED_TAGS) {
            doc.detach(child);
            continue;
        }
        if doc.is_element(child) {
            strip_inside(doc, child);
            if query::is_span_without_attr(doc, child)
                && let Err(err) = doc.unwrap(child)
            {
                tracing::trace!(target: "verso::html", error = %err, "kept a bare span");
            }
        }
    }
}

impl HtmlCleaner for BasicCleaner {
    fn clean(&self, html: &str, require_line: bool) -> String {
        let mut doc = Document::new();
        let nodes = match parse_fragment(&mut doc, html) {
            Ok(nodes) => nodes,
            Err(err) => {
                tracing::debug!(target: "verso::html", error = %err, "cleaner left unparsable markup untouched");
                return html.to_owned();
            }
        };
        let nodes = self.strip(&mut doc, nodes);
        let force = require_line
            || nodes
                .iter()
                .any(|n| doc.is_element(*n) && !query::is_break(&doc, *n) && !self.is_inline(&doc, *n));
        if !force {
            return nodes.iter().map(|n| doc.outer_html(*n)).collect();
        }

        let mut out = String::new();
        let mut run = Vec::new();
        for node in nodes {
            if let Some(text) = doc.text(node).map(str::to_owned) {
                let mut segments = text.split('\n');
                if let Some(first) = segments.next()
                    && !first.is_empty()
                {
                    run.push(doc.create_text(first));
                }
                for segment in segments {
                    self.flush(&mut doc, &mut run, false, &mut out);
                    if !segment.is_empty() {
                        run.push(doc.create_text(segment));
                    }
                }
            } else if query::is_break(&doc, node) {
                self.flush(&mut doc, &mut run, true, &mut out);
            } else if self.is_inline(&doc, node) {
                run.push(node);
            } else {
                self.flush(&mut doc, &mut run, false, &mut out);
                out.push_str(&doc.outer_html(node));
            }
        }
        self.flush(&mut doc, &mut run, false, &mut out);
        out
    }
}

/// Where the caret was left by [`Editor::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveResult {
    pub container: NodeId,
    pub offset: usize,
    /// Start container of the removed range, if it survived.
    pub prev_container: Option<NodeId>,
    pub common: NodeId,
}

/// What [`Editor::insert_node`] put into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Node(NodeId),
    /// Text merged with its neighbours. The offsets bound the inserted run.
    Text {
        container: NodeId,
        start_offset: usize,
        end_offset: usize,
    },
}

impl Inserted {
    pub fn node(&self) -> NodeId {
        match *self {
            Inserted::Node(node) => node,
            Inserted::Text { container, .. } => container,
        }
    }
}

fn head(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn tail(text: &str, chars: usize) -> String {
    text.chars().skip(chars).collect()
}

impl Editor {
    /// Delete the content of the current range.
    ///
    /// Boundary text nodes are sliced, interior nodes removed whole. A component
    /// at either end is left in place.
    pub fn remove(&mut self) -> EditorResult<RemoveResult> {
        self.reset_range_to_text_node();
        let range = self.get_range();
        let root = self.doc.root();
        let (sc, ec) = (range.start_container, range.end_container);
        let (mut so, mut eo) = (range.start_offset, range.end_offset);
        let common = {
            let c = range.common_ancestor(&self.doc);
            match self.doc.parent(sc) {
                Some(p) if self.doc.is_text(c) && self.doc.parent(c) == Some(p) => p,
                _ => c,
            }
        };

        let (mut start, mut end) = (Some(sc), Some(ec));
        if common == sc && common == ec {
            let children = self.doc.element_children(common);
            start = children.get(so).copied();
            end = children.get(eo).copied();
            so = 0;
            eo = 0;
        }

        let mut nodes = query::list_child_nodes(&self.doc, common, |_| true);
        let position = |nodes: &[NodeId], node: Option<NodeId>| node.and_then(|n| nodes.iter().position(|x| *x == n));
        let (mut start_index, mut end_index);
        match (start, position(&nodes, start), position(&nodes, end)) {
            (Some(start_node), Some(si), Some(ei)) => {
                start_index = si;
                end_index = ei;
                // a removal from the front of a node takes its wrappers along
                if so == 0 {
                    let mut widened = start_node;
                    for i in (0..=(si + 1).min(nodes.len() - 1)).rev() {
                        let n = nodes[i];
                        if self.doc.parent(widened) == Some(n) && self.doc.first_child(n) == Some(widened) {
                            start_index = i;
                            widened = n;
                        }
                    }
                }
                if let Some(mut end_node) = end {
                    let mut i = end_index;
                    while i > start_index + 1 {
                        i -= 1;
                        let n = nodes[i];
                        if self.doc.parent(end_node) == Some(n) && self.doc.is_element(n) {
                            nodes.remove(i);
                            end_node = n;
                            end_index -= 1;
                        }
                    }
                }
            }
            _ => {
                if nodes.is_empty() {
                    let structural = self.format.is_line(&self.doc, common)
                        || self.format.is_block(&self.doc, common)
                        || self.doc.is_root(common)
                        || query::is_break(&self.doc, common)
                        || query::is_media(&self.doc, common);
                    if structural || self.doc.is_text(common) {
                        let offset = if structural { 0 } else { eo };
                        return Ok(RemoveResult {
                            container: common,
                            offset,
                            prev_container: None,
                            common,
                        });
                    }
                    nodes.push(common);
                    start = Some(common);
                    end = Some(common);
                } else {
                    let first = nodes[0];
                    start = Some(first);
                    end = Some(first);
                    if query::is_break(&self.doc, first) || query::is_zero_width_node(&self.doc, first) {
                        let container = if query::is_media(&self.doc, common) { common } else { first };
                        return Ok(RemoveResult {
                            container,
                            offset: 0,
                            prev_container: None,
                            common,
                        });
                    }
                }
                start_index = 0;
                end_index = 0;
            }
        }

        let mut offset = 0;
        for &item in &nodes[start_index..=end_index.min(nodes.len() - 1)] {
            let is_start = Some(item) == start;
            let is_end = Some(item) == end;
            if !self.doc.is_attached(item) {
                if is_start && is_end {
                    break;
                }
                continue;
            }
            if self.doc.is_text(item) && self.doc.node_len(item) == 0 {
                self.remove_list_item(item);
                continue;
            }
            if is_start || is_end {
                if self.doc.is_element(item) {
                    if self.format.is_component(&self.doc, item) {
                        continue;
                    }
                    if self.doc.text_content(item).is_empty() {
                        self.remove_list_item(item);
                    }
                } else {
                    let text = self.doc.text(item).unwrap_or_default().to_owned();
                    let kept = match (is_start, is_end) {
                        (true, true) => {
                            offset = so;
                            head(&text, so) + &tail(&text, eo)
                        }
                        (true, false) => head(&text, so),
                        _ => tail(&text, eo),
                    };
                    if kept.is_empty() {
                        self.remove_list_item(item);
                    } else {
                        self.doc.set_text(item, kept);
                    }
                }
                if is_start && is_end {
                    break;
                }
                continue;
            }
            self.remove_list_item(item);
        }

        let end_list = end.and_then(|e| parent_element(&self.doc, e, |n| query::is_list(&self.doc, n), None));
        let start_cell = start.and_then(|s| parent_element(&self.doc, s, |n| query::is_list_cell(&self.doc, n), None));
        let mut container = match (end_list, start_cell) {
            (Some(list), Some(cell)) if self.doc.contains(cell, list) => {
                let c = self.doc.prev_sibling(list).unwrap_or(cell);
                offset = self.doc.text_content(c).chars().count();
                c
            }
            _ => end
                .filter(|n| self.doc.is_attached(*n))
                .or_else(|| start.filter(|n| self.doc.is_attached(*n)))
                .unwrap_or(range.end_container),
        };
        if !self.doc.is_attached(container) {
            container = root;
        }

        if !self.doc.is_root(container)
            && self.doc.child_count(container) == 0
            && let Some(edges) = transform::remove_all_parents(&mut self.doc, &self.format, container, None, None)
        {
            container = edges.prev.or(edges.next).unwrap_or(root);
        }

        self.set_caret(container, offset);
        self.push_history(true);
        tracing::debug!(target: "verso::html", removed = (end_index + 1).saturating_sub(start_index), "removed range content");
        Ok(RemoveResult {
            container,
            offset,
            prev_container: start.filter(|s| self.doc.is_attached(*s)),
            common,
        })
    }

    fn remove_list_item(&mut self, item: NodeId) {
        let line = self.format.get_line(&self.doc, item, None);
        self.doc.detach(item);
        let Some(line) = line.filter(|l| query::is_list_cell(&self.doc, *l)) else {
            return;
        };
        transform::remove_all_parents(&mut self.doc, &self.format, line, None, None);
        if let Some(first) = self.doc.first_child(line)
            && query::is_list(&self.doc, first)
        {
            let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
            if let Err(err) = self.doc.insert_before(line, sentinel, Some(first)) {
                tracing::trace!(target: "verso::html", error = %err, "no sentinel before nested list");
            }
        }
    }

    /// Child of `holder` on the way down to `container`.
    fn child_toward(&self, holder: NodeId, container: NodeId, prev: NodeId) -> Option<NodeId> {
        if holder == container || !self.doc.contains(holder, container) {
            return None;
        }
        let mut same_parent = true;
        let mut node = container;
        while let Some(p) = self.doc.parent(node)
            && p != holder
        {
            node = p;
            same_parent = false;
        }
        if same_parent && container == prev {
            self.doc.next_sibling(node)
        } else {
            Some(node)
        }
    }

    fn place(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) -> EditorResult<()> {
        match self.doc.insert_before(parent, node, reference) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(target: "verso::html", error = %err, "insertion point moved, appending instead");
                Ok(self.doc.append_child(parent, node)?)
            }
        }
    }

    /// Replace the selection with `node`, or put it after `after`.
    ///
    /// Returns `None` when read-only or when the node would pass the character
    /// limit; nothing is changed then. A text node is merged with its neighbours
    /// and reported as [`Inserted::Text`].
    pub fn insert_node(
        &mut self,
        node: NodeId,
        after: Option<NodeId>,
        skip_char_count: bool,
    ) -> EditorResult<Option<Inserted>> {
        let inserted = self.insert_node_at(node, after, skip_char_count)?;
        if inserted.is_some() {
            self.push_history(true);
            self.finish();
        }
        Ok(inserted)
    }

    pub(crate) fn insert_node_at(
        &mut self,
        node: NodeId,
        after: Option<NodeId>,
        skip_char_count: bool,
    ) -> EditorResult<Option<Inserted>> {
        if self.options.read_only || (!skip_char_count && !self.counter.check_node(&self.doc, node)) {
            return Ok(None);
        }
        let root = self.doc.root();
        let mut node = node;
        let mut after = after;

        let range = self.get_range();
        let range_common = range.common_ancestor(&self.doc);
        let mut line = if query::is_list_cell(&self.doc, range_common) {
            Some(range_common)
        } else {
            let n = self.get_node();
            self.format.get_line(&self.doc, n, None)
        };
        let node_is_list = query::is_list(&self.doc, node);
        let mut insert_list_cell = line.is_some_and(|l| query::is_list_cell(&self.doc, l))
            && (node_is_list || query::is_list_cell(&self.doc, node));
        let free_format = line.is_some_and(|l| self.format.is_br_line(&self.doc, l));
        let is_component = self.format.is_component(&self.doc, node);
        let is_formats = (!free_format
            && (self.format.is_line(&self.doc, node) || self.format.is_block(&self.doc, node)))
            || is_component;

        let mut temp_after = None;
        let mut temp_parent = None;
        if insert_list_cell && let Some(l) = line {
            temp_after = if after.is_some() || node_is_list {
                self.doc.last_child(l)
            } else {
                self.doc.next_element_sibling(l)
            };
            temp_parent = if node_is_list {
                Some(l)
            } else {
                self.doc.parent(temp_after.unwrap_or(l))
            };
        }

        if after.is_none() && (is_formats || query::is_media(&self.doc, node)) {
            let is_edge = query::is_edge_point(&self.doc, range.end_container, range.end_offset, Some(Edge::End));
            let removed = self.remove()?;
            let container = removed.container;
            let prev_container = removed
                .prev_container
                .filter(|p| !(*p == container && range.is_collapsed()));

            if insert_list_cell && let Some(prev) = prev_container {
                let holder = if self.doc.is_text(prev) {
                    self.doc.parent(prev).unwrap_or(prev)
                } else {
                    prev
                };
                temp_parent = Some(holder);
                temp_after = self.child_toward(holder, container, prev);
            } else if insert_list_cell
                && query::is_list_cell(&self.doc, container)
                && line.is_some_and(|l| self.doc.parent(l).is_none())
            {
                // the caret's cell went away with the selection
                let cell = self.doc.create_element("li");
                if let Some(tp) = temp_parent
                    && !self.doc.contains(tp, container)
                {
                    self.doc.append_child(tp, cell)?;
                    self.doc.append_child(container, tp)?;
                }
                line = Some(cell);
                temp_after = None;
            } else if self.doc.is_text(container) || query::is_break(&self.doc, container) || insert_list_cell {
                let depth_format = parent_element(
                    &self.doc,
                    container,
                    |n| self.format.is_block(&self.doc, n) || query::is_list_cell(&self.doc, n),
                    None,
                );
                let depth = depth_format.map_or(0, |d| query::node_depth(&self.doc, d) + 1);
                let split = transform::split(&mut self.doc, &self.format, container, Some(removed.offset), depth)?;
                if insert_list_cell {
                    if let Some(l) = line.filter(|l| self.doc.contains(*l, container)) {
                        let sub_list = self
                            .doc
                            .last_element_child(l)
                            .filter(|c| query::is_list(&self.doc, *c));
                        let mut new_cell = None;
                        if !is_edge {
                            let cell = self.doc.clone_shallow(l)?;
                            let content = if self.doc.text_content(split).trim().is_empty() {
                                self.doc.create_text(ZERO_WIDTH_STR)
                            } else {
                                split
                            };
                            self.doc.append_child(cell, content)?;
                            new_cell = Some(cell);
                        }
                        if let Some(sub) = sub_list {
                            let cell = match new_cell {
                                Some(cell) => cell,
                                None => {
                                    let cell = self.doc.clone_shallow(l)?;
                                    let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
                                    self.doc.append_child(cell, sentinel)?;
                                    cell
                                }
                            };
                            self.doc.append_child(cell, sub)?;
                            new_cell = Some(cell);
                        }
                        if let Some(cell) = new_cell {
                            let parent = self.doc.parent(l).ok_or(DomError::MissingParent(l))?;
                            let next = self.doc.next_element_sibling(l);
                            self.doc.insert_before(parent, cell, next)?;
                            temp_after = Some(cell);
                            after = Some(cell);
                        }
                    }
                } else {
                    after = self.doc.prev_sibling(split);
                }
            }
        }

        let range = if after.is_none() && !is_formats {
            let current = self.get_range();
            self.get_range_and_add_line(current, None)?
        } else {
            self.get_range()
        };
        let common = range.common_ancestor(&self.doc);
        let (so, eo) = (range.start_offset, range.end_offset);
        let format_range = range.start_container == common && self.format.is_line(&self.doc, common);
        let start_con = if format_range {
            self.doc
                .child_at(common, so)
                .or_else(|| self.doc.first_child(common))
                .unwrap_or(range.start_container)
        } else {
            range.start_container
        };
        let end_con = if format_range {
            self.doc
                .child_at(common, eo)
                .or_else(|| self.doc.last_child(common))
                .unwrap_or(range.end_container)
        } else {
            range.end_container
        };

        let mut parent = root;
        let mut origin_after = false;
        if !insert_list_cell {
            match after {
                Some(a) => {
                    parent = self.doc.parent(a).ok_or(DomError::MissingParent(a))?;
                    after = self.doc.next_sibling(a);
                    origin_after = true;
                }
                None => {
                    parent = if self.doc.is_text(start_con) {
                        self.doc.parent(start_con).unwrap_or(root)
                    } else {
                        start_con
                    };
                    if range.is_collapsed() {
                        if self.doc.is_text(common) {
                            after = if self.doc.node_len(common) > eo {
                                Some(self.doc.split_text(common, eo)?)
                            } else {
                                self.doc.next_sibling(common)
                            };
                        } else if !query::is_break(&self.doc, parent) {
                            let focus = match self.doc.child_at(parent, so) {
                                Some(c)
                                    if self.doc.is_text(c)
                                        && query::is_zero_width_node(&self.doc, c)
                                        && self.doc.next_sibling(c).is_some_and(|n| query::is_break(&self.doc, n)) =>
                                {
                                    self.doc.next_sibling(c)
                                }
                                c => c,
                            };
                            after = match focus {
                                Some(f) if self.doc.next_sibling(f).is_none() => {
                                    self.doc.detach(f);
                                    None
                                }
                                Some(f) if query::is_break(&self.doc, f) && !query::is_break(&self.doc, node) => Some(f),
                                Some(f) => self.doc.next_sibling(f),
                                None => None,
                            };
                        } else {
                            after = Some(parent);
                            parent = self.doc.parent(parent).unwrap_or(root);
                        }
                    } else if start_con == end_con && self.doc.is_text(start_con) {
                        after = if query::is_edge_point(&self.doc, end_con, eo, None) {
                            self.doc.next_sibling(end_con)
                        } else {
                            Some(self.doc.split_text(end_con, eo)?)
                        };
                        let removed = if query::is_edge_point(&self.doc, start_con, so, None) {
                            start_con
                        } else {
                            self.doc.split_text(start_con, so)?
                        };
                        self.doc.detach(removed);
                        if self.doc.child_count(parent) == 0 && is_formats {
                            self.doc.set_inner_html(parent, "<br>")?;
                        }
                    } else {
                        let removed = self.remove()?;
                        let container = removed.container;
                        if self.doc.is_element(container) && self.doc.child_count(container) == 0 && is_formats {
                            if self.format.is_line(&self.doc, container) {
                                self.doc.set_inner_html(container, "<br>")?;
                            } else if self.format.is_block(&self.doc, container) {
                                let markup = format!("<{0}><br></{0}>", self.options.default_line);
                                self.doc.set_inner_html(container, &markup)?;
                            }
                        }

                        if query::is_list_cell(&self.doc, container) && self.doc.is_text(node) {
                            parent = container;
                            after = None;
                        } else if !is_formats && let Some(prev) = removed.prev_container {
                            parent = if self.doc.is_text(prev) {
                                self.doc.parent(prev).unwrap_or(root)
                            } else {
                                prev
                            };
                            after = self.child_toward(parent, container, prev);
                        } else {
                            after = if is_formats {
                                Some(end_con)
                            } else if Some(container) == removed.prev_container {
                                self.doc.next_sibling(container)
                            } else {
                                Some(container)
                            };
                            parent = after.and_then(|a| self.doc.parent(a)).unwrap_or(common);
                        }

                        while let Some(a) = after
                            && !self.format.is_line(&self.doc, a)
                            && self.doc.parent(a) != Some(common)
                        {
                            after = self.doc.parent(a);
                        }
                    }
                }
            }
        }

        if !insert_list_cell {
            if after == Some(root) {
                parent = root;
                after = None;
            }

            if self.format.is_line(&self.doc, node)
                || self.format.is_block(&self.doc, node)
                || (!query::is_list_cell(&self.doc, parent) && is_component)
            {
                let old_parent = parent;
                if let Some(list) = after.filter(|a| query::is_list(&self.doc, *a)) {
                    parent = list;
                    after = None;
                } else if let Some(cell) = after.filter(|a| query::is_list_cell(&self.doc, *a)) {
                    parent = self.doc.prev_element_sibling(cell).unwrap_or(cell);
                } else if !origin_after && after.is_none() {
                    let removed = self.remove()?;
                    let container = if self.doc.is_text(removed.container) {
                        let l = self.format.get_line(&self.doc, removed.container, None);
                        if l.is_some_and(|l| query::is_list_cell(&self.doc, l)) {
                            removed.container
                        } else {
                            l.or_else(|| self.doc.parent(removed.container)).unwrap_or(root)
                        }
                    } else {
                        removed.container
                    };
                    if self.doc.is_root(container) || self.format.is_block(&self.doc, container) {
                        parent = container;
                        after = None;
                    } else {
                        parent = self.doc.parent(container).unwrap_or(root);
                        after = self.doc.next_sibling(container);
                    }
                }
                if self.doc.child_count(old_parent) == 0 && parent != old_parent && !self.doc.is_root(old_parent) {
                    self.doc.detach(old_parent);
                }
            }

            if is_formats
                && !free_format
                && !self.format.is_block(&self.doc, parent)
                && !query::is_list_cell(&self.doc, parent)
                && !self.doc.is_root(parent)
            {
                after = self.doc.next_element_sibling(parent);
                parent = self.doc.parent(parent).unwrap_or(root);
            }

            if self.doc.is_root(parent) && (self.doc.is_text(node) || query::is_break(&self.doc, node)) {
                let wrapper = self.doc.create_element(&self.options.default_line);
                self.doc.append_child(wrapper, node)?;
                node = wrapper;
            }
        }

        if insert_list_cell {
            match temp_parent.filter(|tp| self.doc.parent(*tp).is_some()) {
                Some(tp) => {
                    parent = tp;
                    after = temp_after;
                }
                None => {
                    parent = root;
                    after = None;
                }
            }
        } else if after == Some(parent) {
            after = self.doc.last_child(parent);
        }

        if query::is_list_cell(&self.doc, node) && !query::is_list(&self.doc, parent) {
            if query::is_list_cell(&self.doc, parent) {
                after = self.doc.next_element_sibling(parent);
                parent = self.doc.parent(parent).unwrap_or(root);
            } else {
                let list = self.doc.create_element("ol");
                self.place(parent, list, after)?;
                parent = list;
                after = None;
            }
            insert_list_cell = true;
        }

        self.place(parent, node, after)?;

        if insert_list_cell && let Some(l) = line {
            if is_zero_width(self.doc.text_content(l).trim()) {
                self.doc.detach(l);
                node = self.doc.last_child(node).unwrap_or(node);
            } else if let Some(child_list) = self
                .doc
                .element_children(l)
                .into_iter()
                .find(|c| query::is_list(&self.doc, *c))
            {
                if node != child_list {
                    self.doc.append_child(node, child_list)?;
                    node = self.doc.prev_sibling(child_list).unwrap_or(node);
                } else {
                    self.doc.append_child(parent, node)?;
                    node = parent;
                }
                if is_zero_width(self.doc.text_content(l).trim()) {
                    self.doc.detach(l);
                }
            }
        }

        if (self.format.is_line(&self.doc, node) || self.format.is_component(&self.doc, node))
            && start_con == end_con
            && let Some(caret_line) = self.format.get_line(&self.doc, common, None)
            && query::is_empty_line(&self.doc, caret_line)
            && !self.doc.contains(caret_line, node)
        {
            self.doc.detach(caret_line);
        }

        if free_format && (self.format.is_line(&self.doc, node) || self.format.is_block(&self.doc, node)) {
            node = self.set_into_free_format(node)?;
        }

        if self.format.is_component(&self.doc, node) {
            return Ok(Some(Inserted::Node(node)));
        }
        if self.doc.is_text(node) {
            return Ok(Some(self.merge_inserted_text(node)));
        }

        let mut offset = 1;
        if !query::is_break(&self.doc, node)
            && !query::is_list_cell(&self.doc, node)
            && self.format.is_line(&self.doc, parent)
        {
            if self.doc.prev_sibling(node).is_none_or(|p| query::is_break(&self.doc, p)) {
                let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
                self.doc.insert_before(parent, sentinel, Some(node))?;
            }
            if self.doc.next_sibling(node).is_none_or(|n| query::is_break(&self.doc, n)) {
                let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
                self.doc.insert_after(node, sentinel)?;
            }
            if self.format.is_ignore_node_change(&self.doc, node)
                && let Some(next) = self.doc.next_sibling(node)
            {
                node = next;
                offset = 0;
            }
        }
        self.set_caret(node, offset);
        tracing::trace!(target: "verso::html", tag = ?self.doc.tag(node), "inserted node");
        Ok(Some(Inserted::Node(node)))
    }

    /// Join an inserted text node with the text around it and select the inserted run.
    fn merge_inserted_text(&mut self, node: NodeId) -> Inserted {
        let text_of = |doc: &Document, n: Option<NodeId>| {
            n.and_then(|n| doc.text(n))
                .filter(|t| !is_zero_width(t))
                .unwrap_or_default()
                .to_owned()
        };
        let prev = self.doc.prev_sibling(node).filter(|p| self.doc.is_text(*p));
        let next = self.doc.next_sibling(node).filter(|n| self.doc.is_text(*n));
        let prev_text = text_of(&self.doc, prev);
        let next_text = text_of(&self.doc, next);

        let mut text = self.doc.text(node).unwrap_or_default().to_owned();
        if let Some(p) = prev
            && !prev_text.is_empty()
        {
            text = format!("{prev_text}{text}");
            self.doc.detach(p);
        }
        if let Some(n) = next
            && self.doc.node_len(n) > 0
        {
            text.push_str(&next_text);
            self.doc.detach(n);
        }
        let start_offset = prev_text.chars().count();
        let end_offset = text.chars().count() - next_text.chars().count();
        self.doc.set_text(node, text);
        self.set_range(node, start_offset, node, end_offset);
        Inserted::Text {
            container: node,
            start_offset,
            end_offset,
        }
    }

    /// Dissolve line and block wrappers of `node` into a br-line, separating their
    /// content with `<br>`. Returns the last break.
    fn set_into_free_format(&mut self, node: NodeId) -> EditorResult<NodeId> {
        let Some(parent) = self.doc.parent(node) else {
            return Ok(node);
        };
        let mut node = node;
        while self.format.is_line(&self.doc, node) || self.format.is_block(&self.doc, node) {
            let mut last = None;
            while let Some(child) = self.doc.first_child(node) {
                if self.format.is_line(&self.doc, child) || self.format.is_block(&self.doc, child) {
                    self.set_into_free_format(child)?;
                    if self.doc.parent(node).is_none() {
                        break;
                    }
                    continue;
                }
                self.doc.insert_before(parent, child, Some(node))?;
                last = Some(child);
            }
            if self.doc.child_count(node) == 0 {
                self.doc.detach(node);
            }
            let br = self.doc.create_element("br");
            match last {
                Some(l) => self.doc.insert_after(l, br)?,
                None => self.doc.append_child(parent, br)?,
            }
            node = br;
        }
        Ok(node)
    }

    /// Parse `html` and insert its top-level nodes in order at the caret.
    ///
    /// The markup is cleaned first unless `skip_cleaning`. Markup that cannot be
    /// parsed goes through the fallback inserter; only a failure there is an error.
    /// Returns false when nothing was inserted.
    pub fn insert_html(
        &mut self,
        html: &str,
        skip_cleaning: bool,
        skip_char_count: bool,
        select_inserted: bool,
    ) -> EditorResult<bool> {
        if self.options.read_only {
            return Ok(false);
        }
        let html = if skip_cleaning {
            html.to_owned()
        } else {
            self.caps.cleaner.clean(html, false)
        };
        let inserted = match self.insert_markup(&html, skip_char_count, select_inserted) {
            Ok(inserted) => inserted,
            Err(err) => {
                tracing::warn!(target: "verso::html", error = %err, "markup insertion failed, using the fallback inserter");
                self.insert_fallback(&html)?;
                true
            }
        };
        if inserted {
            self.push_history(false);
        }
        self.finish();
        Ok(inserted)
    }

    fn insert_fallback(&mut self, html: &str) -> EditorResult<()> {
        let nodes = self
            .caps
            .fallback
            .nodes(&mut self.doc, html)
            .map_err(|err| EditorError::Insert(err.to_string()))?;
        let mut after = None;
        for node in nodes {
            match self.insert_node_at(node, after, true) {
                Ok(Some(inserted)) => after = Some(inserted.node()),
                Ok(None) => {}
                Err(err) => return Err(EditorError::Insert(err.to_string())),
            }
        }
        Ok(())
    }

    fn insert_markup(&mut self, html: &str, skip_char_count: bool, select_inserted: bool) -> EditorResult<bool> {
        let caret = self.get_node();
        let in_cell = self
            .format
            .get_line(&self.doc, caret, None)
            .is_some_and(|l| query::is_list_cell(&self.doc, l));
        let mut nodes = parse_fragment(&mut self.doc, html)?;
        if in_cell && self.is_format_data(&nodes) {
            nodes = self.convert_list_cells(nodes)?;
        }
        if !skip_char_count {
            let addition: String = nodes
                .iter()
                .map(|n| self.counter.addition_of(&self.doc, *n))
                .collect();
            if !self.counter.check(&self.doc, &addition) {
                tracing::debug!(target: "verso::html", "markup refused by the character limit");
                return Ok(false);
            }
        }

        let mut after: Option<NodeId> = None;
        let mut first = None;
        let mut last = None;
        let mut prev: Option<NodeId> = None;
        for node in nodes {
            if prev.is_some_and(|p| self.doc.is_text(p))
                && after.is_some_and(|a| self.doc.is_element(a))
                && query::is_break(&self.doc, node)
            {
                prev = Some(node);
                continue;
            }
            if let Some(inserted) = self.insert_node_at(node, after, true)? {
                after = Some(inserted.node());
                first.get_or_insert(inserted);
                last = Some(inserted);
            }
            prev = Some(node);
        }

        let (Some(first), Some(last), Some(mut end)) = (first, last, after) else {
            return Ok(false);
        };
        if let Some(p) = prev
            && self.doc.is_text(p)
            && self.doc.is_attached(p)
            && self.doc.is_element(end)
        {
            end = p;
        }
        let offset = match last {
            Inserted::Text {
                container,
                end_offset,
                ..
            } if container == end && end_offset > 0 => end_offset,
            _ if self.doc.is_text(end) => self.doc.node_len(end),
            _ => self.doc.child_count(end),
        };
        if select_inserted {
            let (start, start_offset) = match first {
                Inserted::Text {
                    container,
                    start_offset,
                    ..
                } => (container, start_offset),
                Inserted::Node(n) => (n, 0),
            };
            self.set_range(start, start_offset, end, offset);
        } else {
            self.set_caret(end, offset);
        }
        Ok(true)
    }

    /// Does the fragment hold anything beyond inline content.
    fn is_format_data(&self, nodes: &[NodeId]) -> bool {
        nodes.iter().any(|n| {
            self.doc.is_element(*n)
                && !self.format.is_text_style_node(&self.doc, *n)
                && !query::is_break(&self.doc, *n)
        })
    }

    /// Turn fragment nodes into list cells for insertion inside a list.
    fn convert_list_cells(&mut self, nodes: Vec<NodeId>) -> EditorResult<Vec<NodeId>> {
        let mut cells = Vec::new();
        for node in nodes {
            if query::is_list(&self.doc, node) {
                for child in self.doc.child_nodes(node) {
                    self.doc.detach(child);
                    if query::is_list_cell(&self.doc, child) {
                        cells.push(child);
                    } else if self.doc.is_element(child) {
                        let cell = self.doc.create_element("li");
                        self.doc.append_child(cell, child)?;
                        cells.push(cell);
                    }
                }
            } else if query::is_list_cell(&self.doc, node) {
                cells.push(node);
            } else if self.format.is_line(&self.doc, node) {
                let cell = self.doc.create_element("li");
                self.doc.move_children(node, cell)?;
                if self.doc.text_content(cell).trim().is_empty() && self.doc.first_element_child(cell).is_none() {
                    self.doc.set_inner_html(cell, "<br>")?;
                }
                cells.push(cell);
            } else if self.format.is_block(&self.doc, node) && !query::is_table(&self.doc, node) {
                let children = self.doc.child_nodes(node);
                for child in &children {
                    self.doc.detach(*child);
                }
                cells.extend(self.convert_list_cells(children)?);
            } else if self.doc.is_element(node) {
                let cell = self.doc.create_element("li");
                self.doc.append_child(cell, node)?;
                cells.push(cell);
            } else if !self.doc.text(node).unwrap_or_default().trim().is_empty() {
                let cell = self.doc.create_element("li");
                self.doc.append_child(cell, node)?;
                cells.push(cell);
            }
        }
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_common::EditorOptions;

    fn editor(html: &str) -> Editor {
        Editor::new(EditorOptions::default()).unwrap().with_content(html).unwrap()
    }

    fn text_at(ed: &Editor, path: &[usize]) -> NodeId {
        query::node_from_path(&ed.doc, path, ed.doc.root())
    }

    #[test]
    fn cleaner_groups_inline_runs() {
        let cleaner = BasicCleaner::new("div");
        assert_eq!(cleaner.clean("hello <b>there</b>", true), "<div>hello <b>there</b></div>");
        assert_eq!(cleaner.clean("hello <b>there</b>", false), "hello <b>there</b>");
        assert_eq!(cleaner.clean("a\nb", true), "<div>a</div><div>b</div>");
    }

    #[test]
    fn cleaner_drops_scripts_and_bare_spans() {
        let cleaner = BasicCleaner::new("p");
        assert_eq!(
            cleaner.clean("<p>a</p>\n<script>x()</script><span>b</span>", false),
            "<p>a</p><p>b</p>"
        );
        assert_eq!(
            cleaner.clean(r#"<span class="x">c</span>"#, false),
            r#"<span class="x">c</span>"#
        );
        assert_eq!(cleaner.clean("<em", false), "<em");
    }

    #[test]
    fn remove_within_a_text_node() {
        let mut ed = editor("<p>abcd</p>");
        let t = text_at(&ed, &[0, 0]);
        ed.set_range(t, 1, t, 3);
        let removed = ed.remove().unwrap();
        assert_eq!(ed.get_contents(), "<p>ad</p>");
        assert_eq!((removed.container, removed.offset), (t, 1));
        assert_eq!(removed.prev_container, Some(t));
    }

    #[test]
    fn remove_across_lines_keeps_both_lines() {
        let mut ed = editor("<p>abc</p><p>def</p>");
        let abc = text_at(&ed, &[0, 0]);
        let def = text_at(&ed, &[1, 0]);
        ed.set_range(abc, 1, def, 2);
        let removed = ed.remove().unwrap();
        assert_eq!(ed.get_contents(), "<p>a</p><p>f</p>");
        assert_eq!((removed.container, removed.offset), (def, 0));
    }

    #[test]
    fn remove_from_a_line_start_takes_the_line() {
        let mut ed = editor("<p>abc</p><p>def</p>");
        let abc = text_at(&ed, &[0, 0]);
        let def = text_at(&ed, &[1, 0]);
        ed.set_range(abc, 0, def, 1);
        let removed = ed.remove().unwrap();
        assert_eq!(ed.get_contents(), "<p>ef</p>");
        assert_eq!(removed.prev_container, None);
    }

    #[test]
    fn inserted_text_merges_with_its_neighbours() {
        let mut ed = editor("<p>abcd</p>");
        let t = text_at(&ed, &[0, 0]);
        ed.set_caret(t, 2);
        let node = ed.doc.create_text("XY");
        let inserted = ed.insert_node(node, None, false).unwrap();
        assert_eq!(
            inserted,
            Some(Inserted::Text {
                container: node,
                start_offset: 2,
                end_offset: 4
            })
        );
        assert_eq!(ed.get_contents(), "<p>abXYcd</p>");
    }

    #[test]
    fn a_line_splits_the_current_line() {
        let mut ed = editor("<p>abcd</p>");
        let t = text_at(&ed, &[0, 0]);
        ed.set_caret(t, 2);
        let line = ed.doc.create_element("p");
        let x = ed.doc.create_text("X");
        ed.doc.append_child(line, x).unwrap();
        let inserted = ed.insert_node(line, None, false).unwrap();
        assert_eq!(inserted, Some(Inserted::Node(line)));
        assert_eq!(ed.get_contents(), "<p>ab</p><p>X</p><p>cd</p>");
    }

    #[test]
    fn char_limit_refuses_without_mutation() {
        let options = EditorOptions {
            max_char_count: Some(5),
            ..Default::default()
        };
        let mut ed = Editor::new(options).unwrap().with_content("<p>abcd</p>").unwrap();
        let t = text_at(&ed, &[0, 0]);
        ed.set_caret(t, 4);
        let node = ed.doc.create_text("XY");
        assert_eq!(ed.insert_node(node, None, false).unwrap(), None);
        assert!(!ed.insert_html("<b>XY</b>", false, false, false).unwrap());
        assert_eq!(ed.get_contents(), "<p>abcd</p>");
    }

    #[test]
    fn markup_lines_are_chained() {
        let mut ed = editor("<p>abcd</p>");
        let t = text_at(&ed, &[0, 0]);
        ed.set_caret(t, 2);
        assert!(ed.insert_html("<p>X</p><p>Y</p>", false, false, false).unwrap());
        assert_eq!(ed.get_contents(), "<p>ab</p><p>X</p><p>Y</p><p>cd</p>");
        let range = ed.get_range();
        assert_eq!(ed.doc.text(range.start_container), Some("Y"));
        assert_eq!(range.start_offset, 1);
    }

    #[test]
    fn inline_markup_lands_at_the_caret() {
        let mut ed = editor("<p>abcd</p>");
        let t = text_at(&ed, &[0, 0]);
        ed.set_caret(t, 2);
        assert!(ed.insert_html("<b>X</b>", false, false, false).unwrap());
        assert_eq!(ed.get_contents(), "<p>ab<b>X</b>cd</p>");
    }

    #[test]
    fn unparsable_markup_goes_in_as_text() {
        let mut ed = editor("<p>xy</p>");
        let t = text_at(&ed, &[0, 0]);
        ed.set_caret(t, 1);
        assert!(ed.insert_html("a <", true, false, false).unwrap());
        assert_eq!(ed.get_contents(), "<p>xa &lt;y</p>");
    }

    #[test]
    fn list_fragments_become_cells() {
        let mut ed = editor("<ul><li>a</li></ul>");
        let inline = parse_fragment(&mut ed.doc, "<b>b</b><br>").unwrap();
        assert!(!ed.is_format_data(&inline));

        let nodes = parse_fragment(&mut ed.doc, "<p>b</p><ol><li>c</li></ol>").unwrap();
        assert!(ed.is_format_data(&nodes));
        let cells = ed.convert_list_cells(nodes).unwrap();
        let html: Vec<String> = cells.iter().map(|c| ed.doc.outer_html(*c)).collect();
        assert_eq!(html, ["<li>b</li>", "<li>c</li>"]);
    }
}
