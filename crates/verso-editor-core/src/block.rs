//! Wrapping lines into blocks and taking them back out.

use verso_editor_dom::query::{self, is_break, is_list, is_list_cell, is_table_cell, node_depth};
use verso_editor_dom::{DomError, NodeId, ZERO_WIDTH_STR};

use crate::editor::Editor;
use crate::error::EditorResult;
use crate::transform;

#[derive(Debug, Clone, Default)]
pub struct RemoveBlockOptions {
    /// Lines to take out. `None` takes every child out.
    pub selected: Option<Vec<NodeId>>,
    /// Put the lines into this element instead of the block's parent.
    pub new_block: Option<NodeId>,
    /// Drop the lines instead of moving them. They are handed back in [`BlockEdge::removed`].
    pub should_delete: bool,
    /// Leave the selection and the history alone.
    pub skip_history: bool,
}

/// Where [`Editor::remove_block`] left things.
///
/// When lines were moved, `sc`/`ec` are the deepest first and last nodes of the
/// moved lines. When they were deleted, `sc` is the node before the removed run and
/// `ec` the node after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockEdge {
    pub cc: Option<NodeId>,
    pub sc: Option<NodeId>,
    pub so: usize,
    pub ec: Option<NodeId>,
    pub eo: usize,
    pub removed: Vec<NodeId>,
}

enum Appended {
    Placed(Option<NodeId>),
    /// Nested lists were flattened; the walk restarts on this block.
    Reset(NodeId),
}

impl Editor {
    /// Detach lines from `block` (a blockquote, list, pre...). List cells become
    /// default lines, or `li` when the block sits in a list.
    pub fn remove_block(&mut self, block: NodeId, options: RemoveBlockOptions) -> EditorResult<BlockEdge> {
        let range = self.get_range();
        let (so, eo) = (range.start_offset, range.end_offset);
        let RemoveBlockOptions {
            selected,
            new_block,
            should_delete,
            skip_history,
        } = options;
        let new_list = new_block.is_some_and(|b| is_list(&self.doc, b));

        let mut block = block;
        let mut parent = self.doc.parent(block).ok_or(DomError::MissingParent(block))?;
        let mut children = self.doc.child_nodes(block);
        let mut rest = Some(self.doc.clone_shallow(block)?);
        let mut first_node = None;
        let mut last_node = None;
        let mut removed = Vec::new();
        let mut inserted_new = false;

        let mut i = 0;
        while i < children.len() {
            let child = children[i];
            i += 1;
            if self.doc.is_text(child) && rest.is_some_and(|r| is_list(&self.doc, r)) {
                continue;
            }
            if should_delete && i == 1 {
                let whole = selected
                    .as_ref()
                    .is_none_or(|s| s.len() == children.len() || s.first() == Some(&child));
                first_node = if whole { self.doc.prev_sibling(block) } else { rest };
            }

            let position = selected.as_ref().map(|s| s.iter().position(|x| *x == child));
            if position == Some(None) {
                let holder = match rest {
                    Some(r) => r,
                    None => {
                        let r = self.doc.clone_shallow(block)?;
                        rest = Some(r);
                        r
                    }
                };
                self.doc.append_child(holder, child)?;
                continue;
            }
            let next = match (&selected, position) {
                (Some(s), Some(Some(ix))) => s.get(ix + 1).copied(),
                _ => None,
            };
            if let Some(r) = rest.filter(|r| self.doc.first_element_child(*r).is_some()) {
                self.doc.insert_before(parent, r, Some(block))?;
                rest = None;
            }

            let mut move_complete = false;
            let mut line = None;
            if !new_list && is_list_cell(&self.doc, child) {
                let crosses_depth = next.is_some_and(|n| node_depth(&self.doc, child) != node_depth(&self.doc, n));
                let has_nested = is_list_cell(&self.doc, parent)
                    || self.doc.element_children(child).iter().any(|c| is_list(&self.doc, *c));
                if crosses_depth && has_nested {
                    let next_before = self.doc.next_element_sibling(child);
                    let holding = self.remove_nested_list(child, false)?;
                    if let Some(h) = holding
                        && (h != block || next_before != self.doc.next_element_sibling(child))
                    {
                        block = h;
                        parent = self.doc.parent(block).ok_or(DomError::MissingParent(block))?;
                        children = self.doc.child_nodes(block);
                        rest = Some(self.doc.clone_shallow(block)?);
                        i = 0;
                        continue;
                    }
                } else {
                    let tag = if should_delete {
                        self.doc.node_name(child).to_ascii_lowercase()
                    } else if is_list(&self.doc, parent) || is_list_cell(&self.doc, parent) {
                        "li".to_owned()
                    } else if is_table_cell(&self.doc, parent) {
                        "div".to_owned()
                    } else {
                        self.options.default_line.clone()
                    };
                    let converted = self.doc.create_element(&tag);
                    let keeps_lists = is_list_cell(&self.doc, converted);
                    for c in self.doc.child_nodes(child) {
                        if is_list(&self.doc, c) && !keeps_lists {
                            break;
                        }
                        self.doc.append_child(converted, c)?;
                    }
                    query::copy_tag_attributes(&mut self.doc, converted, child, &[]);
                    move_complete = true;
                    line = Some(converted);
                }
            }

            if should_delete {
                removed.push(line.unwrap_or(child));
                self.doc.detach(child);
                continue;
            }
            let line = match line {
                Some(l) => l,
                None => self.doc.clone_shallow(child)?,
            };
            let (target, reference) = match new_block {
                Some(nb) => {
                    if !inserted_new {
                        self.doc.insert_before(parent, nb, Some(block))?;
                        inserted_new = true;
                    }
                    (nb, None)
                }
                None => (parent, Some(block)),
            };
            match self.append_line(target, line, reference, child, move_complete, block)? {
                Appended::Placed(first) => {
                    if selected.is_some() {
                        last_node = first;
                        if first_node.is_none() {
                            first_node = first;
                        }
                    } else if first_node.is_none() {
                        first_node = first;
                        last_node = first;
                    }
                }
                Appended::Reset(holding) => {
                    block = holding;
                    parent = self.doc.parent(block).ok_or(DomError::MissingParent(block))?;
                    children = self.doc.child_nodes(block);
                    rest = Some(self.doc.clone_shallow(block)?);
                    i = 0;
                }
            }
        }

        let range_parent = self.doc.parent(block);
        let mut range_right = self.doc.next_sibling(block);
        if let (Some(r), Some(rp)) = (rest, range_parent)
            && self.doc.first_element_child(r).is_some()
        {
            self.doc.insert_before(rp, r, range_right)?;
            range_right = Some(r);
        }
        match new_block {
            Some(nb) => {
                first_node = Some(nb);
                last_node = Some(nb);
            }
            None if first_node.is_none() => first_node = self.doc.prev_sibling(block),
            None => {}
        }

        if self.doc.first_element_child(block).is_none() || self.doc.text_content(block).is_empty() {
            self.doc.detach(block);
        } else {
            transform::remove_empty_node(&mut self.doc, &self.format, block, None, false);
        }

        let edge = if should_delete {
            BlockEdge {
                cc: range_parent,
                sc: first_node,
                so,
                ec: range_right,
                eo,
                removed,
            }
        } else {
            let first = first_node.or(last_node);
            let last = last_node.or(first_node);
            match (first, last) {
                (Some(f), Some(l)) => {
                    let l = if self.doc.is_attached(l) { l } else { f };
                    let (sc, ec) = query::edge_child_nodes(&self.doc, f, Some(l));
                    BlockEdge {
                        cc: self.doc.parent(sc),
                        sc: Some(sc),
                        so,
                        ec: Some(ec),
                        eo,
                        removed,
                    }
                }
                _ => BlockEdge {
                    cc: range_parent,
                    so,
                    eo,
                    ..BlockEdge::default()
                },
            }
        };
        tracing::debug!(target: "verso::transform", delete = should_delete, "block removed");

        if skip_history {
            return Ok(edge);
        }
        if !should_delete && let (Some(sc), Some(ec)) = (edge.sc, edge.ec) {
            if selected.is_none() {
                self.set_caret(sc, 0);
            } else {
                self.set_range(sc, so, ec, eo);
            }
        }
        self.push_history(false);
        if !should_delete {
            self.finish();
        }
        Ok(edge)
    }

    /// Place the content of a line taken out of a block before `sibling` in `target`.
    /// Components and other non-text nodes are split out next to the line.
    fn append_line(
        &mut self,
        target: NodeId,
        line: NodeId,
        sibling: Option<NodeId>,
        origin: NodeId,
        move_complete: bool,
        block: NodeId,
    ) -> EditorResult<Appended> {
        let source = if move_complete { line } else { origin };
        if self.doc.is_text(line) {
            self.doc.insert_before(target, line, sibling)?;
            return Ok(Appended::Placed(Some(line)));
        }
        let blank = query::is_zero_width_node(&self.doc, source)
            && self.doc.descendants(source).iter().all(|d| {
                self.doc.is_text(*d) || is_break(&self.doc, *d)
            });
        if move_complete && blank {
            for c in self.doc.child_nodes(line) {
                self.doc.detach(c);
            }
            let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
            self.doc.append_child(line, sentinel)?;
        }

        let mut first = None;
        let mut format = self.doc.clone_shallow(line)?;
        for c in self.doc.child_nodes(source) {
            if self.format.not_text_node(&self.doc, c) && !is_break(&self.doc, c) && !is_list_cell(&self.doc, format) {
                if self.doc.first_child(format).is_some() {
                    first.get_or_insert(format);
                    self.doc.insert_before(target, format, sibling)?;
                    format = self.doc.clone_shallow(line)?;
                }
                self.doc.insert_before(target, c, sibling)?;
                first.get_or_insert(c);
            } else {
                self.doc.append_child(format, c)?;
            }
        }

        if self.doc.first_child(format).is_some() {
            let into_nested = is_list_cell(&self.doc, target)
                && is_list_cell(&self.doc, format)
                && sibling.is_some_and(|s| is_list(&self.doc, s));
            if into_nested {
                let next_before = self.doc.next_element_sibling(origin);
                let holding = self.remove_nested_list(origin, false)?;
                if let Some(h) = holding
                    && (h != block || next_before != self.doc.next_element_sibling(origin))
                {
                    self.doc.move_children(format, origin)?;
                    return Ok(Appended::Reset(h));
                }
            }
            self.doc.insert_before(target, format, sibling.filter(|s| self.doc.parent(*s) == Some(target)))?;
            first.get_or_insert(format);
        }
        Ok(Appended::Placed(first))
    }

    /// Wrap the selected lines in a clone of `wrapper` (a blockquote, for example).
    /// List cells are carried along inside a list of their kind.
    pub fn apply_block(&mut self, wrapper: NodeId) -> EditorResult<()> {
        let range = self.get_range();
        self.get_range_and_add_line(range, None)?;
        let lines = self.get_lines_and_components(false);
        let Some(&last) = lines.last() else {
            return Ok(());
        };

        let doc = &self.doc;
        let stand = if self.format.is_block(doc, last) || self.format.is_line(doc, last) {
            last
        } else {
            self.format
                .get_block(doc, last, None)
                .or_else(|| self.format.get_line(doc, last, None))
                .unwrap_or(last)
        };
        let (mut before, mut p_element) = if is_table_cell(doc, stand) {
            (None, stand)
        } else {
            (doc.next_sibling(stand), doc.parent(stand).unwrap_or(doc.root()))
        };
        let mut parent_depth = node_depth(doc, stand);

        let block = self.doc.clone_shallow(wrapper)?;
        let mut list_parent: Option<NodeId> = None;
        let mut group = Vec::new();

        for (i, &line) in lines.iter().enumerate() {
            let Some(origin_parent) = self.doc.parent(line) else {
                continue;
            };
            if self.doc.contains(block, origin_parent) {
                continue;
            }
            let depth = node_depth(&self.doc, line);

            if !is_list(&self.doc, origin_parent) {
                if parent_depth >= depth {
                    parent_depth = depth;
                    p_element = origin_parent;
                    before = self.doc.next_sibling(line);
                }
                self.doc.append_child(block, line)?;
                if p_element != origin_parent
                    && let Some(b) = self.remove_items(p_element, origin_parent)
                {
                    before = b;
                }
                continue;
            }

            let cells = match list_parent {
                Some(lp) => lp,
                None => {
                    let lp = self.doc.clone_shallow(origin_parent)?;
                    list_parent = Some(lp);
                    lp
                }
            };
            group.push(line);
            let run_ends = lines
                .get(i + 1)
                .is_none_or(|n| self.doc.parent(*n) != Some(origin_parent));
            if !run_ends {
                continue;
            }

            let mut shell = cells;
            let mut up = self.doc.parent(origin_parent);
            while let Some(list) = up.filter(|l| is_list(&self.doc, *l)) {
                let tag = self.doc.node_name(list).to_ascii_lowercase();
                let wrap = self.doc.create_element(&tag);
                self.doc.append_child(wrap, shell)?;
                shell = wrap;
                up = self.doc.parent(list);
            }

            let edge = self.remove_block(
                origin_parent,
                RemoveBlockOptions {
                    selected: Some(std::mem::take(&mut group)),
                    new_block: None,
                    should_delete: true,
                    skip_history: true,
                },
            )?;
            if parent_depth >= depth {
                parent_depth = depth;
                if let Some(cc) = edge.cc {
                    p_element = cc;
                }
                before = self.remove_items(p_element, origin_parent).unwrap_or(edge.ec);
                if let Some(p) = before.and_then(|b| self.doc.parent(b)) {
                    p_element = p;
                }
            } else if edge.cc == Some(p_element) {
                before = edge.ec;
            }
            for r in edge.removed {
                self.doc.append_child(cells, r)?;
            }
            self.doc.append_child(block, shell)?;
            list_parent = None;
        }

        if self.doc.first_child(block).is_none() {
            return Ok(());
        }
        transform::merge_same_tags(&mut self.doc, &self.format, block, &mut [], false);
        transform::merge_nested_tags(&mut self.doc, block, |d, c| is_list(d, c));

        let nested_before = before.filter(|b| {
            node_depth(&self.doc, *b) > 0
                && self.doc.parent(*b).is_some_and(|p| {
                    is_list(&self.doc, p) || self.doc.parent(p).is_some_and(|gp| is_list(&self.doc, gp))
                })
        });
        if let Some(b) = nested_before {
            let depth_block = query::parent_element(
                &self.doc,
                b,
                |c| self.format.is_block(&self.doc, c) && !is_list(&self.doc, c),
                None,
            );
            let depth = depth_block.map_or(0, |d| node_depth(&self.doc, d) + 1);
            let split_at = transform::split(&mut self.doc, &self.format, b, None, depth)?;
            let parent = self.doc.parent(split_at).ok_or(DomError::MissingParent(split_at))?;
            self.doc.insert_before(parent, block, Some(split_at))?;
        } else {
            let reference = before.filter(|b| self.doc.parent(*b) == Some(p_element));
            self.doc.insert_before(p_element, block, reference)?;
            if let Some(b) = before {
                self.remove_items(block, b);
            }
        }

        let (Some(first), Some(last)) = (self.doc.first_element_child(block), self.doc.last_element_child(block)) else {
            self.finish();
            return Ok(());
        };
        let (sc, ec) = query::edge_child_nodes(&self.doc, first, Some(last));
        let end = if self.doc.is_text(ec) { self.doc.node_len(ec) } else { 0 };
        if lines.len() > 1 {
            self.set_range(sc, 0, ec, end);
        } else {
            self.set_caret(ec, end);
        }
        tracing::debug!(target: "verso::transform", lines = lines.len(), "block applied");
        self.push_history(false);
        self.finish();
        Ok(())
    }

    /// Remove `origin` and its emptied ancestors below `parent`. Returns the new
    /// insertion point when something was removed.
    fn remove_items(&mut self, parent: NodeId, origin: NodeId) -> Option<Option<NodeId>> {
        if parent == origin || query::is_table(&self.doc, origin) {
            return None;
        }
        if node_depth(&self.doc, parent) == node_depth(&self.doc, origin) {
            return None;
        }
        transform::remove_all_parents(&mut self.doc, &self.format, origin, None, Some(parent)).map(|e| e.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Range;
    use verso_common::EditorOptions;

    fn editor(html: &str) -> Editor {
        Editor::new(EditorOptions::default()).unwrap().with_content(html).unwrap()
    }

    fn at(ed: &Editor, path: &[usize]) -> NodeId {
        query::node_from_path(&ed.doc, path, ed.doc.root())
    }

    fn quote(ed: &mut Editor) -> NodeId {
        ed.doc.create_element("blockquote")
    }

    #[test]
    fn wraps_selected_lines() {
        let mut ed = editor("<p>a</p><p>b</p><p>c</p>");
        let (a, b) = (at(&ed, &[0, 0]), at(&ed, &[1, 0]));
        ed.set_range(a, 0, b, 1);
        let wrapper = quote(&mut ed);
        ed.apply_block(wrapper).unwrap();
        assert_eq!(ed.get_contents(), "<blockquote><p>a</p><p>b</p></blockquote><p>c</p>");
        assert_eq!(ed.get_range(), Range::new(a, 0, b, 1));
    }

    #[test]
    fn single_line_puts_the_caret_at_its_end() {
        let mut ed = editor("<p>ab</p>");
        let ab = at(&ed, &[0, 0]);
        ed.set_caret(ab, 0);
        let wrapper = quote(&mut ed);
        ed.apply_block(wrapper).unwrap();
        assert_eq!(ed.get_contents(), "<blockquote><p>ab</p></blockquote>");
        assert_eq!(ed.get_range(), Range::caret(ab, 2));
    }

    #[test]
    fn list_cells_travel_in_their_list() {
        let mut ed = editor("<ul><li>a</li><li>b</li></ul><p>c</p>");
        let (a, b) = (at(&ed, &[0, 0, 0]), at(&ed, &[0, 1, 0]));
        ed.set_range(a, 0, b, 1);
        let wrapper = quote(&mut ed);
        ed.apply_block(wrapper).unwrap();
        assert_eq!(
            ed.get_contents(),
            "<blockquote><ul><li>a</li><li>b</li></ul></blockquote><p>c</p>"
        );
    }

    #[test]
    fn remove_block_unwraps_everything() {
        let mut ed = editor("<blockquote><p>a</p><p>b</p></blockquote>");
        let block = ed.doc.first_child(ed.doc.root()).unwrap();
        let edge = ed.remove_block(block, RemoveBlockOptions::default()).unwrap();
        assert_eq!(ed.get_contents(), "<p>a</p><p>b</p>");
        assert_eq!(edge.sc, Some(at(&ed, &[0, 0])));
        assert_eq!(ed.get_range(), Range::caret(at(&ed, &[0, 0]), 0));
    }

    #[test]
    fn remove_block_keeps_unselected_lines_wrapped() {
        let mut ed = editor("<blockquote><p>a</p><p>b</p><p>c</p></blockquote>");
        let block = ed.doc.first_child(ed.doc.root()).unwrap();
        let b = ed.doc.child_at(block, 1).unwrap();
        let options = RemoveBlockOptions {
            selected: Some(vec![b]),
            skip_history: true,
            ..Default::default()
        };
        ed.remove_block(block, options).unwrap();
        assert_eq!(
            ed.doc.inner_html(ed.doc.root()),
            "<blockquote><p>a</p></blockquote><p>b</p><blockquote><p>c</p></blockquote>"
        );
    }

    #[test]
    fn list_cells_become_default_lines() {
        let mut ed = editor("<ol><li>a</li><li><br></li></ol>");
        let list = ed.doc.first_child(ed.doc.root()).unwrap();
        ed.remove_block(list, RemoveBlockOptions::default()).unwrap();
        assert_eq!(ed.doc.inner_html(ed.doc.root()), "<p>a</p><p>\u{200B}</p>");
    }

    #[test]
    fn delete_hands_back_the_cells() {
        let mut ed = editor("<ul><li>a</li><li>b</li></ul>");
        let list = ed.doc.first_child(ed.doc.root()).unwrap();
        let a = ed.doc.child_at(list, 0).unwrap();
        let options = RemoveBlockOptions {
            selected: Some(vec![a]),
            should_delete: true,
            skip_history: true,
            ..Default::default()
        };
        let edge = ed.remove_block(list, options).unwrap();
        assert_eq!(edge.removed.len(), 1);
        assert_eq!(ed.doc.inner_html(edge.removed[0]), "a");
        assert_eq!(ed.doc.inner_html(ed.doc.root()), "<ul><li>b</li></ul>");
        assert_eq!(edge.cc, Some(ed.doc.root()));
    }
}
