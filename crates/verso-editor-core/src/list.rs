//! List commands: toggling lists on lines, nesting and un-nesting list cells, and
//! the margin indent used for plain lines.

use verso_editor_dom::query::{self, is_list, is_list_cell, node_depth};
use verso_editor_dom::{Document, DomResult, NodeId};

use crate::block::{BlockEdge, RemoveBlockOptions};
use crate::editor::Editor;
use crate::error::EditorResult;
use crate::selection::Range;
use crate::transform;

/// Step used by [`Editor::indent`] and [`Editor::outdent`] on plain lines.
pub const INDENT_STEP_PX: i32 = 25;

/// Which way [`Editor::apply_nested_list`] moves the cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestDirection {
    /// Move the cells into a list under the previous cell.
    Nest,
    /// Move the cells out of their nested list, after the cell holding it.
    Lift,
}

fn same_list(doc: &Document, a: NodeId, b: NodeId) -> bool {
    is_list(doc, a) && doc.tag(a) == doc.tag(b) && query::is_same_attributes(doc, a, b)
}

/// Merge directly adjacent lists of the same kind under `parent`, recursing into cells.
fn merge_adjacent_lists(doc: &mut Document, parent: NodeId) -> DomResult<()> {
    let mut child = doc.first_child(parent);
    while let Some(current) = child {
        match doc.next_sibling(current) {
            Some(next) if same_list(doc, current, next) => {
                doc.move_children(next, current)?;
                doc.detach(next);
            }
            next => {
                if doc.is_element(current) {
                    merge_adjacent_lists(doc, current)?;
                }
                child = next;
            }
        }
    }
    Ok(())
}

/// `"ol:upper-roman"` into the tag and the optional `list-style-type`.
fn parse_list_type(list_type: &str) -> (String, Option<String>) {
    let (tag, style) = match list_type.split_once(':') {
        Some((t, s)) => (t, Some(s.trim().to_owned()).filter(|s| !s.is_empty())),
        None => (list_type, None),
    };
    let tag = match tag.trim().to_ascii_lowercase().as_str() {
        "ul" => "ul",
        _ => "ol",
    };
    (tag.to_owned(), style)
}

impl Editor {
    fn create_list(&mut self, tag: &str, style: Option<&str>) -> NodeId {
        let list = self.doc.create_element(tag);
        if let Some(style) = style {
            self.doc.set_style(list, "list-style-type", style);
        }
        list
    }

    /// Turn the selected lines into a list of `list_type` (`"ol"`, `"ul"`, optionally
    /// with `:list-style-type`). Lines already in a list of that type are taken out
    /// of it; lines in a list of another type switch type.
    pub fn apply_list(&mut self, list_type: &str) -> EditorResult<()> {
        let range = self.list_apply(list_type, None)?;
        if let Some(r) = range {
            self.set_range(r.start_container, r.start_offset, r.end_container, r.end_offset);
        }
        self.push_history(false);
        self.finish();
        Ok(())
    }

    /// [`apply_list`](Self::apply_list) on explicit cells, leaving the selection and
    /// the history to the caller. Returns the range to restore.
    pub fn list_apply(&mut self, list_type: &str, cells: Option<Vec<NodeId>>) -> EditorResult<Option<Range>> {
        let (tag, style) = parse_list_type(list_type);
        let mut range = self.get_range();
        let explicit = cells.is_some();
        let mut selected = cells.unwrap_or_else(|| self.get_lines_and_components(false));

        if selected.is_empty() {
            if explicit {
                return Ok(None);
            }
            range = self.get_range_and_add_line(range, None)?;
            selected = self.get_lines_and_components(false);
            if selected.is_empty() {
                return Ok(None);
            }
        }
        query::sort_by_depth(&self.doc, &mut selected, true);

        let doc = &self.doc;
        let format = &self.format;
        let (Some(&first), Some(&last)) = (selected.first(), selected.last()) else {
            return Ok(None);
        };
        let outer = |n: NodeId, prev: bool| {
            let sibling = |x: NodeId| {
                if prev {
                    doc.prev_element_sibling(x)
                } else {
                    doc.next_element_sibling(x)
                }
            };
            if (is_list_cell(doc, n) || format.is_component(doc, n)) && sibling(n).is_none() {
                doc.parent(n).and_then(sibling)
            } else {
                sibling(n)
            }
        };
        let top = outer(first, true);
        let bottom = outer(last, false);

        let in_list = |sel: NodeId| {
            let not_self = |c: NodeId| c != sel;
            format
                .get_block(doc, sel, Some(&not_self))
                .is_some_and(|b| is_list(doc, b))
        };
        let is_remove = selected.iter().all(|s| in_list(*s));
        let joins = |edge: Option<NodeId>, cell: NodeId| {
            edge.is_some_and(|e| doc.tag(cell) == doc.tag(e) && doc.tag(e) == Some(tag.as_str()))
        };

        let collapsed = range.is_collapsed();
        if is_remove && !joins(top, first) && !joins(bottom, last) {
            let edge = self.switch_or_remove_list(&tag, style.as_deref(), &selected)?;
            if collapsed
                && let Some(BlockEdge {
                    sc: Some(sc),
                    ec: Some(ec),
                    so,
                    eo,
                    ..
                }) = edge
            {
                return Ok(Some(Range::new(sc, so, ec, eo)));
            }
        } else {
            self.wrap_in_list(&tag, style.as_deref(), &selected, top, bottom)?;
        }
        tracing::debug!(target: "verso::transform", tag = %tag, remove = is_remove, lines = selected.len(), "list applied");
        Ok(Some(range))
    }

    /// Lines already in lists: unwrap them, or move them into a list of the new type.
    fn switch_or_remove_list(
        &mut self,
        tag: &str,
        style: Option<&str>,
        selected: &[NodeId],
    ) -> EditorResult<Option<BlockEdge>> {
        let not_component = |c: NodeId| !self.format.is_component(&self.doc, c);
        let current = self.format.get_block(&self.doc, selected[0], Some(&not_component));
        let cancel = current.is_some_and(|c| self.doc.tag(c) == Some(tag));
        let mut edge = None;

        let mut i = 0;
        while i < selected.len() {
            let Some(list) = self.doc.parent(selected[i]) else {
                i += 1;
                continue;
            };
            let mut run = vec![selected[i]];
            while let Some(&next) = selected.get(i + run.len()) {
                if self.doc.parent(next) != Some(list) {
                    break;
                }
                run.push(next);
            }
            i += run.len();

            let new_block = (!cancel).then(|| self.create_list(tag, style));
            let result = self.remove_block(
                list,
                RemoveBlockOptions {
                    selected: Some(run),
                    new_block,
                    should_delete: false,
                    skip_history: true,
                },
            )?;
            edge.get_or_insert(result);
        }
        Ok(edge)
    }

    fn wrap_in_list(
        &mut self,
        tag: &str,
        style: Option<&str>,
        selected: &[NodeId],
        top: Option<NodeId>,
        bottom: Option<NodeId>,
    ) -> EditorResult<()> {
        let lift = |doc: &Document, edge: Option<NodeId>| {
            edge.map(|e| match doc.parent(e) {
                Some(p) if !doc.is_root(p) && doc.tag(p) == Some(tag) => p,
                _ => e,
            })
        };
        let top = lift(&self.doc, top);
        let bottom = lift(&self.doc, bottom);
        let merge_top = top.is_some_and(|t| self.doc.tag(t) == Some(tag));
        let merge_bottom = bottom.is_some_and(|b| self.doc.tag(b) == Some(tag));

        let mut list = match top {
            Some(t) if merge_top => t,
            _ => self.create_list(tag, style),
        };

        for (i, &line) in selected.iter().enumerate() {
            if self.doc.child_count(line) == 0 && !self.format.is_ignore_node_change(&self.doc, line) {
                self.doc.detach(line);
                continue;
            }
            let Some(origin_parent) = self.doc.parent(line) else {
                continue;
            };
            let next = selected.get(i + 1).copied();
            let next_parent = next.and_then(|n| self.doc.parent(n));
            let is_cell = is_list_cell(&self.doc, line);
            let range_tag = self.format.is_block(&self.doc, origin_parent).then_some(origin_parent);
            let nested_cell = is_cell && !self.doc.is_root(origin_parent);
            let parent_tag = if nested_cell {
                self.doc.parent(origin_parent).unwrap_or(origin_parent)
            } else {
                origin_parent
            };
            let sibling_tag = if nested_cell {
                if next.is_none() || is_list_cell(&self.doc, parent_tag) {
                    Some(origin_parent)
                } else {
                    self.doc.next_sibling(origin_parent)
                }
            } else {
                self.doc.next_sibling(line)
            };

            let cell = self.doc.create_element("li");
            query::copy_format_attributes(&mut self.doc, cell, line);
            let is_component = self.format.is_component(&self.doc, line);
            if is_component {
                let is_hr = self.doc.tag_is(line, "hr");
                if !is_hr {
                    let br = self.doc.create_element("br");
                    self.doc.append_child(cell, br)?;
                }
                self.doc.append_child(cell, line)?;
                if is_hr {
                    let br = self.doc.create_element("br");
                    self.doc.append_child(cell, br)?;
                }
            } else {
                self.doc.move_children(line, cell)?;
            }
            self.doc.append_child(list, cell)?;

            let sibling_is_block = sibling_tag.is_some_and(|s| self.format.is_block(&self.doc, s));
            if next.is_none() || Some(parent_tag) != next_parent || sibling_is_block {
                let stays_in_origin =
                    next_parent.is_some_and(|np| is_list(&self.doc, np) && np == origin_parent);
                if (!merge_top || next.is_none() || Some(parent_tag) != next_parent)
                    && !stays_in_origin
                    && self.doc.parent(list) != Some(parent_tag)
                {
                    let reference = sibling_tag.filter(|s| self.doc.parent(*s) == Some(parent_tag));
                    self.doc.insert_before(parent_tag, list, reference)?;
                }
            }
            if !is_component {
                self.doc.detach(line);
            }

            if let Some(np) = next_parent {
                let doc = &self.doc;
                let pass = |c: NodeId| !self.format.is_component(doc, c) && !is_list(doc, c);
                let block_changes = self.format.get_block(doc, np, Some(&pass))
                    != self.format.get_block(doc, origin_parent, Some(&pass));
                let depth_changes = is_list(doc, np)
                    && is_list(doc, origin_parent)
                    && node_depth(doc, np) != node_depth(doc, origin_parent);
                if block_changes || depth_changes {
                    list = self.create_list(tag, style);
                }
            }
            if let Some(rt) = range_tag
                && self.doc.first_element_child(rt).is_none()
            {
                self.doc.detach(rt);
            }
        }

        if merge_bottom && let Some(b) = bottom {
            self.doc.move_children(b, list)?;
            self.doc.detach(b);
        }
        Ok(())
    }

    /// Take `cells` out of their lists. With `should_delete` the cells are dropped.
    /// Returns the first and last node of what is left in their place.
    pub fn remove_list(&mut self, cells: &[NodeId], should_delete: bool) -> EditorResult<Option<(NodeId, NodeId)>> {
        let mut first = None;
        let mut last = None;
        let mut i = 0;
        while i < cells.len() {
            let Some(list) = self.doc.parent(cells[i]).filter(|p| is_list(&self.doc, *p)) else {
                i += 1;
                continue;
            };
            let mut run = vec![cells[i]];
            while let Some(&next) = cells.get(i + run.len()) {
                if self.doc.parent(next) != Some(list) {
                    break;
                }
                run.push(next);
            }
            i += run.len();
            let edge = self.remove_block(
                list,
                RemoveBlockOptions {
                    selected: Some(run),
                    new_block: None,
                    should_delete,
                    skip_history: true,
                },
            )?;
            if let Some(sc) = edge.sc {
                first.get_or_insert(sc);
            }
            if edge.ec.is_some() {
                last = edge.ec;
            }
        }
        Ok(first.zip(last))
    }

    /// Nest or lift list cells. Lifting only affects cells already in a nested list.
    /// The text nodes of the cells are kept, so a range inside them stays valid.
    pub fn apply_nested_list(&mut self, cells: &[NodeId], direction: NestDirection) -> EditorResult<()> {
        match direction {
            NestDirection::Nest => self.nest_cells(cells),
            NestDirection::Lift => self.lift_cells(cells),
        }
    }

    fn nest_cells(&mut self, cells: &[NodeId]) -> EditorResult<()> {
        let (Some(&first), Some(&last)) = (cells.first(), cells.last()) else {
            return Ok(());
        };
        let Some(origin_list) = self.doc.parent(first) else {
            return Ok(());
        };
        let doc = &self.doc;
        let has_prev = doc.prev_element_sibling(first).is_some_and(|p| is_list_cell(doc, p));
        let has_next = doc.next_element_sibling(last).is_some_and(|n| is_list_cell(doc, n));
        if !has_prev && !has_next {
            return Ok(());
        }

        let mut inner = self.doc.clone_shallow(origin_list)?;
        let mut prev = None;
        let mut run_start = true;
        for (i, &cell) in cells.iter().enumerate() {
            let cell_next = self.doc.next_element_sibling(cell);
            if run_start {
                prev = self.doc.prev_element_sibling(cell);
                run_start = false;
            }
            self.doc.append_child(inner, cell)?;
            if cells.get(i + 1).is_none_or(|n| Some(*n) != cell_next) {
                self.attach_nested(origin_list, inner, prev, cell_next)?;
                inner = self.doc.clone_shallow(origin_list)?;
                run_start = true;
            }
        }
        tracing::trace!(target: "verso::transform", cells = cells.len(), "list cells nested");
        Ok(())
    }

    fn attach_nested(
        &mut self,
        origin_list: NodeId,
        inner: NodeId,
        prev: Option<NodeId>,
        next: Option<NodeId>,
    ) -> EditorResult<NodeId> {
        let mut inner = inner;
        let mut into_prev = false;
        let mut next = next;
        if let Some(p) = prev.filter(|p| self.doc.tag(*p) == self.doc.tag(inner)) {
            self.doc.move_children(inner, p)?;
            inner = p;
            into_prev = true;
        }
        if let Some(n) = next.filter(|n| self.doc.tag(*n) == self.doc.tag(inner)) {
            let after = self.doc.next_element_sibling(n);
            self.doc.move_children(n, inner)?;
            self.doc.detach(n);
            next = after;
        }
        if !into_prev {
            let (target, reference) = match prev.filter(|p| is_list_cell(&self.doc, *p)) {
                Some(cell) => (cell, None),
                None => (origin_list, next),
            };
            self.doc.insert_before(target, inner, reference)?;
            merge_adjacent_lists(&mut self.doc, target)?;
            transform::merge_nested_tags(&mut self.doc, target, |_, _| true);
        }
        Ok(inner)
    }

    fn lift_cells(&mut self, cells: &[NodeId]) -> EditorResult<()> {
        let doc = &self.doc;
        let mut nested: Vec<NodeId> = cells
            .iter()
            .copied()
            .filter(|c| {
                doc.parent(*c)
                    .and_then(|list| doc.parent(list))
                    .is_some_and(|holder| is_list_cell(doc, holder))
            })
            .collect();
        if nested.is_empty() {
            return Ok(());
        }
        // deepest first, so a cell is lifted before the cell that holds it
        nested.sort_by_key(|c| std::cmp::Reverse(node_depth(&self.doc, *c)));

        let mut i = 0;
        while i < nested.len() {
            let parent = self.doc.parent(nested[i]);
            let mut run = vec![nested[i]];
            while let Some(&next) = nested.get(i + run.len()) {
                if self.doc.parent(next) != parent {
                    break;
                }
                run.push(next);
            }
            i += run.len();
            let mut run_sorted = run.clone();
            run_sorted.sort_by_key(|c| self.doc.index_in_parent(*c));
            self.detach_nested(&run_sorted)?;
        }
        tracing::trace!(target: "verso::transform", cells = nested.len(), "list cells lifted");
        Ok(())
    }

    /// Move `cells` (siblings in one nested list) after the cell holding that list.
    /// Cells after them in the nested list are nested under the last moved cell.
    fn detach_nested(&mut self, cells: &[NodeId]) -> EditorResult<()> {
        let (Some(&first), Some(&last)) = (cells.first(), cells.last()) else {
            return Ok(());
        };
        let Some(origin_list) = self.doc.parent(first) else {
            return Ok(());
        };
        let Some(holder) = self.doc.parent(origin_list) else {
            return Ok(());
        };
        let Some(outer_list) = self.doc.parent(holder) else {
            return Ok(());
        };
        let following = self.doc.next_element_sibling(last);
        let reference = self.doc.next_sibling(holder);

        for &cell in cells {
            self.doc.insert_before(outer_list, cell, reference)?;
        }
        if let Some(following) = following
            && self.doc.parent(following) == Some(origin_list)
        {
            let rest = self.doc.clone_shallow(origin_list)?;
            let mut cursor = Some(following);
            while let Some(node) = cursor {
                cursor = self.doc.next_sibling(node);
                self.doc.append_child(rest, node)?;
            }
            self.doc.append_child(last, rest)?;
        }
        if self.doc.first_element_child(origin_list).is_none() {
            self.doc.detach(origin_list);
        }
        merge_adjacent_lists(&mut self.doc, last)?;
        Ok(())
    }

    /// Flatten nested lists around `base`.
    ///
    /// `base` and the cells after it are lifted out of every nested level, and the top
    /// list is split at `base`. Unless `all`, the cells of lists nested directly in
    /// `base` are lifted to its level too. Returns the list now holding `base`.
    pub fn remove_nested_list(&mut self, base: NodeId, all: bool) -> EditorResult<Option<NodeId>> {
        let top = self.delete_nested_list(base)?;
        let holding = match top {
            Some(top) => {
                let split = self.doc.clone_shallow(top)?;
                let mut cursor = Some(base);
                while let Some(node) = cursor {
                    cursor = self.doc.next_sibling(node);
                    self.doc.append_child(split, node)?;
                }
                self.doc.insert_after(top, split)?;
                if self.doc.first_child(top).is_none() {
                    self.doc.detach(top);
                }
                Some(split)
            }
            None => self.doc.parent(base),
        };

        if !all {
            let depth = node_depth(&self.doc, base) + 2;
            let firsts: Vec<NodeId> = query::list_children(&self.doc, base, |c| {
                is_list_cell(&self.doc, c)
                    && self.doc.prev_element_sibling(c).is_none()
                    && node_depth(&self.doc, c) == depth
            });
            for cell in firsts {
                self.delete_nested_list(cell)?;
            }
        }
        Ok(holding)
    }

    /// Lift `base` and every cell after it out of each nested level until their list is
    /// no longer inside a cell. Returns that top list, or `None` if `base` was not nested.
    pub fn delete_nested_list(&mut self, base: NodeId) -> EditorResult<Option<NodeId>> {
        let mut list = match self.doc.parent(base) {
            Some(l) => l,
            None => return Ok(None),
        };
        let mut lifted = false;
        while let Some(holder) = self.doc.parent(list).filter(|h| is_list_cell(&self.doc, *h)) {
            let Some(outer) = self.doc.parent(holder) else {
                break;
            };
            let reference = self.doc.next_sibling(holder);
            let mut cursor = Some(base);
            while let Some(node) = cursor {
                cursor = self.doc.next_sibling(node);
                self.doc.insert_before(outer, node, reference)?;
            }
            if self.doc.first_child(list).is_none() {
                self.doc.detach(list);
            }
            list = outer;
            lifted = true;
        }
        Ok(lifted.then_some(list))
    }

    /// Shift `lines` by `size` px of margin (`margin-right` when right-to-left). List
    /// cells are not shifted; the ones that can move are returned: those with a
    /// previous cell when increasing, all of them when decreasing.
    pub fn set_line_margin(&mut self, lines: &[NodeId], size: i32) -> Vec<NodeId> {
        let side = if self.options.rtl { "margin-right" } else { "margin-left" };
        let mut cells = Vec::new();
        for &line in lines {
            if is_list_cell(&self.doc, line) {
                if size < 0 || self.doc.prev_element_sibling(line).is_some() {
                    cells.push(line);
                }
                continue;
            }
            let current = self
                .doc
                .style(line, side)
                .map(|m| verso_editor_dom::numbers::get_number(&m, 0) as i32)
                .unwrap_or(0);
            let margin = current + size;
            let value = if margin > 0 { format!("{margin}px") } else { String::new() };
            self.doc.set_style(line, side, &value);
        }
        cells
    }

    pub fn indent(&mut self) -> EditorResult<()> {
        self.shift_lines(INDENT_STEP_PX)
    }

    pub fn outdent(&mut self) -> EditorResult<()> {
        self.shift_lines(-INDENT_STEP_PX)
    }

    fn shift_lines(&mut self, size: i32) -> EditorResult<()> {
        let range = self.get_range();
        let lines = self.get_lines(None);
        let cells = self.set_line_margin(&lines, size);
        if !cells.is_empty() {
            let direction = if size > 0 { NestDirection::Nest } else { NestDirection::Lift };
            self.apply_nested_list(&cells, direction)?;
        }
        self.set_range(range.start_container, range.start_offset, range.end_container, range.end_offset);
        self.push_history(false);
        self.finish();
        Ok(())
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
    fn parses_list_types() {
        assert_eq!(parse_list_type("ul"), ("ul".to_owned(), None));
        assert_eq!(
            parse_list_type("OL:upper-roman"),
            ("ol".to_owned(), Some("upper-roman".to_owned()))
        );
        assert_eq!(parse_list_type("bogus"), ("ol".to_owned(), None));
    }

    #[test]
    fn indent_nests_and_outdent_restores() {
        let original = "<ol><li>a</li><li>b</li><li>c</li></ol>";
        let mut ed = editor(original);
        let b = text_at(&ed, &[0, 1, 0]);
        let c = text_at(&ed, &[0, 2, 0]);
        ed.set_range(b, 0, c, 1);

        ed.indent().unwrap();
        assert_eq!(ed.get_contents(), "<ol><li>a<ol><li>b</li><li>c</li></ol></li></ol>");
        assert_eq!(ed.get_range(), Range::new(b, 0, c, 1));

        ed.outdent().unwrap();
        assert_eq!(ed.get_contents(), original);
    }

    #[test]
    fn indent_joins_an_existing_nested_list() {
        let mut ed = editor("<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul>");
        let c = text_at(&ed, &[0, 1, 0]);
        ed.set_caret(c, 0);
        ed.indent().unwrap();
        assert_eq!(ed.get_contents(), "<ul><li>a<ul><li>b</li><li>c</li></ul></li></ul>");
    }

    #[test]
    fn outdent_keeps_following_cells_nested() {
        let mut ed = editor("<ul><li>a<ul><li>b</li><li>c</li></ul></li></ul>");
        let b = text_at(&ed, &[0, 0, 1, 0, 0]);
        ed.set_caret(b, 0);
        ed.outdent().unwrap();
        assert_eq!(ed.get_contents(), "<ul><li>a</li><li>b<ul><li>c</li></ul></li></ul>");
    }

    #[test]
    fn outdent_leaves_top_level_cells() {
        let html = "<ul><li>a</li></ul>";
        let mut ed = editor(html);
        let a = text_at(&ed, &[0, 0, 0]);
        ed.set_caret(a, 0);
        ed.outdent().unwrap();
        assert_eq!(ed.get_contents(), html);
    }

    #[test]
    fn margin_indent_on_plain_lines() {
        let mut ed = editor("<p>a</p>");
        let a = text_at(&ed, &[0, 0]);
        ed.set_caret(a, 0);
        ed.indent().unwrap();
        ed.indent().unwrap();
        assert_eq!(ed.get_contents(), r#"<p style="margin-left: 50px;">a</p>"#);
        ed.outdent().unwrap();
        ed.outdent().unwrap();
        assert_eq!(ed.get_contents(), "<p>a</p>");
    }

    #[test]
    fn rtl_uses_the_right_margin() {
        let options = EditorOptions {
            rtl: true,
            ..Default::default()
        };
        let mut ed = Editor::new(options).unwrap().with_content("<p>a</p>").unwrap();
        let a = text_at(&ed, &[0, 0]);
        ed.set_caret(a, 0);
        ed.indent().unwrap();
        assert_eq!(ed.get_contents(), r#"<p style="margin-right: 25px;">a</p>"#);
    }

    #[test]
    fn apply_list_wraps_lines() {
        let mut ed = editor("<p>a</p><p>b</p><p>c</p>");
        let a = text_at(&ed, &[0, 0]);
        let b = text_at(&ed, &[1, 0]);
        ed.set_range(a, 0, b, 1);
        ed.apply_list("ul").unwrap();
        assert_eq!(ed.get_contents(), "<ul><li>a</li><li>b</li></ul><p>c</p>");
        assert_eq!(ed.get_range(), Range::new(a, 0, b, 1));
    }

    #[test]
    fn apply_list_joins_the_list_above() {
        let mut ed = editor("<ol><li>a</li></ol><p>b</p>");
        let b = text_at(&ed, &[1, 0]);
        ed.set_caret(b, 1);
        ed.apply_list("ol").unwrap();
        assert_eq!(ed.get_contents(), "<ol><li>a</li><li>b</li></ol>");
    }

    #[test]
    fn apply_list_again_removes_it() {
        let mut ed = editor("<ul><li>a</li><li>b</li></ul>");
        let a = text_at(&ed, &[0, 0, 0]);
        let b = text_at(&ed, &[0, 1, 0]);
        ed.set_range(a, 0, b, 1);
        ed.apply_list("ul").unwrap();
        assert_eq!(ed.get_contents(), "<p>a</p><p>b</p>");
    }

    #[test]
    fn apply_list_with_style() {
        let mut ed = editor("<p>a</p>");
        let a = text_at(&ed, &[0, 0]);
        ed.set_caret(a, 0);
        ed.apply_list("ol:upper-roman").unwrap();
        assert_eq!(
            ed.get_contents(),
            r#"<ol style="list-style-type: upper-roman;"><li>a</li></ol>"#
        );
    }

    #[test]
    fn switching_list_type() {
        let mut ed = editor("<ul><li>a</li><li>b</li></ul>");
        let a = text_at(&ed, &[0, 0, 0]);
        let b = text_at(&ed, &[0, 1, 0]);
        ed.set_range(a, 0, b, 1);
        ed.apply_list("ol").unwrap();
        assert_eq!(ed.get_contents(), "<ol><li>a</li><li>b</li></ol>");
    }

    #[test]
    fn delete_nested_list_lifts_to_the_top() {
        let mut ed = editor("<ul><li>a<ul><li>b<ul><li>c</li></ul></li></ul></li></ul>");
        let c_cell = query::node_from_path(&ed.doc, &[0, 0, 1, 0, 1, 0], ed.doc.root());
        let top = ed.delete_nested_list(c_cell).unwrap();
        assert_eq!(top, ed.doc.first_child(ed.doc.root()));
        assert_eq!(ed.doc.inner_html(ed.doc.root()), "<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul>");
    }
}
