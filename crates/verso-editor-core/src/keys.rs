//! Keyboard handling.
//!
//! [`Editor::key_down`] runs before the host's default action and either handles the
//! key itself or lets the default through. [`Editor::key_up`] repairs what the
//! default action left behind, and [`Editor::input`] accounts for typed text.
//!
//! Each key branch checks the structural special cases first (components, closure
//! blocks, free-format lines, nested lists) and only then falls back to splitting
//! or joining lines. A branch that fails part way rebuilds a default line around
//! the caret instead of surfacing the error.

use smol_str::SmolStr;
use verso_common::{CharCounterType, RetainStyleMode};
use verso_editor_dom::query::{
    self, Edge, is_break, is_list, is_list_cell, is_table, is_table_cell, node_depth, parent_element,
};
use verso_editor_dom::unicode::{is_zero_width, strip_zero_width};
use verso_editor_dom::{DomError, NBSP, NodeId, ZERO_WIDTH_SPACE, ZERO_WIDTH_STR};

use crate::block::RemoveBlockOptions;
use crate::component::ComponentInfo;
use crate::editor::{Editor, StyleShell};
use crate::error::EditorResult;
use crate::events::EditorEvent;
use crate::html::{Inserted, RemoveResult};
use crate::list::NestDirection;
use crate::menu::ActiveMenu;
use crate::selection::Range;
use crate::transform;

/// Key codes the handlers branch on.
pub mod code {
    pub const BACKSPACE: u32 = 8;
    pub const TAB: u32 = 9;
    pub const ENTER: u32 = 13;
    pub const SPACE: u32 = 32;
    pub const LEFT: u32 = 37;
    pub const UP: u32 = 38;
    pub const RIGHT: u32 = 39;
    pub const DOWN: u32 = 40;
    pub const DELETE: u32 = 46;
}

fn is_direction(key_code: u32) -> bool {
    (code::LEFT..=code::DOWN).contains(&key_code)
}

fn is_delete(key_code: u32) -> bool {
    matches!(key_code, code::BACKSPACE | code::DELETE)
}

/// Keys that never produce text.
fn is_non_text(key_code: u32) -> bool {
    matches!(
        key_code,
        8 | 9 | 13 | 16..=20 | 27 | 33..=40 | 45 | 46 | 112..=123 | 144 | 145 | 229
    )
}

/// Keys whose keyup does not record a history step.
fn is_history_ignored(key_code: u32) -> bool {
    matches!(
        key_code,
        16..=20 | 27 | 33..=40 | 45 | 112..=123 | 144 | 145 | 229
    )
}

fn is_heading_or_rule(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "hr")
}

/// A physical key event as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyEvent {
    pub key_code: u32,
    /// The character produced by a text key, the key name otherwise.
    pub key: SmolStr,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyEvent {
    pub fn new(key_code: u32) -> Self {
        let key = match key_code {
            code::BACKSPACE => "Backspace",
            code::TAB => "Tab",
            code::ENTER => "Enter",
            code::SPACE => " ",
            code::LEFT => "ArrowLeft",
            code::UP => "ArrowUp",
            code::RIGHT => "ArrowRight",
            code::DOWN => "ArrowDown",
            code::DELETE => "Delete",
            _ => "",
        };
        Self {
            key_code,
            key: SmolStr::new_static(key),
            ..Default::default()
        }
    }

    /// The key typing `ch`.
    pub fn character(ch: char) -> Self {
        let key_code = match ch {
            ' ' => code::SPACE,
            c if c.is_ascii_alphanumeric() => c.to_ascii_uppercase() as u32,
            _ => 0,
        };
        Self {
            key_code,
            key: SmolStr::new(ch.to_string()),
            ..Default::default()
        }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    /// Ctrl, or the command key on its own.
    pub fn is_ctrl(&self) -> bool {
        self.ctrl || self.meta || matches!(self.key_code, 91 | 92 | 224)
    }

    pub fn is_text_key(&self) -> bool {
        !self.is_ctrl() && !self.alt && !is_non_text(self.key_code)
    }
}

/// What [`Editor::key_down`] did with a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not handled. The host's default action should run.
    PassThrough,
    /// Handled by the editor. The default action must be suppressed.
    Handled,
    /// Refused. The default action must be suppressed and nothing changed.
    Blocked,
}

/// Selection state captured when a key goes down.
#[derive(Debug, Clone, Copy)]
struct KeyContext {
    range: Range,
    /// The range is not a caret.
    extended: bool,
    node: NodeId,
    /// The line around `node`, or `node` itself when it is in no line.
    line: NodeId,
    block: Option<NodeId>,
}

/// End offset of a caret placed after `node`.
fn end_offset(doc: &verso_editor_dom::Document, node: NodeId) -> usize {
    if doc.is_text(node) { doc.node_len(node) } else { 0 }
}

impl Editor {
    fn key_context(&mut self) -> KeyContext {
        let node = self.get_node();
        let range = self.get_range();
        let line = self.format.get_line(&self.doc, node, None).unwrap_or(node);
        let block = self.format.get_block(&self.doc, line, None);
        KeyContext {
            range,
            extended: !range.is_collapsed(),
            node,
            line,
            block,
        }
    }

    /// Handle a key before the host's default action.
    pub fn key_down(&mut self, event: &KeyEvent) -> KeyOutcome {
        if matches!(self.menu.active(), ActiveMenu::Dropdown(_)) {
            return KeyOutcome::PassThrough;
        }
        if self.options.read_only {
            let navigation = event.is_ctrl() || is_direction(event.key_code);
            tracing::trace!(target: "verso::keys", key = event.key_code, navigation, "read-only keydown");
            return if navigation {
                KeyOutcome::PassThrough
            } else {
                KeyOutcome::Blocked
            };
        }
        self.menu.close();
        if self.events.emit(&EditorEvent::KeyDown(event.clone())).is_cancel() {
            return KeyOutcome::Blocked;
        }

        let outcome = match self.dispatch_key_down(event) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    target: "verso::keys",
                    key = event.key_code,
                    error = %err,
                    "key handler failed, rebuilding the default line"
                );
                self.set_default_line(None);
                KeyOutcome::Handled
            }
        };
        self.finish();
        tracing::trace!(target: "verso::keys", key = event.key_code, ?outcome, "keydown");
        outcome
    }

    fn dispatch_key_down(&mut self, event: &KeyEvent) -> EditorResult<KeyOutcome> {
        let key_code = event.key_code;
        if key_code == code::ENTER {
            let start = self.get_range().start_container;
            if self.format.is_line(&self.doc, start) {
                self.reset_range_to_text_node();
            }
        }
        let ctx = self.key_context();
        let handled = match key_code {
            code::BACKSPACE => self.backspace(&ctx)?,
            code::DELETE => self.delete_forward(&ctx)?,
            code::TAB => self.tab(event, &ctx)?,
            code::ENTER => self.enter(event, &ctx)?,
            _ => None,
        };
        if let Some(outcome) = handled {
            return Ok(outcome);
        }

        if event.shift && (event.is_ctrl() || event.alt) && key_code == code::SPACE {
            let nbsp = self.doc.create_text(NBSP.to_string());
            if let Some(inserted) = self.insert_node_at(nbsp, None, true)? {
                self.caret_after(inserted);
                self.push_history(true);
                return Ok(KeyOutcome::Handled);
            }
        }

        let range = self.get_range();
        if event.is_text_key()
            && range.is_collapsed()
            && is_break(&self.doc, range.common_ancestor(&self.doc))
        {
            let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
            if let Some(inserted) = self.insert_node_at(sentinel, None, true)? {
                self.caret_after(inserted);
            }
            return Ok(KeyOutcome::PassThrough);
        }

        if is_direction(key_code)
            && let Some(info) = self.component_beside(key_code, &ctx)
        {
            if !self.select_component(info.target) {
                self.blur();
            }
            return Ok(KeyOutcome::Handled);
        }
        Ok(KeyOutcome::PassThrough)
    }

    fn caret_after(&mut self, inserted: Inserted) {
        match inserted {
            Inserted::Text {
                container,
                end_offset,
                ..
            } => self.set_caret(container, end_offset),
            Inserted::Node(node) => {
                let offset = end_offset(&self.doc, node);
                self.set_caret(node, offset)
            }
        };
    }

    /// The component `node` is, or the one a media element belongs to.
    fn component_at(&self, node: NodeId) -> Option<ComponentInfo> {
        let doc = &self.doc;
        if self.format.is_component(doc, node) || query::is_media(doc, node) {
            self.format.component(doc, node)
        } else {
            None
        }
    }

    /// The component an arrow key would step onto.
    fn component_beside(&self, key_code: u32, ctx: &KeyContext) -> Option<ComponentInfo> {
        let doc = &self.doc;
        let (node, line) = (ctx.node, ctx.line);
        let candidate = match key_code {
            code::UP => doc.prev_element_sibling(line),
            code::DOWN => doc.next_element_sibling(line),
            code::LEFT if query::is_edge_point(doc, node, ctx.range.start_offset, Some(Edge::Front)) => doc
                .prev_element_sibling(node)
                .or_else(|| query::previous_deepest_node(doc, node, None))
                .or_else(|| doc.prev_element_sibling(line)),
            code::RIGHT if query::is_edge_point(doc, node, ctx.range.end_offset, Some(Edge::End)) => doc
                .next_element_sibling(node)
                .or_else(|| query::next_deepest_node(doc, node, None))
                .or_else(|| doc.next_element_sibling(line)),
            _ => None,
        }?;
        self.component_at(candidate)
    }

    /// Nothing but whitespace, sentinels and breaks.
    fn is_blank_line(&self, line: NodeId) -> bool {
        let doc = &self.doc;
        is_zero_width(doc.text_content(line).trim())
            && !doc
                .descendants(line)
                .into_iter()
                .any(|n| self.format.not_text_node(doc, n) && !is_break(doc, n))
    }

    /// The table cell holding `node` with no line in between.
    fn bare_cell(&self, node: NodeId) -> Option<NodeId> {
        let doc = &self.doc;
        let cell = self.format.get_block(doc, node, None).filter(|b| is_table_cell(doc, *b))?;
        let mut cur = Some(node);
        while let Some(n) = cur
            && n != cell
        {
            if self.format.is_line(doc, n) {
                return None;
            }
            cur = doc.parent(n);
        }
        Some(cell)
    }

    /// Is the caret at the front (or end) of the bare cell around it.
    fn at_bare_cell_edge(&self, range: &Range, edge: Edge) -> bool {
        let (node, offset) = match edge {
            Edge::Front => (range.start_container, range.start_offset),
            Edge::End => (range.end_container, range.end_offset),
        };
        let Some(cell) = self.bare_cell(node) else {
            return false;
        };
        if self.is_blank_line(cell) {
            return true;
        }
        if node == cell {
            return match edge {
                Edge::Front => offset == 0,
                Edge::End => offset >= self.doc.child_count(cell),
            };
        }
        self.format.is_edge_line(&self.doc, node, offset, Some(edge))
    }

    fn copy_line_attributes(&mut self, to: NodeId, from: NodeId) {
        let reset: Vec<&str> = self.options.line_attr_reset.iter().map(String::as_str).collect();
        query::copy_tag_attributes(&mut self.doc, to, from, &reset);
    }

    /// Join two text nodes meeting at a line join and return the join point.
    fn join_text_at(&mut self, before: Option<NodeId>, after: NodeId) -> (NodeId, usize) {
        let doc = &mut self.doc;
        if let Some(before) = before
            && doc.next_sibling(before) == Some(after)
            && let (Some(a), Some(b)) = (doc.text(before), doc.text(after))
        {
            let offset = doc.node_len(before);
            let joined = format!("{a}{b}");
            doc.set_text(before, joined);
            doc.detach(after);
            return (before, offset);
        }
        let (first, _) = query::edge_child_nodes(doc, after, None);
        (first, 0)
    }

    /// Move the content of `line` to the end of the previous line and drop `line`.
    /// An empty previous line is dropped instead. Returns the join point.
    pub(crate) fn line_delete_prev(&mut self, line: NodeId) -> EditorResult<(NodeId, usize)> {
        let first = self.doc.first_child(line).unwrap_or(line);
        let Some(prev) = self.doc.prev_element_sibling(line) else {
            return Ok((first, 0));
        };
        if self.is_blank_line(prev) {
            self.doc.detach(prev);
            return Ok((first, 0));
        }
        let joined = if !self.is_blank_line(line) {
            let before = self.doc.last_child(prev);
            self.doc.move_children(line, prev)?;
            self.join_text_at(before, first)
        } else {
            let (_, last) = query::edge_child_nodes(&self.doc, prev, None);
            (last, end_offset(&self.doc, last))
        };
        self.doc.detach(line);
        tracing::debug!(target: "verso::keys", "line joined with the previous one");
        Ok(joined)
    }

    /// Move the content of the next line to the end of `line` and drop it. An empty
    /// next line is dropped alone. Returns the join point.
    pub(crate) fn line_delete_next(&mut self, line: NodeId) -> EditorResult<(NodeId, usize)> {
        let last = self.doc.last_child(line);
        let end = match last {
            Some(l) => (l, end_offset(&self.doc, l)),
            None => (line, 0),
        };
        let Some(next) = self.doc.next_element_sibling(line) else {
            return Ok(end);
        };
        if self.is_blank_line(next) {
            self.doc.detach(next);
            return Ok(end);
        }
        let mut before = last;
        if let Some(l) = last
            && is_break(&self.doc, l)
            && self.doc.child_count(line) == 1
        {
            self.doc.detach(l);
            before = None;
        }
        let first = self.doc.first_child(next);
        self.doc.move_children(next, line)?;
        self.doc.detach(next);
        tracing::debug!(target: "verso::keys", "next line joined");
        Ok(match first {
            Some(first) => self.join_text_at(before, first),
            None => end,
        })
    }

    /// The line an extended range starts in, when it shares a parent with `line`
    /// and only siblings (lines or components) lie between them.
    fn sibling_start_line(&self, range: &Range, line: NodeId) -> Option<NodeId> {
        let doc = &self.doc;
        self.format
            .get_line(doc, range.start_container, None)
            .filter(|s| *s != line && self.format.is_line(doc, *s) && doc.parent(*s) == doc.parent(line))
    }

    /// Remove the selection, then join the lines it spanned.
    fn remove_and_join(&mut self, line: NodeId, range: Range) -> EditorResult<()> {
        let removed = self.remove()?;
        if removed.common == removed.container || self.doc.parent(line).is_none() {
            return Ok(());
        }
        let (focus, offset) = if self.doc.contains(line, range.start_container) {
            self.line_delete_next(line)?
        } else {
            self.line_delete_prev(line)?
        };
        self.set_caret(focus, offset);
        Ok(())
    }

    /// Remove a selected component and put the caret beside where it was.
    fn delete_component(&mut self, info: &ComponentInfo, toward: Edge) {
        let container = info.container;
        let prev = self.doc.prev_element_sibling(container);
        let next = self.doc.next_element_sibling(container);
        self.doc.detach(container);
        self.deselect_component();
        tracing::debug!(target: "verso::keys", plugin = %info.plugin_name, "selected component deleted");
        match (toward, prev, next) {
            (Edge::Front, Some(p), _) | (Edge::End, Some(p), None) => {
                self.caret_at_end(p);
            }
            (_, _, Some(n)) => {
                let (first, _) = query::edge_child_nodes(&self.doc, n, None);
                self.set_caret(first, 0);
            }
            _ => self.set_default_line(None),
        }
        self.push_history(false);
    }

    /// Remember the inline wrappers around `node` inside its line, outermost first.
    fn cache_style_nodes(&mut self, node: NodeId) {
        let doc = &self.doc;
        let line = self.format.get_line(doc, node, None);
        let mut shells: Vec<StyleShell> = query::parent_elements(
            doc,
            node,
            |n| self.format.is_text_style_node(doc, n) && line.is_some_and(|l| l != n && doc.contains(l, n)),
            None,
        )
        .into_iter()
        .filter_map(|n| {
            Some(StyleShell {
                tag: SmolStr::new(doc.tag(n)?),
                attrs: doc.attrs(n).to_vec(),
            })
        })
        .collect();
        shells.reverse();
        self.status.retain_style = shells;
    }

    /// A table or component cut by an extended range is removed whole.
    ///
    /// Returns true when the key is fully handled.
    fn hard_delete(&mut self) -> bool {
        let range = self.get_range();
        let doc = &self.doc;
        let (sc, ec) = (range.start_container, range.end_container);
        let s_cell = self.format.get_block(doc, sc, None);
        let e_cell = self.format.get_block(doc, ec, None);
        let s_is_cell = s_cell.is_some_and(|c| is_table_cell(doc, c));
        let e_is_cell = e_cell.is_some_and(|c| is_table_cell(doc, c));
        let ancestor = range.common_ancestor(doc);
        let first_cell = |c: NodeId| {
            doc.prev_element_sibling(c).is_none()
                && doc.parent(c).is_none_or(|row| doc.prev_element_sibling(row).is_none())
        };
        let last_cell = |c: NodeId| {
            doc.next_element_sibling(c).is_none()
                && doc.parent(c).is_none_or(|row| doc.next_element_sibling(row).is_none())
        };
        let below_ancestor =
            |c: NodeId| parent_element(doc, c, |n| doc.parent(n) == Some(ancestor), None);

        if ((s_is_cell && s_cell.is_some_and(first_cell)) || (e_is_cell && e_cell.is_some_and(last_cell)))
            && s_cell != e_cell
        {
            let target = if !s_is_cell {
                e_cell.and_then(below_ancestor)
            } else {
                s_cell.and_then(below_ancestor)
            };
            let done = s_is_cell && e_is_cell;
            if let Some(target) = target {
                self.doc.detach(target);
                tracing::debug!(target: "verso::keys", "table removed by a range crossing its edge");
            }
            if done {
                return true;
            }
        }

        let doc = &self.doc;
        let component = |n: NodeId| {
            doc.is_element(n)
                .then(|| parent_element(doc, n, |c| doc.has_class(c, "se-component"), None))
                .flatten()
        };
        let (s_comp, e_comp) = (component(sc), component(ec));
        if let Some(comp) = s_comp {
            self.doc.detach(comp);
        }
        if let Some(comp) = e_comp.filter(|c| Some(*c) != s_comp) {
            self.doc.detach(comp);
        }
        false
    }

    /// The sibling an uneditable check looks at. At the edge of a line this is the
    /// nearest child of the neighbouring line, unless that line is a component.
    fn uneditable_sibling(&self, node: Option<NodeId>, front: bool, container: NodeId) -> Option<NodeId> {
        let doc = &self.doc;
        let node = node?;
        let sibling = if front {
            doc.prev_sibling(node)
        } else {
            doc.next_sibling(node)
        };
        if sibling.is_some() {
            return sibling;
        }
        let line = self.format.get_line(doc, container, None)?;
        let beside = if front {
            doc.prev_sibling(line)
        } else {
            doc.next_sibling(line)
        }?;
        if self.format.is_component(doc, beside) {
            return None;
        }
        if front {
            doc.first_child(beside)
        } else {
            doc.last_child(beside)
        }
    }

    /// Is a `contenteditable="false"` element right behind (or ahead of) the caret.
    fn is_uneditable_node(&self, range: &Range, front: bool) -> bool {
        let doc = &self.doc;
        let (container, offset) = if front {
            (range.start_container, range.start_offset)
        } else {
            (range.end_container, range.end_offset)
        };
        let non_editable = |n: Option<NodeId>| n.is_some_and(|n| doc.is_element(n) && query::is_non_editable(doc, n));
        if doc.is_element(container) {
            non_editable(self.uneditable_sibling(doc.child_at(container, offset), front, container))
        } else {
            let edge = if front { Edge::Front } else { Edge::End };
            query::is_edge_point(doc, container, offset, Some(edge))
                && non_editable(self.uneditable_sibling(Some(container), front, container))
        }
    }

    fn backspace(&mut self, ctx: &KeyContext) -> EditorResult<Option<KeyOutcome>> {
        if let Some(info) = self.selected_component().cloned() {
            self.delete_component(&info, Edge::Front);
            return Ok(Some(KeyOutcome::Handled));
        }
        self.deselect_component();
        self.cache_style_nodes(ctx.node);
        if ctx.extended && self.hard_delete() {
            return Ok(Some(KeyOutcome::Handled));
        }
        let ctx = self.key_context();
        let KeyContext {
            range, node, line, ..
        } = ctx;
        let root = self.doc.root();

        if !ctx.extended && self.at_bare_cell_edge(&range, Edge::Front) {
            tracing::trace!(target: "verso::keys", "backspace at the start of a table cell");
            return Ok(Some(KeyOutcome::Blocked));
        }

        if !self.format.is_line(&self.doc, line)
            && self.doc.first_element_child(root).is_none()
            && !self.format.is_component(&self.doc, node)
        {
            self.set_default_line(None);
            return Ok(Some(KeyOutcome::Handled));
        }

        let doc = &self.doc;
        if self.format.is_line(doc, line)
            && (ctx.extended
                || query::is_edge_point(doc, range.end_container, range.end_offset, Some(Edge::Front)))
            && doc.prev_sibling(range.end_container).is_none()
            && (doc
                .prev_element_sibling(line)
                .is_some_and(|p| self.format.is_line(doc, p))
                || (ctx.extended && self.sibling_start_line(&range, line).is_some()))
        {
            if ctx.extended {
                self.remove_and_join(line, range)?;
            } else {
                let (focus, offset) = self.line_delete_prev(line)?;
                self.set_caret(focus, offset);
            }
            self.push_history(true);
            return Ok(Some(KeyOutcome::Handled));
        }

        if !ctx.extended
            && doc.prev_element_sibling(line).is_none()
            && range.start_offset == 0
            && doc.prev_sibling(node).is_none()
            && !is_list_cell(doc, line)
            && self.format.is_line(doc, line)
            && (!self.format.is_br_line(doc, line) || self.format.is_closure_br_line(doc, line))
        {
            let parent = doc.parent(line);
            if parent.is_some_and(|p| self.format.is_closure_block(doc, p)) {
                tracing::trace!(target: "verso::keys", "backspace at the start of a closure block");
                return Ok(Some(KeyOutcome::Blocked));
            }
            if parent.is_some_and(|p| doc.is_root(p))
                && doc.child_count(line) <= 1
                && (doc.first_child(line).is_none() || query::is_zero_width_node(doc, line))
            {
                self.reset_to_default_line(line)?;
                return Ok(Some(KeyOutcome::Handled));
            }
        }

        // a sentinel opening the first line goes away with its empty wrappers
        let sc = range.start_container;
        if doc.prev_element_sibling(line).is_none()
            && range.start_offset == 0
            && doc.contains(line, sc)
            && doc.text(sc).is_some_and(is_zero_width)
        {
            let mut con = Some(sc);
            while let Some(c) = con
                && doc.contains(line, c)
                && doc.prev_sibling(c).is_none()
            {
                con = doc.parent(c);
            }
            if con.is_none_or(|c| !doc.contains(line, c)) {
                self.doc.set_text(sc, "");
                transform::remove_all_parents(&mut self.doc, &self.format, sc, None, Some(line));
                let focus = match self.doc.first_child(line) {
                    Some(first) => first,
                    None => {
                        let br = self.doc.create_element("br");
                        self.doc.append_child(line, br)?;
                        br
                    }
                };
                self.set_caret(focus, 0);
                return Ok(Some(KeyOutcome::Handled));
            }
        }

        let doc = &self.doc;
        if !ctx.extended && (range.start_offset == 0 || node == line) {
            let sel = if node == line {
                self.uneditable_sibling(doc.child_at(sc, range.start_offset), true, sc)
            } else if query::is_edge_point(doc, sc, range.start_offset, None) {
                query::previous_deepest_node(doc, sc, None)
            } else {
                None
            };
            if let Some(info) = sel.and_then(|s| self.component_at(s)) {
                if !self.select_component(info.target) {
                    self.blur();
                }
                return Ok(Some(KeyOutcome::Handled));
            }
        }

        if self.is_uneditable_node(&range, true) {
            return Ok(Some(KeyOutcome::Blocked));
        }

        let doc = &self.doc;
        if !ctx.extended
            && self.format.is_edge_line(doc, sc, range.start_offset, Some(Edge::Front))
            && let Some(prev) = doc.prev_element_sibling(line)
            && self.format.is_line(doc, prev)
        {
            self.status.format_attrs_temp = Some(doc.attrs(prev).to_vec());
        }

        let doc = &self.doc;
        let (ec, common) = (range.end_container, range.common_ancestor(doc));
        let start_line = self.format.get_line(doc, sc, None);
        let end_line = self.format.get_line(doc, ec, None);
        if let Some(cell) = start_line
            && let Some(block) = self.format.get_block(doc, cell, None)
            && !is_table_cell(doc, block)
            && !doc.tag_is(block, "figcaption")
        {
            let in_nested = is_list_cell(doc, cell)
                && is_list(doc, block)
                && (doc.parent(block).is_some_and(|p| is_list_cell(doc, p))
                    || doc.prev_element_sibling(cell).is_some())
                && (node == cell
                    || (doc.is_text(node)
                        && doc.prev_sibling(node).is_none_or(|p| is_list(doc, p))))
                && if start_line != end_line {
                    doc.contains(block, sc)
                } else {
                    range.start_offset == 0 && range.is_collapsed()
                };
            if in_nested {
                if sc != ec {
                    self.remove()?;
                    if self.doc.is_text(sc) && self.doc.is_attached(sc) {
                        let len = self.doc.node_len(sc);
                        self.set_caret(sc, len);
                    }
                    self.push_history(true);
                    return Ok(Some(KeyOutcome::Handled));
                }
                if self.join_previous_cell(cell, block)? {
                    self.push_history(true);
                    return Ok(Some(KeyOutcome::Handled));
                }
                return Ok(None);
            }

            if !ctx.extended && range.start_offset == 0 {
                let mut detach = true;
                let mut comm = Some(common);
                while let Some(c) = comm
                    && c != block
                    && !doc.is_root(c)
                {
                    if let Some(p) = doc.prev_sibling(c)
                        && (doc.is_element(p) || !is_zero_width(doc.text_content(p).trim()))
                    {
                        detach = false;
                        break;
                    }
                    comm = doc.parent(c);
                }
                if detach && doc.parent(block).is_some() {
                    let selected = is_list_cell(doc, cell).then(|| vec![cell]);
                    tracing::debug!(target: "verso::keys", "backspace at a block start takes the line out");
                    self.remove_block(
                        block,
                        RemoveBlockOptions {
                            selected,
                            ..Default::default()
                        },
                    )?;
                    self.push_history(true);
                    return Ok(Some(KeyOutcome::Handled));
                }
            }
        }

        let doc = &self.doc;
        if !ctx.extended && (range.start_offset == 0 || (node == line && doc.child_at(line, range.start_offset).is_some())) {
            let sel = if node == line {
                doc.child_at(line, range.start_offset)
            } else {
                Some(node)
            };
            let prev = doc.prev_sibling(line);
            let ignore_sentinel = (doc.is_text(common) || is_break(doc, common))
                && doc.prev_sibling(common).is_none()
                && range.start_offset == 0;
            let is_comp = |n: Option<NodeId>| n.is_some_and(|n| self.format.is_component(doc, n));
            if let Some(sel) = sel
                && doc.prev_sibling(sel).is_none()
                && (is_comp(doc.prev_sibling(common)) || (ignore_sentinel && is_comp(prev)))
            {
                match prev.and_then(|p| self.format.component(doc, p)) {
                    Some(info) => {
                        if doc.text_content(line).is_empty() {
                            self.doc.detach(line);
                            self.set_caret(info.container, 0);
                        }
                        if !self.select_component(info.target) {
                            self.blur();
                        }
                    }
                    None => {
                        if let Some(p) = prev.filter(|p| self.format.is_component(doc, *p)) {
                            self.doc.detach(p);
                        }
                    }
                }
                return Ok(Some(KeyOutcome::Handled));
            }
            if let Some(sel) = sel
                && let Some(p) = doc.prev_sibling(sel)
                && query::is_non_editable(doc, p)
            {
                self.doc.detach(p);
                return Ok(Some(KeyOutcome::Handled));
            }
        }
        Ok(None)
    }

    /// The only line of the root emptied: back to a bare default line.
    fn reset_to_default_line(&mut self, line: NodeId) -> EditorResult<()> {
        let line = if self.doc.tag(line) == Some(self.options.default_line.as_str()) {
            self.doc.set_inner_html(line, "<br>")?;
            let names: Vec<SmolStr> = self.doc.attrs(line).iter().map(|(k, _)| k.clone()).collect();
            for name in names {
                self.doc.remove_attr(line, &name);
            }
            line
        } else {
            let fresh = self.create_line(None);
            self.doc.replace_with(line, fresh)?;
            fresh
        };
        let br = self.doc.first_child(line).unwrap_or(line);
        self.set_caret(br, 0);
        Ok(())
    }

    /// Backspace at the start of a cell with a previous cell (or in a nested list):
    /// append its content to the deepest previous cell.
    fn join_previous_cell(&mut self, cell: NodeId, list: NodeId) -> EditorResult<bool> {
        let doc = &self.doc;
        let Some(holder) = doc.parent(list) else {
            return Ok(false);
        };
        let mut prev = doc.prev_element_sibling(cell).unwrap_or(holder);
        if !is_list_cell(doc, prev) {
            return Ok(false);
        }
        if !doc.contains(prev, cell) {
            while let Some(nested) = doc.last_element_child(prev)
                && is_list(doc, nested)
                && let Some(last) = doc.last_element_child(nested)
            {
                prev = last;
            }
        }
        let con = if prev == holder {
            doc.prev_sibling(list)
        } else {
            doc.last_child(prev)
        };
        let con = match con {
            Some(c) => c,
            None => {
                let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
                let reference = if prev == holder {
                    self.doc.first_child(holder)
                } else {
                    None
                };
                self.doc.insert_before(prev, sentinel, reference)?;
                sentinel
            }
        };
        let (_, focus) = query::edge_child_nodes(&self.doc, con, None);
        let offset = end_offset(&self.doc, focus);

        let mut after = con;
        for child in self.doc.child_nodes(cell) {
            self.doc.insert_after(after, child)?;
            after = child;
        }
        self.doc.detach(cell);
        if self.doc.element_children(list).is_empty() {
            self.doc.detach(list);
        }
        self.set_caret(focus, offset);
        tracing::debug!(target: "verso::keys", "list cell joined with the previous cell");
        Ok(true)
    }

    fn delete_forward(&mut self, ctx: &KeyContext) -> EditorResult<Option<KeyOutcome>> {
        if let Some(info) = self.selected_component().cloned() {
            self.delete_component(&info, Edge::End);
            return Ok(Some(KeyOutcome::Handled));
        }
        self.deselect_component();
        self.cache_style_nodes(ctx.node);
        if ctx.extended && self.hard_delete() {
            return Ok(Some(KeyOutcome::Handled));
        }
        let ctx = self.key_context();
        let KeyContext {
            range, node, line, ..
        } = ctx;
        let (sc, ec) = (range.start_container, range.end_container);

        if !ctx.extended && self.at_bare_cell_edge(&range, Edge::End) {
            tracing::trace!(target: "verso::keys", "delete at the end of a table cell");
            return Ok(Some(KeyOutcome::Blocked));
        }

        let doc = &self.doc;
        if !ctx.extended
            && self.format.is_edge_line(doc, ec, range.end_offset, Some(Edge::End))
            && doc.next_sibling(line).is_none()
        {
            tracing::trace!(target: "verso::keys", "delete at the end of the last line");
            return Ok(Some(KeyOutcome::Blocked));
        }

        if self.format.is_line(doc, line)
            && (ctx.extended || query::is_edge_point(doc, sc, range.end_offset, Some(Edge::End)))
            && doc.next_sibling(sc).is_none()
            && (doc
                .next_element_sibling(line)
                .is_some_and(|n| self.format.is_line(doc, n))
                || (ctx.extended && self.sibling_start_line(&range, line).is_some()))
        {
            if ctx.extended {
                self.remove_and_join(line, range)?;
            } else {
                let (focus, offset) = self.line_delete_next(line)?;
                self.set_caret(focus, offset);
            }
            self.push_history(true);
            return Ok(Some(KeyOutcome::Handled));
        }

        if !ctx.extended && (range.end_offset == doc.text_content(ec).chars().count() || node == line) {
            let sel = if node == line {
                self.uneditable_sibling(doc.child_at(ec, range.end_offset), false, ec)
            } else if query::is_edge_point(doc, ec, range.end_offset, None) {
                query::next_deepest_node(doc, ec, None)
            } else {
                None
            };
            if let Some(info) = sel.and_then(|s| self.component_at(s)) {
                if query::is_zero_width_node(doc, line) {
                    self.doc.detach(line);
                    self.set_caret(info.container, 0);
                }
                if !self.select_component(info.target) {
                    self.blur();
                }
                return Ok(Some(KeyOutcome::Handled));
            }
        }

        if self.is_uneditable_node(&range, false) {
            return Ok(Some(KeyOutcome::Blocked));
        }

        let doc = &self.doc;
        let at_node_end = self.format.is_line(doc, node)
            || doc.next_sibling(node).is_none()
            || doc.next_sibling(node).is_some_and(|n| {
                query::is_zero_width_node(doc, n) && doc.next_sibling(n).is_none()
            });
        if at_node_end
            && range.start_offset == doc.text_content(node).chars().count()
            && let Some(next_el) = doc.next_element_sibling(line)
            && self.format.is_component(doc, next_el)
        {
            if query::is_zero_width_node(doc, line) {
                self.doc.detach(line);
                if is_table(&self.doc, next_el) {
                    let doc = &self.doc;
                    let cell = query::edge_child(doc, next_el, |n| is_table_cell(doc, n), false);
                    let focus = cell.map(|c| doc.first_element_child(c).unwrap_or(c)).unwrap_or(next_el);
                    self.set_caret(focus, 0);
                    return Ok(Some(KeyOutcome::Handled));
                }
                self.set_caret(next_el, 0);
            }
            match self.format.component(&self.doc, next_el) {
                Some(info) => {
                    if !self.select_component(info.target) {
                        self.blur();
                    }
                }
                None => self.doc.detach(next_el),
            }
            return Ok(Some(KeyOutcome::Handled));
        }

        let doc = &self.doc;
        if !ctx.extended
            && (query::is_edge_point(doc, ec, range.end_offset, None)
                || (node == line && doc.child_at(line, range.start_offset).is_some()))
        {
            let sel = if node == line {
                doc.child_at(line, range.start_offset).unwrap_or(node)
            } else {
                node
            };
            if let Some(n) = doc.next_sibling(sel)
                && query::is_non_editable(doc, n)
            {
                self.doc.detach(n);
                return Ok(Some(KeyOutcome::Handled));
            }
            if self.format.is_component(doc, sel) {
                self.doc.detach(sel);
                return Ok(Some(KeyOutcome::Handled));
            }
        }

        let doc = &self.doc;
        if !ctx.extended
            && self.format.is_edge_line(doc, ec, range.end_offset, Some(Edge::End))
            && doc
                .next_element_sibling(line)
                .is_some_and(|n| self.format.is_line(doc, n))
        {
            self.status.format_attrs_temp = Some(doc.attrs(line).to_vec());
        }

        let doc = &self.doc;
        let start_line = self.format.get_line(doc, sc, None);
        let end_line = self.format.get_line(doc, ec, None);
        let Some(cell) = start_line.filter(|c| is_list_cell(doc, *c)) else {
            return Ok(None);
        };
        let Some(list) = self.format.get_block(doc, cell, None).filter(|b| is_list(doc, *b)) else {
            return Ok(None);
        };
        let in_nested = node == cell
            || (doc.is_text(node)
                && doc.next_sibling(node).is_none_or(|n| is_list(doc, n))
                && if start_line != end_line {
                    doc.contains(list, ec)
                } else {
                    range.end_offset == doc.node_len(node) && range.is_collapsed()
                });
        if !in_nested {
            return Ok(None);
        }
        if sc != ec {
            self.remove()?;
        }
        if self.join_next_cell(cell, list)? {
            self.push_history(true);
            return Ok(Some(KeyOutcome::Handled));
        }
        Ok(None)
    }

    /// Delete at the end of a list cell followed by a nested list: pull the first
    /// cell of that list up into `cell`.
    fn join_next_cell(&mut self, cell: NodeId, list: NodeId) -> EditorResult<bool> {
        let doc = &self.doc;
        let next = doc
            .element_children(cell)
            .into_iter()
            .find(|c| is_list(doc, *c))
            .or_else(|| doc.next_element_sibling(cell))
            .or_else(|| doc.parent(list).and_then(|p| doc.next_element_sibling(p)));
        let Some(next) = next.filter(|n| {
            is_list(doc, *n) || doc.element_children(*n).iter().any(|c| is_list(doc, *c))
        }) else {
            return Ok(false);
        };

        let focus = if is_list(doc, next) {
            let Some(first) = doc.first_element_child(next) else {
                return Ok(false);
            };
            let focus = doc.first_child(first);
            let reference = (doc.parent(next) == Some(cell)).then_some(next);
            for child in self.doc.child_nodes(first) {
                self.doc.insert_before(cell, child, reference)?;
            }
            self.doc.detach(first);
            if self.doc.element_children(next).is_empty() {
                self.doc.detach(next);
            }
            focus
        } else {
            let focus = doc.first_child(next);
            self.doc.move_children(next, cell)?;
            self.doc.detach(next);
            focus
        };
        if let Some(focus) = focus {
            self.set_caret(focus, 0);
        }
        tracing::debug!(target: "verso::keys", "nested cell pulled up");
        Ok(true)
    }

    fn tab(&mut self, event: &KeyEvent, ctx: &KeyContext) -> EditorResult<Option<KeyOutcome>> {
        if self.options.tab_disable {
            return Ok(Some(KeyOutcome::Blocked));
        }
        if event.is_ctrl() || event.alt || self.doc.is_root(ctx.node) {
            return Ok(Some(KeyOutcome::Handled));
        }
        let range = ctx.range;
        let is_edge = ctx.extended
            || query::is_edge_point(&self.doc, range.start_container, range.start_offset, None);
        let lines = self.get_lines(None);
        let (Some(&first), Some(&last)) = (lines.first(), lines.last()) else {
            return Ok(Some(KeyOutcome::Handled));
        };
        let doc = &self.doc;
        let first_cell = is_list_cell(doc, first);
        let last_cell = is_list_cell(doc, last);
        let mut cells = Vec::new();
        let mut plain = Vec::new();
        for &line in &lines {
            if !is_list_cell(doc, line) {
                plain.push(line);
            } else if doc.prev_element_sibling(line).is_some() || event.shift {
                cells.push(line);
            }
        }

        let mut r = range;
        if !cells.is_empty() && is_edge {
            let direction = if event.shift {
                NestDirection::Lift
            } else {
                NestDirection::Nest
            };
            self.apply_nested_list(&cells, direction)?;
            r = self.get_range();
        }

        let tab = NBSP.to_string().repeat(self.options.tab_size);
        if !plain.is_empty() {
            if !event.shift && plain.len() == 1 {
                let text = self.doc.create_text(tab);
                let Some(inserted) = self.insert_node_at(text, None, false)? else {
                    return Ok(Some(KeyOutcome::Blocked));
                };
                let (container, end) = match inserted {
                    Inserted::Text {
                        container,
                        end_offset,
                        ..
                    } => (container, end_offset),
                    Inserted::Node(n) => (n, self.doc.node_len(n)),
                };
                if !first_cell {
                    r.start_container = container;
                    r.start_offset = end;
                }
                if !last_cell {
                    r.end_container = container;
                    r.end_offset = end;
                }
            } else {
                if event.shift {
                    self.outdent_plain_lines(&plain)?;
                } else {
                    for &line in &plain {
                        let Some(child) = self.doc.first_child(line) else {
                            continue;
                        };
                        match self.doc.text(child) {
                            Some(text) => {
                                let indented = format!("{tab}{text}");
                                self.doc.set_text(child, indented);
                            }
                            None => {
                                let text = self.doc.create_text(tab.clone());
                                self.doc.insert_before(line, text, Some(child))?;
                            }
                        }
                    }
                }
                let doc = &self.doc;
                let first_text = query::edge_child(doc, plain[0], |n| doc.is_text(n), false);
                let last_text = query::edge_child(doc, plain[plain.len() - 1], |n| doc.is_text(n), true);
                if !first_cell && let Some(f) = first_text {
                    r.start_container = f;
                    r.start_offset = 0;
                }
                if !last_cell && let Some(l) = last_text {
                    r.end_container = l;
                    r.end_offset = doc.node_len(l);
                }
            }
        }

        let r = if r.is_live(&self.doc) { r } else { self.get_range() };
        self.set_range(r.start_container, r.start_offset, r.end_container, r.end_offset);
        self.push_history(false);
        tracing::debug!(target: "verso::keys", shift = event.shift, cells = cells.len(), lines = plain.len(), "tab");
        Ok(Some(KeyOutcome::Handled))
    }

    /// Shift+Tab on plain lines: drop up to one tab of leading whitespace.
    fn outdent_plain_lines(&mut self, lines: &[NodeId]) -> EditorResult<()> {
        let size = self.options.tab_size;
        for &line in lines {
            for child in self.doc.child_nodes(line) {
                if query::is_zero_width_node(&self.doc, child) {
                    continue;
                }
                if let Some(text) = self.doc.text(child) {
                    let lead = text.chars().take(size).take_while(|c| c.is_whitespace()).count();
                    if lead > 0 && lead == text.chars().count() {
                        self.doc.detach(child);
                    } else if lead > 0 {
                        let rest: String = text.chars().skip(lead).collect();
                        self.doc.set_text(child, rest);
                    }
                }
                break;
            }
            if self.doc.first_child(line).is_none() {
                let br = self.doc.create_element("br");
                self.doc.append_child(line, br)?;
            }
        }
        Ok(())
    }

    fn enter(&mut self, event: &KeyEvent, ctx: &KeyContext) -> EditorResult<Option<KeyOutcome>> {
        self.deselect_component();
        let KeyContext {
            range, node, line, ..
        } = *ctx;
        let br_line = self.format.get_br_line(&self.doc, node, None);
        let line_tag = self.doc.tag(line).unwrap_or(self.options.default_line.as_str()).to_owned();

        if self.options.char_counter_type == CharCounterType::ByteHtml {
            let addition = if br_line.is_some() || event.shift {
                "<br>".to_owned()
            } else {
                format!("<{line_tag}><br></{line_tag}>")
            };
            if !self.char_check(&addition) {
                return Ok(Some(KeyOutcome::Blocked));
            }
        }
        if event.shift {
            return Ok(None);
        }

        let doc = &self.doc;
        let (sc, so, ec, eo) = (range.start_container, range.start_offset, range.end_container, range.end_offset);
        let end_edge = doc.next_sibling(ec).is_none() && self.format.is_edge_line(doc, ec, eo, Some(Edge::End));
        let start_edge = doc.prev_sibling(sc).is_none() && self.format.is_edge_line(doc, sc, so, Some(Edge::Front));

        if end_edge && is_heading_or_rule(&line_tag) {
            // inline wrappers at the caret, innermost first
            let shells = if self.is_blank_line(line) {
                Vec::new()
            } else {
                query::parent_elements(
                    doc,
                    ec,
                    |n| n != line && doc.contains(line, n) && self.format.is_text_style_node(doc, n),
                    None,
                )
            };
            let default = self.options.default_line.clone();
            let Some(new_line) = self.add_line(line, Some(&default))? else {
                return Ok(None);
            };
            let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
            let mut child = sentinel;
            for n in shells {
                let shell = self.doc.clone_shallow(n)?;
                self.doc.append_child(shell, child)?;
                child = shell;
            }
            let first = self.doc.first_child(new_line);
            self.doc.insert_before(new_line, child, first)?;
            if child != sentinel
                && let Some(br) = first.filter(|f| is_break(&self.doc, *f))
            {
                self.doc.detach(br);
            }
            self.set_caret(sentinel, 1);
            tracing::debug!(target: "verso::keys", tag = %line_tag, "enter after a heading starts a default line");
            return Ok(Some(KeyOutcome::Handled));
        }

        if let Some(block) = ctx.block
            && self.format.is_line(doc, line)
            && !is_table_cell(doc, block)
            && !doc.tag_is(block, "figcaption")
        {
            if query::is_edge_point(doc, ec, eo, None)
                && let Some(nested) = doc.next_sibling(node).filter(|n| is_list(doc, *n))
            {
                let parent = doc.parent(line).ok_or(DomError::MissingParent(line))?;
                let reference = doc.next_element_sibling(line);
                let br = self.doc.create_element("br");
                let cell = self.doc.create_element("li");
                self.doc.append_child(cell, br)?;
                self.doc.insert_before(parent, cell, reference)?;
                self.doc.append_child(cell, nested)?;
                self.set_caret(br, 0);
                return Ok(Some(KeyOutcome::Handled));
            }

            let common = range.common_ancestor(doc);
            if (!doc.is_text(common) || doc.next_element_sibling(common).is_none())
                && self.is_blank_line(line)
                && !doc.next_element_sibling(line).is_some_and(|n| is_list_cell(doc, n))
            {
                self.exit_block(line, block)?;
                return Ok(Some(KeyOutcome::Handled));
            }
        }

        if let Some(br_line) = br_line {
            self.enter_in_br_line(br_line, ctx)?;
            return Ok(Some(KeyOutcome::Handled));
        }

        let doc = &self.doc;
        if range.is_collapsed() && (start_edge || end_edge) && self.format.is_line(doc, line) {
            let focus_br = self.doc.create_element("br");
            let new_line = self.doc.create_element(&line_tag);
            self.copy_line_attributes(new_line, line);

            // recreate the inline wrappers around the caret
            let mut child = focus_br;
            let mut current = Some(node);
            while let Some(n) = current
                && n != line
                && self.doc.contains(line, n)
            {
                if !is_break(&self.doc, n) && self.doc.is_element(n) {
                    let shell = self.doc.clone_shallow(n)?;
                    self.doc.append_child(shell, child)?;
                    child = shell;
                }
                current = self.doc.parent(n);
            }
            self.doc.append_child(new_line, child)?;

            let parent = self.doc.parent(line).ok_or(DomError::MissingParent(line))?;
            let reference = if start_edge && !end_edge {
                Some(line)
            } else {
                self.doc.next_element_sibling(line)
            };
            self.doc.insert_before(parent, new_line, reference)?;
            if end_edge {
                self.set_caret(focus_br, 0);
            } else {
                let first = self.doc.first_child(line).unwrap_or(line);
                self.set_caret(first, 0);
            }
            tracing::debug!(target: "verso::keys", start_edge, end_edge, "enter at a line edge");
            return Ok(Some(KeyOutcome::Handled));
        }

        if self.format.is_line(&self.doc, line) {
            self.split_line_on_enter(line, range, start_edge, end_edge)?;
            return Ok(Some(KeyOutcome::Handled));
        }

        if ctx.extended {
            return Ok(None);
        }

        let doc = &self.doc;
        if let Some(block) = ctx.block
            && parent_element(doc, block, |n| doc.tag_is(n, "figcaption"), None).is_some()
            && parent_element(doc, block, |n| is_list(doc, n), None).is_some()
            && let Some(new_line) = self.add_line(line, None)?
        {
            self.set_caret(new_line, 0);
            return Ok(Some(KeyOutcome::Handled));
        }
        Ok(None)
    }

    /// Enter on an empty last line of a block: the line leaves the block.
    fn exit_block(&mut self, line: NodeId, block: NodeId) -> EditorResult<()> {
        let doc = &self.doc;
        let holder = doc.parent(block);
        let new_line = match holder.filter(|h| is_list_cell(doc, *h)) {
            Some(parent_cell) => {
                let outer = doc.parent(parent_cell).ok_or(DomError::MissingParent(parent_cell))?;
                let reference = doc.next_element_sibling(parent_cell);
                let cell = self.doc.create_element("li");
                self.copy_line_attributes(cell, line);
                self.doc.insert_before(outer, cell, reference)?;
                cell
            }
            None => {
                let plain_line = |n: &NodeId| self.format.is_line(doc, *n) && !self.format.is_block(doc, *n);
                let tag = if holder.is_some_and(|h| is_table_cell(doc, h)) {
                    "div".to_owned()
                } else if holder.is_some_and(|h| is_list(doc, h)) {
                    "li".to_owned()
                } else if let Some(n) = doc.next_element_sibling(block).filter(plain_line) {
                    doc.tag(n).unwrap_or_default().to_owned()
                } else if let Some(n) = doc.prev_element_sibling(block).filter(plain_line) {
                    doc.tag(n).unwrap_or_default().to_owned()
                } else {
                    self.options.default_line.clone()
                };
                let new_line = self.doc.create_element(&tag);
                let edge = self.remove_block(
                    block,
                    RemoveBlockOptions {
                        selected: Some(vec![line]),
                        should_delete: true,
                        skip_history: true,
                        ..Default::default()
                    },
                )?;
                let root = self.doc.root();
                let cc = edge.cc.filter(|c| self.doc.is_attached(*c)).unwrap_or(root);
                let reference = edge.ec.filter(|e| self.doc.parent(*e) == Some(cc));
                self.doc.insert_before(cc, new_line, reference)?;
                new_line
            }
        };
        let br = self.doc.create_element("br");
        self.doc.append_child(new_line, br)?;
        transform::remove_all_parents(&mut self.doc, &self.format, line, None, None);
        self.set_caret(br, 0);
        tracing::debug!(target: "verso::keys", "enter on an empty last line leaves the block");
        Ok(())
    }

    /// Enter inside a free-format line adds breaks. Two breaks in a row with nothing
    /// after them end the free-format line and start a normal one.
    fn enter_in_br_line(&mut self, br_line: NodeId, ctx: &KeyContext) -> EditorResult<()> {
        let doc = &self.doc;
        let range = ctx.range;
        let node = ctx.node;
        let on_line = node == br_line;
        let children = doc.child_nodes(node);
        let offset = range.end_offset;
        let prev = doc.prev_element_sibling(node);
        let next = doc.next_sibling(node);
        let zero_text = |n: Option<&NodeId>| n.is_some_and(|n| doc.is_text(*n) && query::is_zero_width_node(doc, *n));
        let break_at = |i: usize| children.get(i).is_some_and(|c| is_break(doc, *c));

        let exits = !self.format.is_closure_br_line(doc, br_line)
            && ((on_line
                && range.is_collapsed()
                && children.len() <= offset + 2
                && offset > 0
                && break_at(offset)
                && break_at(offset - 1)
                && (children.get(offset + 1).is_none()
                    || ((children.get(offset + 2).is_none() || zero_text(children.get(offset + 2)))
                        && zero_text(children.get(offset + 1)))))
                || (!on_line
                    && query::is_zero_width_node(doc, node)
                    && prev.is_some_and(|p| {
                        is_break(doc, p)
                            && doc.prev_sibling(p).is_some_and(|pp| {
                                is_break(doc, pp) || !query::is_zero_width_node(doc, pp)
                            })
                    })
                    && next.is_none_or(|n| !is_break(doc, n) && query::is_zero_width_node(doc, n))));

        if exits {
            match (on_line, offset.checked_sub(1).and_then(|i| children.get(i))) {
                (true, Some(&extra)) => self.doc.detach(extra),
                _ => self.doc.detach(node),
            }
            let doc = &self.doc;
            let tag = doc
                .next_element_sibling(br_line)
                .filter(|n| self.format.is_line(doc, *n) && !self.format.is_block(doc, *n))
                .and_then(|n| doc.tag(n))
                .map(str::to_owned);
            if let Some(new_line) = self.add_line(br_line, tag.as_deref())? {
                query::copy_format_attributes(&mut self.doc, new_line, br_line);
                let focus = self.doc.first_child(new_line).unwrap_or(new_line);
                self.set_caret(focus, 0);
            }
            tracing::debug!(target: "verso::keys", "double break leaves the free-format line");
            return Ok(());
        }

        if on_line {
            let markup = if range.is_collapsed()
                && range
                    .start_offset
                    .checked_sub(1)
                    .and_then(|i| doc.child_at(range.start_container, i))
                    .is_some_and(|c| is_break(doc, c))
            {
                "<br>"
            } else {
                "<br><br>"
            };
            self.insert_html(markup, true, true, false)?;
            return Ok(());
        }

        let focus_next = doc.next_sibling(range.end_container);
        let br = self.doc.create_element("br");
        self.insert_node_at(br, None, true)?;
        let doc = &self.doc;
        let br_prev = doc.prev_sibling(br);
        let br_next = doc.next_sibling(br);
        if !focus_next.is_some_and(|n| is_break(doc, n))
            && !br_prev.is_some_and(|p| is_break(doc, p))
            && br_next.is_none_or(|n| query::is_zero_width_node(doc, n))
        {
            let parent = doc.parent(br).ok_or(DomError::MissingParent(br))?;
            let spacer = self.doc.create_element("br");
            self.doc.insert_before(parent, spacer, Some(br))?;
            self.set_caret(br, 0);
        } else {
            self.set_caret(br_next.unwrap_or(br), 0);
        }
        Ok(())
    }

    /// The generic Enter: delete an extended selection, then split the line at the caret.
    fn split_line_on_enter(&mut self, line: NodeId, range: Range, start_edge: bool, end_edge: bool) -> EditorResult<()> {
        let mut offset = 0;
        let new_line = if !range.is_collapsed() {
            let doc = &self.doc;
            let multi_line = self.format.get_line(doc, range.start_container, None)
                != self.format.get_line(doc, range.end_container, None);
            let new_format = self.doc.clone_shallow(line)?;
            self.doc.set_inner_html(new_format, "<br>")?;
            let doc = &self.doc;
            let common = range.common_ancestor(doc);
            let removed = if common == range.start_container
                && common == range.end_container
                && query::is_zero_width_node(doc, common)
            {
                RemoveResult {
                    container: range.start_container,
                    offset: range.start_offset,
                    prev_container: None,
                    common,
                }
            } else {
                self.remove()?
            };

            let doc = &self.doc;
            let Some(mut target) = self.format.get_line(doc, removed.container, None) else {
                if doc.is_root(removed.container) {
                    let root = doc.root();
                    self.doc.append_child(root, new_format)?;
                    self.copy_line_attributes(new_format, line);
                    self.set_caret(new_format, 0);
                }
                return Ok(());
            };
            if let Some(inner) = self.format.get_block(doc, removed.container, None)
                && doc.contains(target, inner)
                && let Some(first) = query::edge_child(doc, inner, |n| self.format.is_line(doc, n), false)
            {
                target = first;
            }
            let parent = doc.parent(target).ok_or(DomError::MissingParent(target))?;
            let same_container = removed.prev_container == Some(removed.container);
            if multi_line {
                if end_edge && !start_edge {
                    let reference = if removed.prev_container.is_none() || same_container {
                        doc.next_element_sibling(target)
                    } else {
                        Some(target)
                    };
                    self.doc.insert_before(parent, new_format, reference)?;
                    new_format
                } else {
                    offset = removed.offset;
                    if start_edge {
                        self.doc.insert_before(parent, new_format, Some(target))?;
                        if end_edge {
                            offset = 0;
                            new_format
                        } else {
                            target
                        }
                    } else {
                        target
                    }
                }
            } else if end_edge && start_edge {
                let reference = if same_container {
                    doc.next_element_sibling(target)
                } else {
                    Some(target)
                };
                self.doc.insert_before(parent, new_format, reference)?;
                new_format
            } else {
                let depth = node_depth(&self.doc, line);
                transform::split(&mut self.doc, &self.format, removed.container, Some(removed.offset), depth)?
            }
        } else if query::is_zero_width_node(&self.doc, line) {
            let tag = self.doc.tag(line).map(str::to_owned);
            self.add_line(line, tag.as_deref())?.unwrap_or(line)
        } else {
            let depth = node_depth(&self.doc, line);
            transform::split(&mut self.doc, &self.format, range.end_container, Some(range.end_offset), depth)?
        };

        self.copy_line_attributes(new_line, line);
        self.set_caret(new_line, offset);
        tracing::debug!(target: "verso::keys", collapsed = range.is_collapsed(), "line split by enter");
        Ok(())
    }

    /// Repair the tree after the host's default action and record a history step.
    pub fn key_up(&mut self, event: &KeyEvent) {
        if matches!(self.menu.active(), ActiveMenu::Dropdown(_)) || self.options.read_only {
            return;
        }
        let key_code = event.key_code;
        let root = self.doc.root();
        if key_code == code::BACKSPACE
            && self.doc.first_element_child(root).is_none()
            && self.doc.text_content(root).is_empty()
        {
            for child in self.doc.child_nodes(root) {
                self.doc.detach(child);
            }
            let line = self.create_line(None);
            if self.doc.append_child(root, line).is_ok() {
                let br = self.doc.first_child(line).unwrap_or(line);
                self.set_caret(br, 0);
            }
            tracing::debug!(target: "verso::keys", "empty root rebuilt with a default line");
            self.push_history(false);
            self.finish();
            return;
        }

        let range = self.get_range();
        let mut node = self.get_node();
        let mut line = self.format.get_line(&self.doc, node, None);
        let block = self.format.get_block(&self.doc, node, None);

        if let Some(line) = line
            && let Some(attrs) = self.status.format_attrs_temp.take()
        {
            for (name, value) in attrs {
                if key_code == code::ENTER && name == "id" {
                    self.doc.remove_attr(line, "id");
                    continue;
                }
                self.doc.set_attr(line, &name, &value);
            }
        }

        if line.is_none()
            && range.is_collapsed()
            && !self.format.is_component(&self.doc, node)
            && !is_list(&self.doc, node)
            && self.bare_cell(node).is_none()
        {
            self.set_default_line(block.map(|_| "div"));
            node = self.get_node();
            line = self.format.get_line(&self.doc, node, None);
        }

        if event.is_text_key()
            && let Some(text) = self.doc.text(node).map(str::to_owned)
            && text.contains(ZERO_WIDTH_SPACE)
        {
            let range = self.get_range();
            let chars: Vec<char> = text.chars().collect();
            let eo = range.end_offset.min(chars.len());
            let front = chars[..eo]
                .iter()
                .skip_while(|c| **c != ZERO_WIDTH_SPACE)
                .take_while(|c| **c == ZERO_WIDTH_SPACE)
                .count();
            let stripped = strip_zero_width(&text);
            self.doc.set_text(node, stripped);
            let so = range.start_offset.saturating_sub(front);
            self.set_range(node, so, node, eo.saturating_sub(front));
        }

        if is_delete(key_code)
            && let Some(line) = line
            && query::is_zero_width_node(&self.doc, line)
            && self.doc.prev_element_sibling(line).is_none()
        {
            self.apply_retain_style(line);
        }

        self.char_test("");
        if self.events.emit(&EditorEvent::KeyUp(event.clone())).is_cancel() {
            self.finish();
            return;
        }
        if !event.is_ctrl() && !event.alt && !is_history_ignored(key_code) {
            self.push_history(true);
        }
        self.finish();
    }

    /// Restore or drop the inline wrappers of a first line emptied by a delete key.
    fn apply_retain_style(&mut self, line: NodeId) {
        let shells = std::mem::take(&mut self.status.retain_style);
        let restore = match self.options.retain_style_mode {
            _ if shells.is_empty() => false,
            RetainStyleMode::None => false,
            RetainStyleMode::Always => true,
            RetainStyleMode::Repeat => {
                let spent = self.status.retain_style_spent;
                self.status.retain_style_spent = !spent;
                !spent
            }
        };
        let result = if restore {
            self.restore_style_shells(line, &shells)
        } else {
            self.clear_style_shells(line)
        };
        if let Err(err) = result {
            tracing::warn!(target: "verso::keys", error = %err, "could not restore the line style");
        }
    }

    fn restore_style_shells(&mut self, line: NodeId, shells: &[StyleShell]) -> EditorResult<()> {
        for child in self.doc.child_nodes(line) {
            self.doc.detach(child);
        }
        let mut holder = line;
        for shell in shells {
            let el = self.doc.create_element(&shell.tag);
            for (name, value) in &shell.attrs {
                self.doc.set_attr(el, name, value);
            }
            self.doc.append_child(holder, el)?;
            holder = el;
        }
        let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
        self.doc.append_child(holder, sentinel)?;
        self.set_caret(sentinel, 1);
        tracing::trace!(target: "verso::keys", wrappers = shells.len(), "line style retained");
        Ok(())
    }

    fn clear_style_shells(&mut self, line: NodeId) -> EditorResult<()> {
        let doc = &self.doc;
        let styled = doc
            .descendants(line)
            .into_iter()
            .any(|n| self.format.is_text_style_node(doc, n));
        if !styled {
            return Ok(());
        }
        for child in self.doc.child_nodes(line) {
            self.doc.detach(child);
        }
        let br = self.doc.create_element("br");
        self.doc.append_child(line, br)?;
        self.set_caret(br, 0);
        Ok(())
    }

    /// Account for `data` the host has just typed into the tree.
    ///
    /// Returns false when the input was refused: read-only, over the character
    /// limit, or vetoed by a hook.
    pub fn input(&mut self, data: &str) -> bool {
        if self.options.read_only {
            return false;
        }
        let range = self.get_range();
        let node = self.get_node();
        let doc = &self.doc;
        if self.format.get_line(doc, node, None).is_none()
            && range.is_collapsed()
            && !self.format.is_component(doc, node)
            && !is_list(doc, node)
            && self.bare_cell(node).is_none()
        {
            let tag = self.format.get_block(doc, node, None).map(|_| "div");
            self.set_default_line(tag);
        }
        self.init_selection();

        if !self.char_test(data) {
            self.finish();
            return false;
        }
        if self
            .events
            .emit(&EditorEvent::Input {
                data: data.to_owned(),
            })
            .is_cancel()
        {
            self.finish();
            return false;
        }
        self.push_history(true);
        self.finish();
        true
    }

    /// Rebuild a default line around the caret when it sits outside any line.
    ///
    /// This is the recovery path of the key handlers and never fails: when the
    /// content cannot be wrapped the selection is reset instead.
    pub(crate) fn set_default_line(&mut self, tag: Option<&str>) {
        let tag = tag.unwrap_or(self.options.default_line.as_str()).to_owned();
        if let Err(err) = self.try_set_default_line(&tag) {
            tracing::warn!(target: "verso::keys", error = %err, "could not rebuild the default line");
            self.remove_range();
            self.init_selection();
        }
    }

    fn try_set_default_line(&mut self, tag: &str) -> EditorResult<()> {
        let range = self.get_range();
        let doc = &self.doc;
        let common = range.common_ancestor(doc);
        let sc = range.start_container;

        if parent_element(doc, common, |n| self.format.is_component(doc, n), None)
            .is_some_and(|c| !is_table(doc, c))
        {
            return Ok(());
        }
        if self.format.is_block(doc, sc) || doc.is_root(sc) {
            let children = doc.element_children(sc);
            let near_component = [range.start_offset.checked_sub(1), Some(range.start_offset)]
                .into_iter()
                .flatten()
                .filter_map(|i| children.get(i))
                .any(|c| self.format.is_component(doc, *c));
            if near_component {
                return Ok(());
            }
        }
        if parent_element(
            doc,
            common,
            |n| query::is_non_editable(doc, n) || query::is_exclude_format(doc, n),
            None,
        )
        .is_some()
        {
            return Ok(());
        }

        if let Some(block) = self.format.get_block(doc, common, None)
            && !doc
                .element_children(block)
                .into_iter()
                .any(|c| self.format.is_line(doc, c))
        {
            let line = self.doc.create_element(tag);
            self.doc.move_children(block, line)?;
            if self.doc.first_child(line).is_none() {
                let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
                self.doc.append_child(line, sentinel)?;
            }
            self.doc.append_child(block, line)?;
            let (focus, _) = query::edge_child_nodes(&self.doc, line, None);
            let offset = end_offset(&self.doc, focus);
            self.set_caret(focus, offset);
            tracing::debug!(target: "verso::keys", %tag, "block content rewrapped into a line");
            return Ok(());
        }

        if self.format.is_block(doc, common) && doc.child_count(common) <= 1 {
            let focus = match doc.first_child(common).filter(|c| is_break(doc, *c)) {
                Some(br) => br,
                None => {
                    let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
                    self.doc.append_child(common, sentinel)?;
                    sentinel
                }
            };
            let offset = end_offset(&self.doc, focus);
            self.set_caret(focus, offset);
            return Ok(());
        }

        let root = doc.root();
        let anchor = if doc.is_root(common) {
            doc.child_at(root, range.start_offset)
                .or_else(|| range.start_offset.checked_sub(1).and_then(|i| doc.child_at(root, i)))
        } else {
            let mut anchor = common;
            while let Some(parent) = doc.parent(anchor)
                && !doc.is_root(parent)
                && !self.format.is_line(doc, parent)
                && !self.format.is_block(doc, parent)
            {
                anchor = parent;
            }
            Some(anchor)
        };
        let Some(anchor) = anchor else {
            let line = self.create_line(Some(tag));
            self.doc.append_child(root, line)?;
            let br = self.doc.first_child(line).unwrap_or(line);
            self.set_caret(br, 0);
            return Ok(());
        };

        let inline = |n: NodeId| {
            !self.format.is_line(doc, n) && !self.format.is_block(doc, n) && !self.format.is_component(doc, n)
        };
        if !inline(anchor) {
            self.remove_range();
            self.init_selection();
            return Ok(());
        }
        let holder = doc.parent(anchor).ok_or(DomError::MissingParent(anchor))?;
        let mut run = vec![anchor];
        let mut cur = doc.prev_sibling(anchor);
        while let Some(p) = cur.filter(|p| inline(*p)) {
            run.insert(0, p);
            cur = doc.prev_sibling(p);
        }
        let mut cur = doc.next_sibling(anchor);
        while let Some(n) = cur.filter(|n| inline(*n)) {
            run.push(n);
            cur = doc.next_sibling(n);
        }

        let line = self.doc.create_element(tag);
        self.doc.insert_before(holder, line, Some(run[0]))?;
        for node in run {
            self.doc.append_child(line, node)?;
        }
        let (_, mut focus) = query::edge_child_nodes(&self.doc, line, None);
        if is_break(&self.doc, focus) {
            let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
            self.doc.insert_before(line, sentinel, Some(focus))?;
            focus = sentinel;
        }
        let offset = end_offset(&self.doc, focus);
        self.set_caret(focus, offset);
        tracing::debug!(target: "verso::keys", %tag, "loose content wrapped into a line");
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

    fn node_at(ed: &Editor, path: &[usize]) -> NodeId {
        query::node_from_path(&ed.doc, path, ed.doc.root())
    }

    fn caret(ed: &mut Editor) -> (String, usize) {
        let range = ed.get_range();
        assert!(range.is_collapsed());
        (ed.doc.text_content(range.start_container), range.start_offset)
    }

    #[test]
    fn backspace_at_line_start_joins_the_previous_line() {
        let mut ed = editor("<p>AB</p><p>CD</p>");
        let cd = node_at(&ed, &[1, 0]);
        ed.set_caret(cd, 0);

        assert_eq!(ed.key_down(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<p>ABCD</p>");
        assert_eq!(caret(&mut ed), ("ABCD".to_owned(), 2));
    }

    #[test]
    fn delete_at_line_end_pulls_the_next_line_up() {
        let mut ed = editor("<p>AB</p><p>CD</p>");
        let ab = node_at(&ed, &[0, 0]);
        ed.set_caret(ab, 2);

        assert_eq!(ed.key_down(&KeyEvent::new(code::DELETE)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<p>ABCD</p>");
        assert_eq!(caret(&mut ed), ("ABCD".to_owned(), 2));
    }

    #[test]
    fn delete_at_the_end_of_the_last_line_is_refused() {
        let mut ed = editor("<p>AB</p>");
        let ab = node_at(&ed, &[0, 0]);
        ed.set_caret(ab, 2);
        assert_eq!(ed.key_down(&KeyEvent::new(code::DELETE)), KeyOutcome::Blocked);
        assert_eq!(ed.get_contents(), "<p>AB</p>");
    }

    #[test]
    fn enter_splits_the_line_at_the_caret() {
        let mut ed = editor("<p>ABCD</p>");
        let text = node_at(&ed, &[0, 0]);
        ed.set_caret(text, 2);

        assert_eq!(ed.key_down(&KeyEvent::new(code::ENTER)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<p>AB</p><p>CD</p>");
        assert_eq!(caret(&mut ed), ("CD".to_owned(), 0));
    }

    #[test]
    fn enter_after_a_heading_starts_a_default_line() {
        let mut ed = editor("<h2>Title</h2>");
        let text = node_at(&ed, &[0, 0]);
        ed.set_caret(text, 5);

        assert_eq!(ed.key_down(&KeyEvent::new(code::ENTER)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<h2>Title</h2><p><br></p>");
        let range = ed.get_range();
        assert_eq!(ed.doc.text(range.start_container), Some(ZERO_WIDTH_STR));
    }

    #[test]
    fn enter_after_a_heading_carries_the_inline_wrappers() {
        let mut ed = editor("<h2>T<strong><em>x</em></strong></h2>");
        let x = node_at(&ed, &[0, 1, 0, 0]);
        ed.set_caret(x, 1);

        assert_eq!(ed.press(&KeyEvent::new(code::ENTER)), KeyOutcome::Handled);
        let range = ed.get_range();
        assert_eq!(ed.doc.text(range.start_container), Some(ZERO_WIDTH_STR));
        let em = ed.doc.parent(range.start_container).unwrap();
        assert!(ed.doc.tag_is(em, "em"));

        ed.press(&KeyEvent::character('z'));
        assert_eq!(
            ed.get_contents(),
            "<h2>T<strong><em>x</em></strong></h2><p><strong><em>z</em></strong></p>"
        );
    }

    #[test]
    fn enter_after_a_blank_heading_starts_a_plain_line() {
        let mut ed = editor("<h3><strong>x</strong></h3>");
        let x = node_at(&ed, &[0, 0, 0]);
        ed.doc.set_text(x, ZERO_WIDTH_STR);
        ed.set_caret(x, 1);

        assert_eq!(ed.key_down(&KeyEvent::new(code::ENTER)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<h3><strong></strong></h3><p><br></p>");
        let range = ed.get_range();
        let line = ed.doc.parent(range.start_container).unwrap();
        assert!(ed.doc.tag_is(line, "p"));
    }

    #[test]
    fn backspace_across_a_component_joins_the_edge_lines() {
        let mut ed = editor(concat!(
            "<p>ab</p>",
            r#"<figure class="se-component"><table><tbody><tr><td>x</td></tr></tbody></table></figure>"#,
            "<p>cd</p>",
        ));
        let ab = node_at(&ed, &[0, 0]);
        let cd = node_at(&ed, &[2, 0]);
        ed.set_range(ab, 1, cd, 1);

        assert_eq!(ed.key_down(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<p>ad</p>");
        assert_eq!(caret(&mut ed), ("ad".to_owned(), 1));
    }

    #[test]
    fn delete_across_a_component_joins_the_edge_lines() {
        let mut ed = editor(r#"<p>ab</p><figure class="se-component"><hr></figure><p>cd</p>"#);
        let ab = node_at(&ed, &[0, 0]);
        let cd = node_at(&ed, &[2, 0]);
        ed.set_range(ab, 1, cd, 1);

        assert_eq!(ed.key_down(&KeyEvent::new(code::DELETE)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<p>ad</p>");
    }

    const BARE_CELLS: &str = "<table><tbody><tr><td>a</td><td>b</td></tr></tbody></table>";

    #[test]
    fn backspace_at_the_start_of_a_bare_cell_is_refused() {
        let mut ed = editor(BARE_CELLS);
        let b = node_at(&ed, &[0, 0, 0, 1, 0]);
        ed.set_caret(b, 0);

        assert_eq!(ed.press(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Blocked);
        assert_eq!(ed.get_contents(), BARE_CELLS);
        assert_eq!(caret(&mut ed), ("b".to_owned(), 0));
    }

    #[test]
    fn delete_at_the_end_of_a_bare_cell_is_refused() {
        let mut ed = editor(BARE_CELLS);
        let a = node_at(&ed, &[0, 0, 0, 0, 0]);
        ed.set_caret(a, 1);

        assert_eq!(ed.press(&KeyEvent::new(code::DELETE)), KeyOutcome::Blocked);
        assert_eq!(ed.get_contents(), BARE_CELLS);
    }

    #[test]
    fn delete_keys_stay_inside_an_empty_bare_cell() {
        let html = "<table><tbody><tr><td>a</td><td><br></td><td>c</td></tr></tbody></table>";
        let mut ed = editor(html);
        let br = node_at(&ed, &[0, 0, 0, 1, 0]);
        ed.set_caret(br, 0);
        assert_eq!(ed.press(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Blocked);
        ed.set_caret(br, 0);
        assert_eq!(ed.press(&KeyEvent::new(code::DELETE)), KeyOutcome::Blocked);
        assert_eq!(ed.get_contents(), html);
    }

    #[test]
    fn typing_in_a_bare_cell_does_not_wrap_it() {
        let mut ed = editor(BARE_CELLS);
        let b = node_at(&ed, &[0, 0, 0, 1, 0]);
        ed.set_caret(b, 1);

        ed.type_text("z");
        assert_eq!(ed.get_contents(), "<table><tbody><tr><td>a</td><td>bz</td></tr></tbody></table>");
        assert!(ed.input(""));
        assert_eq!(ed.get_contents(), "<table><tbody><tr><td>a</td><td>bz</td></tr></tbody></table>");
    }

    #[test]
    fn backspace_at_the_start_of_a_cell_line_is_refused() {
        let html = "<table><tbody><tr><td><div>a</div></td><td><div>b</div></td></tr></tbody></table>";
        let mut ed = editor(html);
        let b = node_at(&ed, &[0, 0, 0, 1, 0, 0]);
        ed.set_caret(b, 0);
        assert_eq!(ed.press(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Blocked);
        assert_eq!(ed.get_contents(), html);
    }

    #[test]
    fn enter_on_an_empty_last_cell_leaves_the_list() {
        let mut ed = editor("<ul><li>a</li><li><br></li></ul>");
        let br = node_at(&ed, &[0, 1, 0]);
        ed.set_caret(br, 0);

        assert_eq!(ed.key_down(&KeyEvent::new(code::ENTER)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<ul><li>a</li></ul><p><br></p>");
    }

    #[test]
    fn shift_enter_is_left_to_the_host() {
        let mut ed = editor("<p>ab</p>");
        let text = node_at(&ed, &[0, 0]);
        ed.set_caret(text, 1);
        let outcome = ed.key_down(&KeyEvent::new(code::ENTER).with_shift());
        assert_eq!(outcome, KeyOutcome::PassThrough);
        assert_eq!(ed.get_contents(), "<p>ab</p>");
    }

    #[test]
    fn tab_inserts_non_breaking_spaces() {
        let mut ed = editor("<p>abcd</p>");
        let text = node_at(&ed, &[0, 0]);
        ed.set_caret(text, 2);

        assert_eq!(ed.key_down(&KeyEvent::new(code::TAB)), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<p>ab&nbsp;&nbsp;&nbsp;&nbsp;cd</p>");
    }

    #[test]
    fn disabled_tab_is_refused() {
        let options = EditorOptions {
            tab_disable: true,
            ..Default::default()
        };
        let mut ed = Editor::new(options).unwrap().with_content("<p>ab</p>").unwrap();
        assert_eq!(ed.key_down(&KeyEvent::new(code::TAB)), KeyOutcome::Blocked);
        assert_eq!(ed.get_contents(), "<p>ab</p>");
    }

    #[test]
    fn shift_ctrl_space_inserts_a_non_breaking_space() {
        let mut ed = editor("<p>ab</p>");
        let text = node_at(&ed, &[0, 0]);
        ed.set_caret(text, 1);

        let event = KeyEvent::new(code::SPACE).with_shift().with_ctrl();
        assert_eq!(ed.key_down(&event), KeyOutcome::Handled);
        assert_eq!(ed.get_contents(), "<p>a&nbsp;b</p>");
    }

    #[test]
    fn backspace_selects_then_deletes_a_component() {
        let mut ed = editor(r#"<p>A</p><figure class="se-component"><img src="x"></figure><p>B</p>"#);
        let b = node_at(&ed, &[2, 0]);
        ed.set_caret(b, 0);

        assert_eq!(ed.key_down(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Handled);
        let selected = ed.selected_component().cloned().unwrap();
        assert_eq!(selected.plugin_name, "image");
        assert!(ed.doc.tag_is(selected.container, "figure"));

        assert_eq!(ed.key_down(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Handled);
        assert!(ed.selected_component().is_none());
        assert_eq!(ed.get_contents(), "<p>A</p><p>B</p>");
        assert_eq!(caret(&mut ed), ("A".to_owned(), 1));
    }

    #[test]
    fn read_only_lets_only_navigation_through() {
        let options = EditorOptions {
            read_only: true,
            ..Default::default()
        };
        let mut ed = Editor::new(options).unwrap().with_content("<p>ab</p>").unwrap();
        assert_eq!(ed.key_down(&KeyEvent::character('x')), KeyOutcome::Blocked);
        assert_eq!(ed.key_down(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Blocked);
        assert_eq!(ed.key_down(&KeyEvent::new(code::LEFT)), KeyOutcome::PassThrough);
        assert_eq!(ed.key_down(&KeyEvent::character('c').with_ctrl()), KeyOutcome::PassThrough);
        assert!(!ed.input("x"));
        assert_eq!(ed.get_contents(), "<p>ab</p>");
    }

    #[test]
    fn open_dropdown_swallows_nothing() {
        let mut ed = editor("<p>ab</p>");
        ed.menu.set(ActiveMenu::Dropdown("font".into()));
        assert_eq!(ed.key_down(&KeyEvent::new(code::ENTER)), KeyOutcome::PassThrough);
        assert_eq!(ed.get_contents(), "<p>ab</p>");
    }

    #[test]
    fn key_down_hook_can_veto() {
        let mut ed = editor("<p>AB</p><p>CD</p>");
        ed.events.set_user_hooks(|event: &EditorEvent| match event {
            EditorEvent::KeyDown(_) => crate::events::Outcome::Cancel,
            _ => crate::events::Outcome::Continue,
        });
        let cd = node_at(&ed, &[1, 0]);
        ed.set_caret(cd, 0);
        assert_eq!(ed.key_down(&KeyEvent::new(code::BACKSPACE)), KeyOutcome::Blocked);
        assert_eq!(ed.get_contents(), "<p>AB</p><p>CD</p>");
    }

    #[test]
    fn key_up_strips_sentinels_next_to_typed_text() {
        let mut ed = editor("<p>ab</p>");
        let text = node_at(&ed, &[0, 0]);
        ed.doc.set_text(text, "\u{200B}x");
        ed.set_caret(text, 2);

        ed.key_up(&KeyEvent::character('x'));
        assert_eq!(ed.doc.text(text), Some("x"));
        assert_eq!(caret(&mut ed), ("x".to_owned(), 1));
    }

    #[test]
    fn key_up_rebuilds_an_emptied_root() {
        let mut ed = editor("<p>a</p>");
        let line = node_at(&ed, &[0]);
        ed.doc.detach(line);

        ed.key_up(&KeyEvent::new(code::BACKSPACE));
        assert_eq!(ed.get_contents(), "<p><br></p>");
    }

    #[test]
    fn input_is_refused_past_the_limit() {
        let options = EditorOptions {
            max_char_count: Some(3),
            ..Default::default()
        };
        let mut ed = Editor::new(options).unwrap().with_content("<p>abc</p>").unwrap();
        let text = node_at(&ed, &[0, 0]);
        ed.set_caret(text, 3);
        assert!(ed.input(""));
        ed.doc.set_text(text, "abcd");
        ed.set_caret(text, 4);
        assert!(!ed.input("d"));
        assert_eq!(ed.get_contents(), "<p>abc</p>");
    }

    #[test]
    fn key_classes() {
        assert!(KeyEvent::character('a').is_text_key());
        assert!(KeyEvent::new(code::SPACE).is_text_key());
        assert!(!KeyEvent::new(code::ENTER).is_text_key());
        assert!(!KeyEvent::character('a').with_ctrl().is_text_key());
        assert!(is_history_ignored(code::LEFT));
        assert!(!is_history_ignored(code::BACKSPACE));
    }
}
