//! Default actions for hosts without a browser.
//!
//! A browser applies its own edit between keydown and keyup. [`Editor::press`] stands
//! in for it so the keyup and input repairs run against the same tree shapes they see
//! in a real page.

use verso_editor_dom::document::char_to_byte;
use verso_editor_dom::query::{self, Edge, is_break, node_depth};
use verso_editor_dom::{NodeId, ZERO_WIDTH_STR};

use crate::editor::Editor;
use crate::error::EditorResult;
use crate::keys::{KeyEvent, KeyOutcome, code};
use crate::menu::ActiveMenu;
use crate::transform;

impl Editor {
    /// Run a full key press: keydown, the default action when keydown passed, keyup.
    pub fn press(&mut self, event: &KeyEvent) -> KeyOutcome {
        let outcome = self.key_down(event);
        if outcome == KeyOutcome::PassThrough {
            if let Err(err) = self.default_action(event) {
                tracing::warn!(
                    target: "verso::keys",
                    key = event.key_code,
                    error = %err,
                    "default action failed, rebuilding the default line"
                );
                self.set_default_line(None);
            }
            self.finish();
        }
        self.key_up(event);
        outcome
    }

    /// Press the key for each character of `text`. A newline presses Enter.
    pub fn type_text(&mut self, text: &str) {
        for ch in text.chars() {
            let event = match ch {
                '\n' => KeyEvent::new(code::ENTER),
                ch => KeyEvent::character(ch),
            };
            self.press(&event);
        }
    }

    fn default_action(&mut self, event: &KeyEvent) -> EditorResult<()> {
        if self.options.read_only || matches!(self.menu.active(), ActiveMenu::Dropdown(_)) {
            return Ok(());
        }
        match event.key_code {
            code::BACKSPACE => self.delete_char(Edge::Front),
            code::DELETE => self.delete_char(Edge::End),
            code::ENTER if event.shift => self.native_break(),
            code::ENTER => self.native_split(),
            code::LEFT => {
                self.move_caret(Edge::Front);
                Ok(())
            }
            code::RIGHT => {
                self.move_caret(Edge::End);
                Ok(())
            }
            _ if event.is_text_key() && !event.key.is_empty() => {
                let key = event.key.clone();
                self.native_insert_text(&key)
            }
            _ => Ok(()),
        }
    }

    fn native_insert_text(&mut self, text: &str) -> EditorResult<()> {
        if !self.get_range().is_collapsed() {
            self.remove()?;
        }
        let range = self.get_range();
        let (sc, so) = (range.start_container, range.start_offset);
        let added = text.chars().count();
        match self.doc.text(sc).map(str::to_owned) {
            Some(mut value) => {
                value.insert_str(char_to_byte(&value, so), text);
                self.doc.set_text(sc, value);
                if let Some(br) = self.doc.next_sibling(sc).filter(|n| is_break(&self.doc, *n))
                    && self.doc.next_sibling(br).is_none()
                    && self.doc.prev_sibling(sc).is_none()
                    && self
                        .doc
                        .parent(br)
                        .is_some_and(|p| self.format.is_line(&self.doc, p) && !self.format.is_br_line(&self.doc, p))
                {
                    self.doc.detach(br);
                }
                self.set_caret(sc, so + added);
            }
            None => {
                let node = self.doc.create_text(text);
                if is_break(&self.doc, sc) {
                    let parent = self.doc.parent(sc).unwrap_or(sc);
                    self.doc.insert_before(parent, node, Some(sc))?;
                    // a lone placeholder break goes once the line has text
                    if self.doc.next_sibling(sc).is_none() && self.doc.prev_sibling(node).is_none() {
                        self.doc.detach(sc);
                    }
                } else {
                    let reference = self.doc.child_at(sc, so);
                    self.doc.insert_before(sc, node, reference)?;
                }
                self.set_caret(node, added);
            }
        }
        self.input(text);
        Ok(())
    }

    /// Delete one character (or break) toward `edge`, or join lines at a line edge.
    fn delete_char(&mut self, edge: Edge) -> EditorResult<()> {
        let range = self.get_range();
        if !range.is_collapsed() {
            self.remove()?;
            self.input("");
            return Ok(());
        }
        let (node, offset) = (range.start_container, range.start_offset);
        let line = self.format.get_line(&self.doc, node, None);

        if let Some(value) = self.doc.text(node).map(str::to_owned) {
            let len = value.chars().count();
            let at = match edge {
                Edge::Front => offset.checked_sub(1),
                Edge::End => (offset < len).then_some(offset),
            };
            if let Some(at) = at {
                let rest: String = value
                    .chars()
                    .enumerate()
                    .filter_map(|(i, c)| (i != at).then_some(c))
                    .collect();
                if rest.is_empty() {
                    self.drop_emptied(node, line)?;
                } else {
                    self.doc.set_text(node, rest);
                    self.set_caret(node, at);
                }
                self.input("");
                return Ok(());
            }
        }

        let neighbour = self.neighbour_node(node, offset, edge, line);
        match neighbour {
            Some(n) if self.doc.is_text(n) && self.doc.node_len(n) > 0 => {
                let value = self.doc.text_content(n);
                let rest: String = match edge {
                    Edge::Front => {
                        let keep = value.chars().count() - 1;
                        value.chars().take(keep).collect()
                    }
                    Edge::End => value.chars().skip(1).collect(),
                };
                if rest.is_empty() {
                    self.doc.detach(n);
                } else {
                    self.doc.set_text(n, rest);
                }
            }
            Some(n) if is_break(&self.doc, n) => {
                self.doc.detach(n);
                if let Some(line) = line
                    && self.doc.first_child(line).is_none()
                {
                    let br = self.doc.create_element("br");
                    self.doc.append_child(line, br)?;
                    self.set_caret(br, 0);
                }
            }
            Some(n) if self.format.is_component(&self.doc, n) || query::is_media(&self.doc, n) => {
                if !self.select_component(n) {
                    self.blur();
                }
                return Ok(());
            }
            Some(_) => {}
            None => {
                let Some(line) = line else {
                    return Ok(());
                };
                let (focus, at) = match edge {
                    Edge::Front
                        if self
                            .doc
                            .prev_element_sibling(line)
                            .is_some_and(|p| self.format.is_line(&self.doc, p)) =>
                    {
                        self.line_delete_prev(line)?
                    }
                    Edge::End
                        if self
                            .doc
                            .next_element_sibling(line)
                            .is_some_and(|n| self.format.is_line(&self.doc, n)) =>
                    {
                        self.line_delete_next(line)?
                    }
                    _ => return Ok(()),
                };
                self.set_caret(focus, at);
            }
        }
        self.input("");
        Ok(())
    }

    /// The node right before (or after) the caret inside its line.
    fn neighbour_node(&self, node: NodeId, offset: usize, edge: Edge, line: Option<NodeId>) -> Option<NodeId> {
        let doc = &self.doc;
        if doc.is_element(node) && !is_break(doc, node) {
            let child = match edge {
                Edge::Front => offset.checked_sub(1).and_then(|i| doc.child_at(node, i)),
                Edge::End => doc.child_at(node, offset),
            };
            if let Some(child) = child {
                let (first, last) = query::edge_child_nodes(doc, child, None);
                return Some(if edge == Edge::Front { last } else { first });
            }
        }
        match edge {
            Edge::Front => query::previous_deepest_node(doc, node, line),
            Edge::End => query::next_deepest_node(doc, node, line),
        }
    }

    /// A text node lost its last character: drop it and keep the line editable.
    fn drop_emptied(&mut self, node: NodeId, line: Option<NodeId>) -> EditorResult<()> {
        let prev = self.doc.prev_sibling(node);
        let next = self.doc.next_sibling(node);
        self.doc.detach(node);
        match (line, prev, next) {
            (Some(line), None, None) if self.doc.first_child(line).is_none() => {
                let br = self.doc.create_element("br");
                self.doc.append_child(line, br)?;
                self.set_caret(br, 0);
            }
            (_, Some(p), _) => {
                let (_, last) = query::edge_child_nodes(&self.doc, p, None);
                let at = if self.doc.is_text(last) { self.doc.node_len(last) } else { 0 };
                self.set_caret(last, at);
            }
            (_, None, Some(n)) => {
                let (first, _) = query::edge_child_nodes(&self.doc, n, None);
                self.set_caret(first, 0);
            }
            _ => {
                self.init_selection();
            }
        }
        Ok(())
    }

    fn native_split(&mut self) -> EditorResult<()> {
        if !self.get_range().is_collapsed() {
            self.remove()?;
        }
        if !self.reset_range_to_text_node() {
            return self.native_break();
        }
        let range = self.get_range();
        let node = range.start_container;
        let Some(line) = self
            .format
            .get_line(&self.doc, node, None)
            .filter(|l| !self.format.is_br_line(&self.doc, *l))
        else {
            return self.native_break();
        };
        let depth = node_depth(&self.doc, line);
        let next = transform::split(&mut self.doc, &self.format, node, Some(range.start_offset), depth)?;
        self.set_caret(next, 0);
        tracing::trace!(target: "verso::keys", "line split by the default action");
        self.input("");
        Ok(())
    }

    fn native_break(&mut self) -> EditorResult<()> {
        let br = self.doc.create_element("br");
        let Some(inserted) = self.insert_node_at(br, None, true)? else {
            return Ok(());
        };
        let br = inserted.node();
        match self.doc.next_sibling(br) {
            Some(next) => {
                self.set_caret(next, 0);
            }
            None => {
                let sentinel = self.doc.create_text(ZERO_WIDTH_STR);
                self.doc.insert_after(br, sentinel)?;
                self.set_caret(sentinel, 1);
            }
        }
        self.input("");
        Ok(())
    }

    /// Move a collapsed caret one character. Extended ranges collapse to their edge.
    fn move_caret(&mut self, edge: Edge) {
        let range = self.get_range();
        if !range.is_collapsed() {
            let _ = match edge {
                Edge::Front => self.set_caret(range.start_container, range.start_offset),
                Edge::End => self.set_caret(range.end_container, range.end_offset),
            };
            return;
        }
        let (node, offset) = (range.start_container, range.start_offset);
        let len = if self.doc.is_text(node) { self.doc.node_len(node) } else { 0 };
        let target = match edge {
            Edge::Front if self.doc.is_text(node) && offset > 0 => Some((node, offset - 1)),
            Edge::End if offset < len => Some((node, offset + 1)),
            Edge::Front => query::previous_deepest_node(&self.doc, node, None).map(|p| {
                let at = if self.doc.is_text(p) { self.doc.node_len(p) } else { 0 };
                (p, at)
            }),
            Edge::End => query::next_deepest_node(&self.doc, node, None).map(|n| (n, 0)),
        };
        if let Some((node, offset)) = target {
            self.set_caret(node, offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_common::EditorOptions;

    fn editor(html: &str) -> Editor {
        Editor::new(EditorOptions::default()).unwrap().with_content(html).unwrap()
    }

    #[test]
    fn typing_fills_an_empty_line() {
        let mut ed = editor("");
        ed.type_text("hi");
        assert_eq!(ed.get_contents(), "<p>hi</p>");
    }

    #[test]
    fn typing_and_enter_build_lines() {
        let mut ed = editor("");
        ed.type_text("ab\ncd");
        assert_eq!(ed.get_contents(), "<p>ab</p><p>cd</p>");
    }

    #[test]
    fn backspace_deletes_characters_then_joins_lines() {
        let mut ed = editor("<p>ab</p><p>c</p>");
        let c = query::node_from_path(&ed.doc, &[1, 0], ed.doc.root());
        ed.set_caret(c, 1);
        ed.press(&KeyEvent::new(code::BACKSPACE));
        assert_eq!(ed.get_contents(), "<p>ab</p><p><br></p>");
        ed.press(&KeyEvent::new(code::BACKSPACE));
        assert_eq!(ed.get_contents(), "<p>ab</p>");
        ed.press(&KeyEvent::new(code::BACKSPACE));
        assert_eq!(ed.get_contents(), "<p>a</p>");
    }

    #[test]
    fn shift_enter_breaks_inside_the_line() {
        let mut ed = editor("<p>ab</p>");
        let t = query::node_from_path(&ed.doc, &[0, 0], ed.doc.root());
        ed.set_caret(t, 1);
        ed.press(&KeyEvent::new(code::ENTER).with_shift());
        assert_eq!(ed.get_contents(), "<p>a<br>b</p>");
    }

    #[test]
    fn arrows_move_the_caret() {
        let mut ed = editor("<p>ab</p>");
        let t = query::node_from_path(&ed.doc, &[0, 0], ed.doc.root());
        ed.set_caret(t, 2);
        ed.press(&KeyEvent::new(code::LEFT));
        ed.type_text("x");
        assert_eq!(ed.get_contents(), "<p>axb</p>");
    }
}
