//! The editing context every operation runs against.
//!
//! [`Editor`] owns the tree, the selection and the collaborators. Operations are
//! split across modules as `impl Editor` blocks; each public operation ends with
//! [`Editor::finish`], which frees the nodes it detached.

use std::cell::Cell;
use std::rc::Rc;

use smol_str::SmolStr;
use verso_common::EditorOptions;
use verso_editor_dom::{Document, NodeId, ZERO_WIDTH_SPACE};

use crate::char_counter::CharCounter;
use crate::component::{ComponentInfo, ComponentRegistry, FigureRegistry};
use crate::error::EditorResult;
use crate::events::EventBus;
use crate::format::Format;
use crate::history::{History, SnapshotHistory};
use crate::html::{BasicCleaner, EscapedTextInserter, FallbackInserter, HtmlCleaner};
use crate::menu::MenuState;
use crate::selection::{Range, SelectionState};

/// Collaborators the core calls into but does not implement policy for.
pub struct Capabilities {
    pub history: Box<dyn History>,
    pub cleaner: Box<dyn HtmlCleaner>,
    pub registry: Rc<dyn ComponentRegistry>,
    /// Degraded path used when a fragment cannot be inserted as markup.
    pub fallback: Box<dyn FallbackInserter>,
}

impl Capabilities {
    pub fn for_options(options: &EditorOptions) -> Self {
        Self {
            history: Box::new(SnapshotHistory::new(
                options.history_stack_delay_ms,
                options.history_max_steps,
            )),
            cleaner: Box::new(BasicCleaner::new(&options.default_line)),
            registry: Rc::new(FigureRegistry),
            fallback: Box::new(EscapedTextInserter),
        }
    }
}

/// Tag and attributes of an inline wrapper kept across a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StyleShell {
    pub tag: SmolStr,
    pub attrs: Vec<(SmolStr, String)>,
}

#[derive(Debug, Default)]
pub(crate) struct Status {
    pub selected_component: Option<ComponentInfo>,
    /// Raised while a paste or drop awaits its hook.
    pub loading: Rc<Cell<bool>>,
    /// Attributes of a line removed by Backspace, reapplied on keyup.
    pub format_attrs_temp: Option<Vec<(SmolStr, String)>>,
    /// Inline wrappers around the caret captured before a delete, outermost first.
    pub retain_style: Vec<StyleShell>,
    /// In `repeat` mode, set after the wrappers were restored once.
    pub retain_style_spent: bool,
}

pub struct Editor {
    pub doc: Document,
    pub format: Format,
    pub options: EditorOptions,
    pub caps: Capabilities,
    pub events: EventBus,
    pub menu: MenuState,
    pub(crate) counter: CharCounter,
    pub(crate) selection: SelectionState,
    pub(crate) status: Status,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("contents", &self.doc.inner_html(self.doc.root()))
            .field("range", &self.selection.range)
            .finish_non_exhaustive()
    }
}

impl Editor {
    pub fn new(options: EditorOptions) -> EditorResult<Self> {
        let caps = Capabilities::for_options(&options);
        Self::with_capabilities(options, caps)
    }

    pub fn with_capabilities(options: EditorOptions, caps: Capabilities) -> EditorResult<Self> {
        let format = Format::new(&options.formats, caps.registry.clone())?;
        let counter = CharCounter::new(options.max_char_count, options.char_counter_type);
        Ok(Self {
            doc: Document::new(),
            format,
            counter,
            options,
            caps,
            events: EventBus::default(),
            menu: MenuState::default(),
            selection: SelectionState::default(),
            status: Status::default(),
        })
    }

    /// Builder form of [`set_contents`](Self::set_contents).
    pub fn with_content(mut self, html: &str) -> EditorResult<Self> {
        self.set_contents(html)?;
        Ok(self)
    }

    /// Replace the whole content. The markup goes through the cleaner with line
    /// wrapping forced, the history restarts, and the caret goes to the first line.
    pub fn set_contents(&mut self, html: &str) -> EditorResult<()> {
        let cleaned = self.caps.cleaner.clean(html, true);
        let root = self.doc.root();
        self.doc.set_inner_html(root, &cleaned)?;
        if self.doc.first_child(root).is_none() {
            let line = self.create_line(None);
            self.doc.append_child(root, line)?;
        }
        self.remove_range();
        self.status = Status {
            loading: self.status.loading.clone(),
            ..Status::default()
        };
        self.finish();
        self.caps.history.reset(&self.doc);
        Ok(())
    }

    /// Content for external consumption, without zero-width sentinels.
    pub fn get_contents(&self) -> String {
        self.doc
            .inner_html(self.doc.root())
            .replace(ZERO_WIDTH_SPACE, "")
    }

    /// Text content of the editable root, sentinels excluded.
    pub fn get_text(&self) -> String {
        self.doc
            .text_content(self.doc.root())
            .replace(ZERO_WIDTH_SPACE, "")
    }

    pub fn is_loading(&self) -> bool {
        self.status.loading.get()
    }

    pub fn char_count(&self) -> usize {
        self.counter.current(&self.doc)
    }

    /// Would adding `addition` stay within the character limit.
    pub fn char_check(&self, addition: &str) -> bool {
        self.counter.check(&self.doc, addition)
    }

    pub fn undo(&mut self) -> bool {
        let range = self.range();
        self.caps.history.check(&self.doc, range.as_ref());
        match self.caps.history.undo() {
            Some(snapshot) => self.restore_snapshot(&snapshot),
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let range = self.range();
        self.caps.history.check(&self.doc, range.as_ref());
        match self.caps.history.redo() {
            Some(snapshot) => self.restore_snapshot(&snapshot),
            None => false,
        }
    }

    fn restore_snapshot(&mut self, snapshot: &crate::history::Snapshot) -> bool {
        let root = self.doc.root();
        if let Err(err) = self.doc.set_inner_html(root, &snapshot.content) {
            tracing::warn!(target: "verso::history", error = %err, "stored snapshot no longer parses");
            return false;
        }
        self.deselect_component();
        let range = snapshot.range.resolve(&self.doc);
        self.set_range(range.start_container, range.start_offset, range.end_container, range.end_offset);
        self.finish();
        true
    }

    /// Commit a delayed history push whose delay has elapsed.
    pub fn tick(&mut self) -> bool {
        self.caps.history.poll(&self.doc, web_time::Instant::now())
    }

    pub(crate) fn push_history(&mut self, delayed: bool) {
        let range = self.range();
        self.caps.history.push(&self.doc, range.as_ref(), delayed);
    }

    /// Free detached nodes. Called at the end of every public operation.
    pub(crate) fn finish(&mut self) {
        self.doc.sweep();
    }

    /// `<tag><br></tag>`, with the default line tag when `tag` is `None`.
    pub(crate) fn create_line(&mut self, tag: Option<&str>) -> NodeId {
        let tag = tag.unwrap_or(&self.options.default_line).to_owned();
        let line = self.doc.create_element(&tag);
        let br = self.doc.create_element("br");
        // both nodes are fresh elements, so this cannot fail
        let _ = self.doc.append_child(line, br);
        line
    }

    /// Caret at the end of the deepest last node under `node`.
    pub(crate) fn caret_at_end(&mut self, node: NodeId) -> Option<Range> {
        let (_, end) = verso_editor_dom::query::edge_child_nodes(&self.doc, node, None);
        let offset = if self.doc.is_text(end) {
            self.doc.node_len(end)
        } else {
            0
        };
        self.set_caret(end, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_round_trip_without_sentinels() {
        let mut ed = Editor::new(EditorOptions::default()).unwrap();
        ed.set_contents("<p>a\u{200B}b</p><p><br></p>").unwrap();
        assert_eq!(ed.get_contents(), "<p>ab</p><p><br></p>");
        assert_eq!(ed.get_text(), "ab");
    }

    #[test]
    fn bare_text_is_wrapped_into_the_default_line() {
        let options = EditorOptions {
            default_line: "div".into(),
            ..Default::default()
        };
        let ed = Editor::new(options).unwrap().with_content("hello <b>there</b>").unwrap();
        assert_eq!(ed.get_contents(), "<div>hello <b>there</b></div>");
    }

    #[test]
    fn undo_restores_content_and_caret() {
        let mut ed = Editor::new(EditorOptions::default())
            .unwrap()
            .with_content("<p>ab</p>")
            .unwrap();
        let p = ed.doc.first_child(ed.doc.root()).unwrap();
        let text = ed.doc.first_child(p).unwrap();
        ed.doc.set_text(text, "abc");
        ed.set_caret(text, 3);
        ed.push_history(false);

        assert!(ed.undo());
        assert_eq!(ed.get_contents(), "<p>ab</p>");
        assert!(ed.redo());
        assert_eq!(ed.get_contents(), "<p>abc</p>");
        let range = ed.get_range();
        assert_eq!(ed.doc.text(range.start_container), Some("abc"));
        assert_eq!(range.start_offset, 3);
        assert!(!ed.redo());
    }
}
