//! Paste and drop.
//!
//! Both go through the same pipeline: unwrap the clipboard fragment markers, clean
//! the markup (or escape plain text), test the character limit, let the hooks veto or
//! rewrite it, and insert what is left. Hooks may be asynchronous, so the pipeline is
//! an `async fn` and the editor reports itself as loading while it waits.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;
use verso_common::CharCounterType;
use verso_editor_dom::html::escape_text;

use crate::editor::Editor;
use crate::events::{EditorEvent, Outcome};
use crate::selection::Range;

static OFFICE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class=["']*Mso(Normal|List)|content=["']*Word\.Document|content=["']*OneNote\.File|content=["']*Excel\.Sheet"#)
        .expect("office marker pattern")
});

static FRAGMENT_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<html>\r?\n?<body>\r?\n?<!--StartFragment-->|<!--EndFragment-->\r?\n?</body>\r?\n?</html>$")
        .expect("fragment wrapper pattern")
});

/// What the host's clipboard or drag data holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardData {
    /// `text/html`, empty when the source offered none.
    pub html: String,
    /// `text/plain`.
    pub text: String,
}

impl ClipboardData {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            text: String::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            html: String::new(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    Paste,
    Drop,
}

/// Holds the loading flag up until dropped.
struct LoadingGuard(Rc<Cell<bool>>);

impl LoadingGuard {
    fn raise(flag: &Rc<Cell<bool>>) -> Self {
        flag.set(true);
        Self(flag.clone())
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Cleaned markup ready for the hooks, and whether it fits the character limit.
#[derive(Debug)]
struct Prepared {
    html: String,
    within_limit: bool,
}

impl Editor {
    /// Paste clipboard data at the caret.
    ///
    /// Returns true when something was inserted. A veto from a hook, a fragment over
    /// the character limit or a failing hook leaves the document and the history
    /// untouched.
    pub async fn paste(&mut self, data: ClipboardData) -> bool {
        self.transfer(TransferKind::Paste, data).await
    }

    /// Drop data at `at`, or at the current range. The current selection is removed
    /// first, as when text is dragged within the editor.
    pub async fn drop_data(&mut self, data: ClipboardData, at: Option<Range>) -> bool {
        if self.options.read_only {
            return false;
        }
        if let Err(err) = self.remove() {
            tracing::warn!(target: "verso::html", error = %err, "could not clear the selection before a drop");
        }
        if let Some(at) = at.filter(|r| r.is_live(&self.doc)) {
            self.set_range(at.start_container, at.start_offset, at.end_container, at.end_offset);
        }
        self.transfer(TransferKind::Drop, data).await
    }

    async fn transfer(&mut self, kind: TransferKind, data: ClipboardData) -> bool {
        if self.options.read_only || (data.html.is_empty() && data.text.is_empty()) {
            return false;
        }
        let _loading = LoadingGuard::raise(&self.status.loading);
        let Prepared { html, within_limit } = self.prepare(data);
        tracing::trace!(target: "verso::html", ?kind, within_limit, "clipboard data prepared");

        let event = match kind {
            TransferKind::Paste => EditorEvent::Paste {
                html: html.clone(),
                within_limit,
            },
            TransferKind::Drop => EditorEvent::Drop {
                html: html.clone(),
                within_limit,
            },
        };
        let html = match self.events.transfer(event).await {
            Ok(Outcome::Cancel) => {
                tracing::debug!(target: "verso::events", ?kind, "transfer vetoed by a hook");
                return false;
            }
            Ok(Outcome::Replace(replacement)) => replacement,
            Ok(Outcome::Continue) => html,
            Err(err) => {
                tracing::warn!(target: "verso::events", ?kind, error = %err, "transfer hook failed");
                return false;
            }
        };
        if !within_limit || html.is_empty() {
            return false;
        }

        match self.insert_html(&html, true, true, false) {
            Ok(inserted) => inserted,
            Err(err) => {
                tracing::warn!(target: "verso::html", ?kind, error = %err, "could not insert the transferred markup");
                false
            }
        }
    }

    fn prepare(&self, data: ClipboardData) -> Prepared {
        let ClipboardData { html, mut text } = data;
        let html = if html.is_empty() {
            let mut escaped = String::with_capacity(text.len());
            escape_text(&text, &mut escaped);
            escaped.replace('\n', "<br>")
        } else {
            let mut html = FRAGMENT_WRAPPER.replace_all(&html, "").into_owned();
            if OFFICE_MARKER.is_match(&html) {
                html = html.replace('\n', " ");
                text = text.replace('\n', " ");
            }
            self.caps.cleaner.clean(&html, false)
        };
        let within_limit = if self.options.char_counter_type == CharCounterType::ByteHtml {
            self.char_check(&html)
        } else {
            self.char_check(&text)
        };
        Prepared { html, within_limit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::{self, LocalBoxFuture};
    use verso_common::EditorOptions;
    use verso_editor_dom::query;

    use crate::error::EditorError;
    use crate::events::EditorHooks;

    fn editor(html: &str) -> Editor {
        Editor::new(EditorOptions::default()).unwrap().with_content(html).unwrap()
    }

    #[test]
    fn office_markup_loses_its_newlines() {
        let ed = editor("<p>a</p>");
        let data = ClipboardData {
            html: "<html>\n<body>\n<!--StartFragment--><p class=\"MsoNormal\">x\ny</p><!--EndFragment-->\n</body>\n</html>"
                .to_owned(),
            text: "x\ny".to_owned(),
        };
        let prepared = ed.prepare(data);
        assert!(prepared.html.contains("x y"), "{}", prepared.html);
        assert!(!prepared.html.contains("Fragment"));
        assert!(prepared.within_limit);
    }

    #[test]
    fn plain_text_is_escaped() {
        let ed = editor("<p>a</p>");
        let prepared = ed.prepare(ClipboardData::text("a<b\nc"));
        assert_eq!(prepared.html, "a&lt;b<br>c");
    }

    #[tokio::test]
    async fn paste_inserts_at_the_caret() {
        let mut ed = editor("<p>ab</p>");
        let t = query::node_from_path(&ed.doc, &[0, 0], ed.doc.root());
        ed.set_caret(t, 1);
        assert!(ed.paste(ClipboardData::text("X")).await);
        assert_eq!(ed.get_contents(), "<p>aXb</p>");
        assert!(!ed.is_loading());
    }

    #[tokio::test]
    async fn vetoed_paste_changes_nothing() {
        let mut ed = editor("<p>ab</p>");
        ed.events.set_user_hooks(|event: &EditorEvent| match event {
            EditorEvent::Paste { .. } => Outcome::Cancel,
            _ => Outcome::Continue,
        });
        assert!(!ed.paste(ClipboardData::html("<b>x</b>")).await);
        assert_eq!(ed.get_contents(), "<p>ab</p>");
        assert!(!ed.undo());
        assert!(!ed.is_loading());
    }

    /// Fails every transfer and remembers whether the editor was loading meanwhile.
    struct FailingHook {
        loading: Rc<Cell<bool>>,
        seen_loading: Rc<Cell<bool>>,
    }

    impl EditorHooks for FailingHook {
        fn on_transfer(&mut self, _event: &EditorEvent) -> LocalBoxFuture<'static, Result<Outcome<String>, EditorError>> {
            self.seen_loading.set(self.loading.get());
            Box::pin(future::ready(Err(EditorError::Hook("upload refused".to_owned()))))
        }
    }

    #[tokio::test]
    async fn failing_hook_aborts_the_paste() {
        let mut ed = editor("<p>ab</p>");
        let seen_loading = Rc::new(Cell::new(false));
        ed.events.set_user_hooks(FailingHook {
            loading: ed.status.loading.clone(),
            seen_loading: seen_loading.clone(),
        });
        let t = query::node_from_path(&ed.doc, &[0, 0], ed.doc.root());
        ed.set_caret(t, 1);

        assert!(!ed.paste(ClipboardData::html("<b>x</b>")).await);
        assert!(seen_loading.get());
        assert!(!ed.is_loading());
        assert_eq!(ed.get_contents(), "<p>ab</p>");
        assert!(!ed.undo());
    }

    #[tokio::test]
    async fn rejected_drop_changes_nothing() {
        let mut ed = editor("<p>ab</p>");
        ed.events.set_user_hooks(|event: &EditorEvent| match event {
            EditorEvent::Drop { .. } => Outcome::Cancel,
            _ => Outcome::Continue,
        });
        let t = query::node_from_path(&ed.doc, &[0, 0], ed.doc.root());
        ed.set_caret(t, 1);

        assert!(!ed.drop_data(ClipboardData::text("x"), None).await);
        assert_eq!(ed.get_contents(), "<p>ab</p>");
        assert!(!ed.is_loading());
    }

    #[tokio::test]
    async fn paste_over_the_limit_is_dropped() {
        let options = EditorOptions {
            max_char_count: Some(3),
            ..Default::default()
        };
        let mut ed = Editor::new(options).unwrap().with_content("<p>ab</p>").unwrap();
        assert!(!ed.paste(ClipboardData::text("xyz")).await);
        assert_eq!(ed.get_contents(), "<p>ab</p>");
    }
}
