//! Character limit checks.

use verso_common::CharCounterType;
use verso_editor_dom::unicode::strip_zero_width;
use verso_editor_dom::{Document, NodeId};

use crate::editor::Editor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharCounter {
    max: Option<usize>,
    kind: CharCounterType,
}

/// UTF-8 length plus one per line break, which a URI encoding would count twice.
fn byte_length(text: &str) -> usize {
    text.len() + text.chars().filter(|c| matches!(c, '\n' | '\r')).count()
}

impl CharCounter {
    pub fn new(max: Option<usize>, kind: CharCounterType) -> Self {
        Self {
            max: max.filter(|m| *m > 0),
            kind,
        }
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Length of `text` in the configured unit.
    pub fn length_of(&self, text: &str) -> usize {
        match self.kind {
            CharCounterType::Char => text.chars().count(),
            CharCounterType::Byte | CharCounterType::ByteHtml => byte_length(text),
        }
    }

    /// Length of the current content. Zero-width sentinels are not counted.
    pub fn current(&self, doc: &Document) -> usize {
        let content = match self.kind {
            CharCounterType::ByteHtml => doc.inner_html(doc.root()),
            _ => doc.text_content(doc.root()),
        };
        self.length_of(&strip_zero_width(&content))
    }

    /// False if adding `addition` would pass the limit. Empty additions always pass.
    pub fn check(&self, doc: &Document, addition: &str) -> bool {
        let Some(max) = self.max else {
            return true;
        };
        let length = self.length_of(addition);
        !(length > 0 && length + self.current(doc) > max)
    }

    /// What `node` adds to the count: its outer markup when counting `byte-html`, its text otherwise.
    pub fn addition_of(&self, doc: &Document, node: NodeId) -> String {
        match self.kind {
            CharCounterType::ByteHtml if doc.is_element(node) => doc.outer_html(node),
            _ => doc.text_content(node),
        }
    }

    /// [`check`](Self::check) for a node, measured by [`addition_of`](Self::addition_of).
    pub fn check_node(&self, doc: &Document, node: NodeId) -> bool {
        self.check(doc, &self.addition_of(doc, node))
    }
}

impl Editor {
    /// Check typed `input` against the limit after it reached the tree. When the
    /// content is already over the limit, the overflow before the caret is cut from
    /// the caret's text node.
    ///
    /// Returns false if the input should be refused.
    pub fn char_test(&mut self, input: &str) -> bool {
        let Some(max) = self.counter.max() else {
            return true;
        };
        let next = self.counter.length_of(input);
        let count = self.counter.current(&self.doc);

        if count > max {
            if next > 0 {
                self.trim_overflow(count - max);
                tracing::debug!(target: "verso::keys", count, max, "input trimmed to the character limit");
                return false;
            }
            return true;
        }
        !(next > 0 && count + next > max)
    }

    fn trim_overflow(&mut self, over: usize) {
        self.init_selection();
        let range = self.get_range();
        let node = range.end_container;
        let Some(text) = self.doc.text(node).map(str::to_owned) else {
            return;
        };
        let end = range.end_offset;
        let cut = end.saturating_sub(over);
        let kept: String = text
            .chars()
            .take(cut)
            .chain(text.chars().skip(end))
            .collect();
        self.doc.set_text(node, kept);
        self.set_caret(node, cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_common::EditorOptions;

    #[test]
    fn lengths_by_unit() {
        let chars = CharCounter::new(None, CharCounterType::Char);
        let bytes = CharCounter::new(None, CharCounterType::Byte);
        assert_eq!(chars.length_of("héllo"), 5);
        assert_eq!(bytes.length_of("héllo"), 6);
        assert_eq!(bytes.length_of("a\nb"), 4);
    }

    #[test]
    fn check_respects_the_limit() {
        let doc = Document::from_html("<p>abc\u{200B}</p>").unwrap();
        let counter = CharCounter::new(Some(5), CharCounterType::Char);
        assert_eq!(counter.current(&doc), 3);
        assert!(counter.check(&doc, "de"));
        assert!(!counter.check(&doc, "def"));
        assert!(counter.check(&doc, ""));
    }

    #[test]
    fn html_mode_counts_markup() {
        let doc = Document::from_html("<p>a</p>").unwrap();
        let counter = CharCounter::new(Some(10), CharCounterType::ByteHtml);
        assert_eq!(counter.current(&doc), 8);
        assert!(!counter.check(&doc, "<b>x</b>"));
    }

    #[test]
    fn char_test_trims_overflow_before_the_caret() {
        let options = EditorOptions {
            max_char_count: Some(3),
            ..Default::default()
        };
        let mut ed = Editor::new(options).unwrap().with_content("<p>abcde</p>").unwrap();
        let p = ed.doc.first_child(ed.doc.root()).unwrap();
        let text = ed.doc.first_child(p).unwrap();
        ed.set_caret(text, 5);

        assert!(!ed.char_test("de"));
        assert_eq!(ed.get_contents(), "<p>abc</p>");
        assert_eq!(ed.get_range(), crate::selection::Range::caret(text, 3));
    }
}
