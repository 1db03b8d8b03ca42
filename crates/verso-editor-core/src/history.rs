//! Undo/redo history for editor content.
//!
//! Provides:
//! - `History` trait for abstracting history implementations
//! - `SnapshotHistory` - whole-content snapshots with a debounced push

use serde::{Deserialize, Serialize};
use verso_editor_dom::Document;
use web_time::{Duration, Instant};

use crate::selection::{Range, RangePath};

/// One restorable state: the serialized content and where the range was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub content: String,
    pub range: RangePath,
}

/// Trait for recording and replaying editor states.
///
/// The history only stores snapshots. Restoring them into the tree is the
/// editor's job, so `undo`/`redo` hand the snapshot back.
pub trait History {
    /// Record the current content. A delayed push waits until the content has
    /// been still for the configured delay; pushing again renews the wait.
    fn push(&mut self, doc: &Document, range: Option<&Range>, delayed: bool);

    /// Commit a pending delayed push right now.
    fn check(&mut self, doc: &Document, range: Option<&Range>);

    /// Commit a pending delayed push if its deadline has passed. Returns true if
    /// something was committed.
    fn poll(&mut self, doc: &Document, now: Instant) -> bool;

    /// Step back. Returns the snapshot to restore.
    fn undo(&mut self) -> Option<Snapshot>;

    /// Step forward. Returns the snapshot to restore.
    fn redo(&mut self) -> Option<Snapshot>;

    fn can_undo(&self) -> bool;

    fn can_redo(&self) -> bool;

    /// Replace the current entry's content without adding a step.
    fn overwrite(&mut self, doc: &Document);

    /// Drop every entry and remember the current content as the initial state.
    fn reset(&mut self, doc: &Document);
}

#[derive(Debug, Clone)]
struct Pending {
    deadline: Instant,
    range: Option<RangePath>,
}

/// Snapshot stack with a debounce for typing.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    stack: Vec<Snapshot>,
    index: usize,
    initial: String,
    delay: Duration,
    max_steps: usize,
    pending: Option<Pending>,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(400, 100)
    }
}

impl SnapshotHistory {
    pub fn new(delay_ms: u64, max_steps: usize) -> Self {
        Self {
            stack: Vec::new(),
            index: 0,
            initial: String::new(),
            delay: Duration::from_millis(delay_ms),
            max_steps: max_steps.max(1),
            pending: None,
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    fn commit(&mut self, doc: &Document, range: Option<RangePath>) -> bool {
        let content = doc.inner_html(doc.root());
        if content.is_empty() || self.stack.get(self.index).is_some_and(|s| s.content == content) {
            return false;
        }
        if !self.stack.is_empty() {
            // Pushing after an undo discards the redo branch
            self.stack.truncate(self.index + 1);
        } else {
            self.stack.push(Snapshot {
                content: std::mem::take(&mut self.initial),
                range: RangePath::default(),
            });
        }
        self.stack.push(Snapshot {
            content,
            range: range.unwrap_or_default(),
        });

        // Trim if over max
        while self.stack.len() > self.max_steps {
            self.stack.remove(0);
        }
        self.index = self.stack.len() - 1;
        tracing::trace!(target: "verso::history", steps = self.stack.len(), "history snapshot stored");
        true
    }
}

impl History for SnapshotHistory {
    fn push(&mut self, doc: &Document, range: Option<&Range>, delayed: bool) {
        let range = range.map(|r| RangePath::from_range(doc, r));
        if !delayed || self.delay.is_zero() {
            self.pending = None;
            self.commit(doc, range);
            return;
        }
        self.pending = Some(Pending {
            deadline: Instant::now() + self.delay,
            range,
        });
    }

    fn check(&mut self, doc: &Document, range: Option<&Range>) {
        if self.pending.take().is_some() {
            let range = range.map(|r| RangePath::from_range(doc, r));
            self.commit(doc, range);
        }
    }

    fn poll(&mut self, doc: &Document, now: Instant) -> bool {
        match self.pending.take() {
            Some(p) if now >= p.deadline => self.commit(doc, p.range),
            other => {
                self.pending = other;
                false
            }
        }
    }

    fn undo(&mut self) -> Option<Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        self.stack.get(self.index).cloned()
    }

    fn redo(&mut self) -> Option<Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        self.stack.get(self.index).cloned()
    }

    fn can_undo(&self) -> bool {
        self.index > 0
    }

    fn can_redo(&self) -> bool {
        self.index + 1 < self.stack.len()
    }

    fn overwrite(&mut self, doc: &Document) {
        let content = doc.inner_html(doc.root());
        match self.stack.get_mut(self.index) {
            Some(top) => top.content = content,
            None => self.initial = content,
        }
    }

    fn reset(&mut self, doc: &Document) {
        self.stack.clear();
        self.index = 0;
        self.pending = None;
        self.initial = doc.inner_html(doc.root());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Document {
        Document::from_html(html).unwrap()
    }

    #[test]
    fn first_push_keeps_the_initial_state() {
        let mut history = SnapshotHistory::new(400, 10);
        history.reset(&doc("<p>a</p>"));
        assert!(!history.can_undo());

        history.push(&doc("<p>ab</p>"), None, false);
        assert_eq!(history.len(), 2);
        assert_eq!(history.undo().unwrap().content, "<p>a</p>");
        assert!(history.undo().is_none());
        assert_eq!(history.redo().unwrap().content, "<p>ab</p>");
    }

    #[test]
    fn unchanged_content_is_not_stored() {
        let mut history = SnapshotHistory::new(400, 10);
        history.reset(&doc("<p>a</p>"));
        history.push(&doc("<p>b</p>"), None, false);
        history.push(&doc("<p>b</p>"), None, false);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn pushing_after_undo_drops_redo() {
        let mut history = SnapshotHistory::new(400, 10);
        history.reset(&doc("<p>0</p>"));
        history.push(&doc("<p>1</p>"), None, false);
        history.push(&doc("<p>2</p>"), None, false);
        history.undo();
        assert!(history.can_redo());

        history.push(&doc("<p>3</p>"), None, false);
        assert!(!history.can_redo());
        let contents: Vec<_> = history.stack.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, ["<p>0</p>", "<p>1</p>", "<p>3</p>"]);
    }

    #[test]
    fn max_steps_drops_the_oldest() {
        let mut history = SnapshotHistory::new(400, 3);
        history.reset(&doc("<p>0</p>"));
        for i in 1..=5 {
            history.push(&doc(&format!("<p>{i}</p>")), None, false);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.stack[0].content, "<p>3</p>");
        assert_eq!(history.undo().unwrap().content, "<p>4</p>");
    }

    #[test]
    fn delayed_push_waits_for_the_deadline() {
        let mut history = SnapshotHistory::new(400, 10);
        history.reset(&doc("<p>a</p>"));
        let typed = doc("<p>ab</p>");
        history.push(&typed, None, true);
        assert!(!history.poll(&typed, Instant::now()));
        assert!(!history.can_undo());

        assert!(history.poll(&typed, Instant::now() + Duration::from_millis(500)));
        assert!(history.can_undo());
    }

    #[test]
    fn check_flushes_a_pending_push() {
        let mut history = SnapshotHistory::new(400, 10);
        history.reset(&doc("<p>a</p>"));
        let typed = doc("<p>ab</p>");
        history.push(&typed, None, true);
        history.check(&typed, None);
        assert!(history.can_undo());
        history.check(&typed, None);
        assert_eq!(history.len(), 2);
    }
}
