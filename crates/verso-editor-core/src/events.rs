//! Typed editor events and the hooks that may veto or rewrite them.
//!
//! Listeners run in a fixed order: the user hooks first, then plugin hooks in
//! registration order. The first `Cancel` stops the chain and suppresses the
//! built-in behaviour.

use futures_util::future::{self, LocalBoxFuture};

use crate::component::ComponentInfo;
use crate::editor::Editor;
use crate::error::EditorError;
use crate::keys::KeyEvent;

/// What a listener wants done with an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Outcome<T> {
    #[default]
    Continue,
    Cancel,
    Replace(T),
}

impl<T> Outcome<T> {
    pub fn is_cancel(&self) -> bool {
        matches!(self, Outcome::Cancel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    Input { data: String },
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    /// Cleaned markup about to be pasted.
    Paste { html: String, within_limit: bool },
    Drop { html: String, within_limit: bool },
    Copy { component: Option<ComponentInfo> },
    Cut { component: Option<ComponentInfo> },
    Focus,
    Blur,
    Scroll,
}

impl EditorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EditorEvent::Input { .. } => "input",
            EditorEvent::KeyDown(_) => "keydown",
            EditorEvent::KeyUp(_) => "keyup",
            EditorEvent::Paste { .. } => "paste",
            EditorEvent::Drop { .. } => "drop",
            EditorEvent::Copy { .. } => "copy",
            EditorEvent::Cut { .. } => "cut",
            EditorEvent::Focus => "focus",
            EditorEvent::Blur => "blur",
            EditorEvent::Scroll => "scroll",
        }
    }

    fn with_html(self, replacement: String) -> Self {
        match self {
            EditorEvent::Paste { within_limit, .. } => EditorEvent::Paste {
                html: replacement,
                within_limit,
            },
            EditorEvent::Drop { within_limit, .. } => EditorEvent::Drop {
                html: replacement,
                within_limit,
            },
            other => other,
        }
    }
}

/// Listener interface for the user and for plugins.
///
/// `Replace` is only honoured for paste and drop, where it substitutes the markup.
pub trait EditorHooks {
    fn on_event(&mut self, _event: &EditorEvent) -> Outcome<String> {
        Outcome::Continue
    }

    /// Paste and drop hooks may wait on the host (a confirmation dialog, an upload).
    fn on_transfer(
        &mut self,
        event: &EditorEvent,
    ) -> LocalBoxFuture<'static, Result<Outcome<String>, EditorError>> {
        let outcome = self.on_event(event);
        Box::pin(future::ready(Ok(outcome)))
    }
}

impl<F> EditorHooks for F
where
    F: FnMut(&EditorEvent) -> Outcome<String>,
{
    fn on_event(&mut self, event: &EditorEvent) -> Outcome<String> {
        self(event)
    }
}

#[derive(Default)]
pub struct EventBus {
    user: Option<Box<dyn EditorHooks>>,
    plugins: Vec<Box<dyn EditorHooks>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("user", &self.user.is_some())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

impl EventBus {
    pub fn set_user_hooks(&mut self, hooks: impl EditorHooks + 'static) {
        self.user = Some(Box::new(hooks));
    }

    pub fn add_plugin(&mut self, hooks: impl EditorHooks + 'static) {
        self.plugins.push(Box::new(hooks));
    }

    fn listeners(&mut self) -> impl Iterator<Item = &mut Box<dyn EditorHooks>> {
        self.user.iter_mut().chain(self.plugins.iter_mut())
    }

    /// Run a synchronous event through every listener.
    pub fn emit(&mut self, event: &EditorEvent) -> Outcome<String> {
        let mut result = Outcome::Continue;
        for hooks in self.listeners() {
            match hooks.on_event(event) {
                Outcome::Cancel => {
                    tracing::trace!(target: "verso::events", event = event.name(), "event cancelled by a hook");
                    return Outcome::Cancel;
                }
                Outcome::Replace(value) => result = Outcome::Replace(value),
                Outcome::Continue => {}
            }
        }
        result
    }

    /// Run a paste or drop through every listener. A replacement is handed to the
    /// listeners after it; an empty replacement counts as a cancel.
    pub async fn transfer(&mut self, mut event: EditorEvent) -> Result<Outcome<String>, EditorError> {
        let mut replaced = None;
        for hooks in self.listeners() {
            match hooks.on_transfer(&event).await? {
                Outcome::Cancel => return Ok(Outcome::Cancel),
                Outcome::Replace(html) if html.is_empty() => return Ok(Outcome::Cancel),
                Outcome::Replace(html) => {
                    event = event.with_html(html.clone());
                    replaced = Some(html);
                }
                Outcome::Continue => {}
            }
        }
        Ok(replaced.map_or(Outcome::Continue, Outcome::Replace))
    }
}

impl Editor {
    pub fn focus(&mut self) {
        self.events.emit(&EditorEvent::Focus);
    }

    pub fn blur(&mut self) {
        self.menu.close();
        self.events.emit(&EditorEvent::Blur);
    }

    pub fn scroll(&mut self) {
        self.events.emit(&EditorEvent::Scroll);
    }

    /// Returns false if a hook vetoed the copy.
    pub fn copy(&mut self) -> bool {
        let component = self.selected_component().cloned();
        !self.events.emit(&EditorEvent::Copy { component }).is_cancel()
    }

    /// Let the hooks veto the cut. A selected component is removed by the editor;
    /// text removal is left to the host.
    pub fn cut(&mut self) -> bool {
        let component = self.selected_component().cloned();
        let event = EditorEvent::Cut {
            component: component.clone(),
        };
        if self.events.emit(&event).is_cancel() {
            return false;
        }
        if let Some(info) = component {
            let next = self
                .doc
                .next_element_sibling(info.container)
                .or_else(|| self.doc.prev_element_sibling(info.container));
            self.doc.detach(info.container);
            self.deselect_component();
            match next {
                Some(line) => {
                    let (sc, _) = verso_editor_dom::query::edge_child_nodes(&self.doc, line, None);
                    self.set_caret(sc, 0);
                }
                None => self.set_default_line(None),
            }
        }
        self.push_history(false);
        self.finish();
        true
    }
}
