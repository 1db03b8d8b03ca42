//! verso-editor-core: the selection-aware editing core.
//!
//! This crate provides:
//! - [`Editor`]: the context every operation runs against, split across modules as `impl Editor` blocks
//! - [`Format`]: line, block and inline classification of elements
//! - Selection, insertion and removal over the `verso-editor-dom` tree
//! - Key handling (`keys`), headless default actions (`native`) and paste/drop (`clipboard`)
//! - List and block commands, history, character counting, events and menu state

pub mod block;
pub mod char_counter;
pub mod clipboard;
pub mod component;
pub mod editor;
pub mod error;
pub mod events;
pub mod format;
pub mod history;
pub mod html;
pub mod keys;
pub mod list;
pub mod menu;
pub mod native;
pub mod selection;
pub mod transform;

pub use block::{BlockEdge, RemoveBlockOptions};
pub use char_counter::CharCounter;
pub use clipboard::ClipboardData;
pub use component::{ComponentInfo, ComponentRegistry, FigureRegistry};
pub use editor::{Capabilities, Editor};
pub use error::{EditorError, EditorResult};
pub use events::{EditorEvent, EditorHooks, EventBus, Outcome};
pub use format::Format;
pub use history::{History, Snapshot, SnapshotHistory};
pub use html::{BasicCleaner, EscapedTextInserter, FallbackInserter, HtmlCleaner, Inserted, RemoveResult};
pub use keys::{KeyEvent, KeyOutcome};
pub use list::NestDirection;
pub use menu::{ActiveMenu, ListenerHandle, MenuState};
pub use selection::{Range, RangePath};
pub use verso_common::EditorOptions;
pub use verso_editor_dom::{Document, NodeId};
