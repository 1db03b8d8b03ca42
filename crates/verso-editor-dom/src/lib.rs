//! verso-editor-dom: the node tree the editing core mutates.
//!
//! - [`Document`]: arena of nodes with DOM-style links and generational [`NodeId`]s
//! - [`html`]: fragment parser and `innerHTML` serializer
//! - [`query`]: stateless predicates and tree helpers
//! - [`unicode`], [`numbers`]: character and numeric primitives

pub mod document;
pub mod html;
pub mod numbers;
pub mod query;
pub mod unicode;

pub use document::{Ancestors, Children, DomError, DomResult, Document, NodeData, NodeId, ROOT_CLASS};
pub use smol_str::SmolStr;
pub use unicode::{NBSP, ZERO_WIDTH_SPACE, ZERO_WIDTH_STR};
