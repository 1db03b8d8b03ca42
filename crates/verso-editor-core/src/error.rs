//! Errors surfaced by the editing core.

use miette::Diagnostic;
use verso_common::ParseError;
use verso_editor_dom::DomError;

#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum EditorError {
    /// Structural misuse of the node tree.
    #[error(transparent)]
    #[diagnostic_source]
    Dom(#[from] DomError),

    /// Malformed HTML handed to an insertion API.
    #[error(transparent)]
    #[diagnostic_source]
    Parse(#[from] ParseError),

    #[error("insertion failed: {0}")]
    #[diagnostic(
        code(verso::insert),
        help("the fragment could not be inserted as markup nor as plain text")
    )]
    Insert(String),

    /// An event hook failed or rejected.
    #[error("event hook failed: {0}")]
    #[diagnostic(code(verso::hook))]
    Hook(String),

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(verso::config))]
    Config(String),
}

impl From<regex::Error> for EditorError {
    fn from(err: regex::Error) -> Self {
        EditorError::Config(err.to_string())
    }
}

pub type EditorResult<T> = Result<T, EditorError>;
