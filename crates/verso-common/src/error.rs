//! Error types shared across the verso crates.

use miette::{Diagnostic, NamedSource, SourceOffset, SourceSpan};
use std::borrow::Cow;

/// Main error type for verso operations that cross crate boundaries.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum VersoError {
    /// HTML parse error with source location
    #[error(transparent)]
    #[diagnostic_source]
    Parse(#[from] ParseError),

    /// Serialization/deserialization error
    #[error(transparent)]
    #[diagnostic_source]
    Serde(#[from] SerDeError),

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid or unsupported configuration
    #[error("invalid configuration: {0}")]
    #[diagnostic(code(verso::config))]
    Config(String),
}

/// Parse error with source code location information
#[derive(thiserror::Error, Debug, Diagnostic)]
#[error("parse error: {}", self.kind)]
#[diagnostic(code(verso::parse))]
pub struct ParseError {
    #[diagnostic_source]
    kind: ParseErrorKind,
    #[source_code]
    src: NamedSource<Cow<'static, str>>,
    #[label("here")]
    err_location: SourceSpan,
    #[help]
    advice: Option<String>,
}

impl ParseError {
    /// Build an error pointing at `len` bytes starting at byte `offset` of `source`.
    pub fn new(kind: ParseErrorKind, source: &str, offset: usize, len: usize) -> Self {
        let src = NamedSource::new("fragment", Cow::Owned(source.to_owned()));
        Self {
            kind,
            src,
            err_location: SourceSpan::new(SourceOffset::from(offset), len),
            advice: None,
        }
    }

    pub fn with_advice(mut self, advice: impl Into<String>) -> Self {
        self.advice = Some(advice.into());
        self
    }

    /// Rename the source shown in diagnostics.
    pub fn with_source_name(self, name: impl AsRef<str>) -> Self {
        let inner = self.src.inner().clone();
        Self {
            src: NamedSource::new(name, inner),
            ..self
        }
    }

    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Byte offset of the offending input.
    pub fn offset(&self) -> usize {
        self.err_location.offset()
    }

    /// One-based line and zero-based column of the offending input.
    pub fn line_col(&self) -> (usize, usize) {
        offset_to_line_col(self.err_location.offset(), self.src.inner())
    }
}

#[derive(thiserror::Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseErrorKind {
    #[error("unterminated tag <{0}")]
    UnterminatedTag(String),
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("unterminated attribute value in <{0}>")]
    UnterminatedAttribute(String),
    #[error("invalid tag name")]
    InvalidTagName,
}

/// Serialization/deserialization errors
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum SerDeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl From<serde_json::Error> for VersoError {
    fn from(err: serde_json::Error) -> Self {
        VersoError::Serde(SerDeError::Json(err))
    }
}

impl From<toml::de::Error> for VersoError {
    fn from(err: toml::de::Error) -> Self {
        VersoError::Serde(SerDeError::TomlDe(err))
    }
}

impl From<toml::ser::Error> for VersoError {
    fn from(err: toml::ser::Error) -> Self {
        VersoError::Serde(SerDeError::TomlSer(err))
    }
}

fn offset_to_line_col(offset: usize, src: &str) -> (usize, usize) {
    let mut acc = 0usize;

    for (i, line) in src.split_inclusive('\n').enumerate() {
        let start = acc;
        acc += line.len();
        if offset < acc {
            let line_offset = offset - start;
            let col = line
                .char_indices()
                .take_while(|(byte_idx, _)| *byte_idx < line_offset)
                .count();
            return (i + 1, col);
        }
    }
    (src.lines().count().max(1), 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_from_one() {
        let err = ParseError::new(
            ParseErrorKind::UnterminatedComment,
            "<p>a</p>\n<!-- open",
            9,
            4,
        );
        assert_eq!(err.line_col(), (2, 0));
        assert_eq!(err.offset(), 9);
    }

    #[test]
    fn parse_error_renders_kind() {
        let err = ParseError::new(
            ParseErrorKind::UnterminatedTag("span".into()),
            "<span",
            0,
            5,
        )
        .with_advice("close the tag with `>`");
        assert_eq!(err.to_string(), "parse error: unterminated tag <span");
        assert_eq!(err.kind(), &ParseErrorKind::UnterminatedTag("span".into()));
    }

    #[test]
    fn serde_errors_convert() {
        let err: VersoError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, VersoError::Serde(SerDeError::Json(_))));
    }
}
