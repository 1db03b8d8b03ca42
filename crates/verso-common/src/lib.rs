//! Shared pieces of the verso editor workspace: error taxonomy, editor options and
//! tracing setup.

pub mod config;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::config::{CharCounterType, EditorOptions, FormatPatterns, RetainStyleMode};
pub use crate::error::{ParseError, ParseErrorKind, SerDeError, VersoError};
