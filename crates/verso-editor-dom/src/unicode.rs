//! Zero-width sentinel and other reserved characters.

/// Invisible caret anchor used in otherwise empty positions.
pub const ZERO_WIDTH_SPACE: char = '\u{200B}';
pub const ZERO_WIDTH_STR: &str = "\u{200B}";
pub const NBSP: char = '\u{00A0}';

/// True if `text` is empty or made only of zero-width spaces.
pub fn is_zero_width(text: &str) -> bool {
    text.chars().all(|c| c == ZERO_WIDTH_SPACE)
}

pub fn strip_zero_width(text: &str) -> String {
    text.replace(ZERO_WIDTH_SPACE, "")
}

/// Number of zero-width spaces in `text`.
pub fn count_zero_width(text: &str) -> usize {
    text.chars().filter(|c| *c == ZERO_WIDTH_SPACE).count()
}

/// Escape a literal for use inside a regex pattern.
pub fn escape_regex(text: &str) -> String {
    regex::escape(text)
}
