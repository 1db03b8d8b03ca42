//! Loose numeric parsing for attribute and style values.

use regex::Regex;
use std::sync::LazyLock;

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());
static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+(\.\d+)?").unwrap());

/// Whole-string numeric check, decimals allowed.
pub fn is_numeric(text: &str) -> bool {
    NUMERIC.is_match(text)
}

/// First numeric run in `text`.
///
/// `max_dec < 0` keeps full precision, `0` rounds to an integer, otherwise rounds
/// to `max_dec` decimal places. Returns `0.0` when nothing numeric is found.
pub fn get_number(text: &str, max_dec: i32) -> f64 {
    let Some(m) = FIRST_NUMBER.find(text) else {
        return 0.0;
    };
    let Ok(number) = m.as_str().parse::<f64>() else {
        return 0.0;
    };
    match max_dec {
        d if d < 0 => number,
        0 => number.round(),
        d => {
            let scale = 10f64.powi(d);
            (number * scale).round() / scale
        }
    }
}

/// Number of indexes shared by the inclusive ranges `a` and `b`.
pub fn overlap_at_index(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> i64 {
    let disjoint = if a_start <= b_end {
        a_end < b_start
    } else {
        a_end > b_start
    };
    if disjoint {
        return 0;
    }
    let overlap = a_start.max(b_start) - a_end.min(b_end);
    overlap.abs() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_checks() {
        assert!(is_numeric("12"));
        assert!(is_numeric("-1.5"));
        assert!(!is_numeric("12px"));
        assert!(!is_numeric(".5"));
    }

    #[test]
    fn first_number_extraction() {
        assert_eq!(get_number("margin: 25.6px", 0), 26.0);
        assert_eq!(get_number("25.66px", 1), 25.7);
        assert_eq!(get_number("-3.25em", -1), -3.25);
        assert_eq!(get_number("none", 0), 0.0);
    }

    #[test]
    fn overlap() {
        assert_eq!(overlap_at_index(1, 5, 4, 6), 2);
        assert_eq!(overlap_at_index(1, 2, 4, 6), 0);
    }
}
