//! Whitespace detection and normalization for metadata text fields.
//!
//! A value is dirty when it starts or ends with whitespace, or contains a run
//! of two or more whitespace characters anywhere. Cleaning collapses every
//! such run to a single space and trims both edges.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Two or more consecutive whitespace characters.
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// Leading run, trailing run, or interior run of two or more.
static OFFENDING_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+|\s+$|\s{2,}").unwrap());

/// Check whether a value needs cleaning.
pub fn needs_cleaning(value: &str) -> bool {
    WHITESPACE_RUN.is_match(value) || value.trim() != value
}

/// Like [`needs_cleaning`], treating an absent value as clean.
pub fn needs_cleaning_opt(value: Option<&str>) -> bool {
    value.is_some_and(needs_cleaning)
}

/// Collapse whitespace runs to one space and trim the edges.
///
/// Borrows the input when it is already clean.
pub fn clean(value: &str) -> Cow<'_, str> {
    if !needs_cleaning(value) {
        return Cow::Borrowed(value);
    }

    let collapsed = WHITESPACE_RUN.replace_all(value, " ");
    Cow::Owned(collapsed.trim().to_string())
}

/// A slice of the original string, flagged when it is offending whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub whitespace: bool,
}

/// Split a value into plain text and offending-whitespace segments.
///
/// Operates on the original (uncleaned) value; concatenating the segment
/// texts reproduces the input exactly.
pub fn highlight(value: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for found in OFFENDING_WHITESPACE.find_iter(value) {
        if found.start() > cursor {
            segments.push(Segment {
                text: &value[cursor..found.start()],
                whitespace: false,
            });
        }
        segments.push(Segment {
            text: found.as_str(),
            whitespace: true,
        });
        cursor = found.end();
    }

    if cursor < value.len() {
        segments.push(Segment {
            text: &value[cursor..],
            whitespace: false,
        });
    }

    segments
}
