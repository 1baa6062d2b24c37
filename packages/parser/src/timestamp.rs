//! The fixed console timestamp format shared by both parsers.
//!
//! Units print timestamps as `Www Mmm DD HH:MM:SS YYYY ZZZ`, with the
//! day-of-month space-padded below 10 (`Tue Mar  5 ...`).

use std::sync::LazyLock;

use regex::Regex;

/// Matches one console timestamp anywhere in a line.
pub static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\w{3} \w{3} (?:\d{2}| \d) \d{2}:\d{2}:\d{2} \d{4} \w{3}\b")
        .expect("valid regex")
});

/// Returns every timestamp in `text`, in order.
#[must_use]
pub fn find_timestamps(text: &str) -> Vec<&str> {
    TIMESTAMP_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Removes every timestamp from `text`.
#[must_use]
pub fn strip_timestamps(text: &str) -> String {
    TIMESTAMP_RE.replace_all(text, "").into_owned()
}
