//! Shared text helpers for the tide monitor

use regex::Regex;
use std::sync::LazyLock;

use crate::extract_error::ExtractError;

static FOOTNOTE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\*{1,3}\)").expect("footnote pattern is valid"));

/// Parse a numeric cell as published by the hydrographic service
///
/// Heights use a decimal comma ("1,23"). The comma is converted to a dot
/// before parsing. Surrounding whitespace is ignored.
///
/// # Examples
///
/// ```
/// use tide_monitor::utils::parse_decimal;
///
/// assert_eq!(parse_decimal("1,23").unwrap(), 1.23);
/// assert_eq!(parse_decimal(" -0,05 ").unwrap(), -0.05);
/// assert!(parse_decimal("abc").is_err());
/// ```
pub fn parse_decimal(value: &str) -> Result<f64, ExtractError> {
    let normalized = value.trim().replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ExtractError::UnparsableValue {
            field: "height",
            value: value.to_string(),
        })
}

/// Remove footnote markers "(*)", "(**)" and "(***)" from a gauge name
///
/// Only the markers are removed. Whitespace inside the name is kept as
/// published, since stored keys use the raw name (e.g. "Buenos  Aires").
///
/// ```
/// use tide_monitor::utils::strip_footnotes;
///
/// assert_eq!(strip_footnotes("Oyarvide(**)"), "Oyarvide");
/// assert_eq!(strip_footnotes("Buenos  Aires (*)"), "Buenos  Aires");
/// ```
pub fn strip_footnotes(value: &str) -> String {
    FOOTNOTE_MARKER.replace_all(value, "").trim().to_string()
}

/// Collapse a cell's text the way it is read off the page: line breaks removed, ends trimmed
pub fn clean_cell_text(value: &str) -> String {
    value.replace(['\r', '\n'], "").trim().to_string()
}
