//! Path utilities
//!
//! Paths are `/`-separated: the first segment names a top-level table,
//! middle segments name sub-tables, and the last segment names a value.
//! `SmartDashboard/autonomous/auto_modes` is the `auto_modes` key of the
//! `SmartDashboard/autonomous` table.

use crate::error::{NtError, NtResult};

/// Path separator
pub const SEPARATOR: char = '/';

/// Split a value path into its table path and key
///
/// Splits at the last separator. A path without a separator, or with an
/// empty table or key part, is malformed.
pub fn split_path(path: &str) -> NtResult<(&str, &str)> {
    let trimmed = path.trim_matches(SEPARATOR);
    match trimmed.rsplit_once(SEPARATOR) {
        Some((table, key)) if !table.is_empty() && !key.is_empty() => Ok((table, key)),
        _ => Err(NtError::invalid_path(path)),
    }
}

/// Join a table path and a key
pub fn join(table: &str, key: &str) -> String {
    format!(
        "{}{}{}",
        table.trim_end_matches(SEPARATOR),
        SEPARATOR,
        key.trim_start_matches(SEPARATOR)
    )
}

/// Normalise a table path (strip leading/trailing separators)
pub fn normalize_table(path: &str) -> &str {
    path.trim_matches(SEPARATOR)
}

/// Non-empty segments of a path
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|segment| !segment.is_empty())
}
