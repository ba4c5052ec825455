//! Path string helpers shared by the resolver and the directory operations
//!
//! Paths in the virtual namespace are plain strings delimited by a per-tree
//! separator character; they are never `std::path::Path`s, since the
//! separator is configurable and the namespace is not the host's.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use crate::utils::{strip_trailing_separators, split_last_segment};
//!
//! assert_eq!(strip_trailing_separators("/etc//", '/'), "/etc");
//! assert_eq!(split_last_segment("/etc/passwd", '/'), Some(("/etc/", "passwd")));
//! ```

/// Drop trailing separators, keeping a lone separator intact
///
/// `"a/b//"` becomes `"a/b"`, while `"/"` and `"//"` both become `"/"`.
pub fn strip_trailing_separators(path: &str, sep: char) -> &str {
    let trimmed = path.trim_end_matches(sep);
    if trimmed.is_empty() && !path.is_empty() {
        &path[..sep.len_utf8()]
    } else {
        trimmed
    }
}

/// Drop leading separators
pub fn strip_leading_separators(path: &str, sep: char) -> &str {
    path.trim_start_matches(sep)
}

/// Split at the last separator into `(head, tail)`
///
/// The head keeps its trailing separator so that `"/name"` splits into
/// `("/", "name")` and the head still resolves to the root. Returns `None`
/// when the path holds no separator at all.
pub fn split_last_segment(path: &str, sep: char) -> Option<(&str, &str)> {
    path.rfind(sep).map(|idx| {
        let cut = idx + sep.len_utf8();
        (&path[..cut], &path[cut..])
    })
}

/// Split off the first path segment
///
/// Returns the segment and, if a separator followed it, the remainder after
/// exactly one separator.
pub fn split_first_segment(path: &str, sep: char) -> (&str, Option<&str>) {
    match path.split_once(sep) {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    }
}

/// Check whether `name` can be stored as a directory entry
///
/// Entry names are non-empty, carry no separator and are never one of the
/// reserved `.` / `..` links.
pub fn is_valid_entry_name(name: &str, sep: char) -> bool {
    !name.is_empty() && !name.contains(sep) && name != "." && name != ".."
}
