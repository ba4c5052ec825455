//! Path resolution shared by both directory variants
//!
//! Resolution walks one segment at a time. A segment only matches a child
//! whose name is followed by the end of the path or by exactly one
//! separator, so `foo` never matches the front of `foobar`. In-memory
//! directories consume segments here; host-backed directories take over the
//! rest of the walk as soon as it reaches them.

use crate::directory::{Dir, Entry};
use crate::error::Result;
use crate::host;
use crate::types::Lookup;
use crate::utils;
use tracing::trace;

/// Resolve `path` from `start`, restarting at the root for absolute paths
pub(crate) fn lookup(start: &Dir, path: &str, writing: bool) -> Result<Lookup> {
    if path.is_empty() {
        return Ok(Lookup::NotFound);
    }
    let sep = start.pathsep();
    let path = utils::strip_trailing_separators(path, sep);
    match path.strip_prefix(sep) {
        Some(rest) => resolve(&start.root(), rest, writing),
        None => resolve(start, path, writing),
    }
}

/// Resolve `path` relative to `dir`
pub(crate) fn resolve(dir: &Dir, path: &str, writing: bool) -> Result<Lookup> {
    if dir.is_host() {
        return host::resolve(dir, path, writing);
    }

    let path = utils::strip_leading_separators(path, dir.pathsep());
    if path.is_empty() {
        return Ok(permit(Entry::Dir(dir.clone()), writing));
    }
    // Writing below a read-only directory is refused as a whole
    if writing && !dir.writable() {
        return Ok(Lookup::NotWritable);
    }

    let (segment, rest) = utils::split_first_segment(path, dir.pathsep());
    let Some(child) = dir.child(segment) else {
        trace!("No entry named {:?}", segment);
        return Ok(Lookup::NotFound);
    };

    match (rest, child) {
        (None, child) => Ok(permit(child, writing)),
        (Some(rest), Entry::Dir(sub)) => resolve(&sub, rest, writing),
        // Symbolic links are not modelled; a file cannot have children
        (Some(_), Entry::File(_)) => Ok(Lookup::NotFound),
    }
}

fn permit(entry: Entry, writing: bool) -> Lookup {
    if writing && !entry.writable() {
        Lookup::NotWritable
    } else {
        Lookup::Found(entry)
    }
}
