//! Host-backed directories
//!
//! A host-backed directory mirrors a subtree of the real filesystem. It keeps
//! no children of its own: every lookup walks the host namespace and
//! synthesizes a transient directory or a [`HostFile`] for the target.
//!
//! The walk is bounded by the mount's host root. A `..` taken while standing
//! on the host root is handed, together with the rest of the path, to the
//! virtual directory the mount was inserted into; a canonicalized path that
//! lands outside the host root (through a symlink, say) does not resolve.
//!
//! ```text
//! /                      virtual
//! └── mnt  -> /srv/data  host root
//!     └── logs           transient, host_path /srv/data/logs
//!
//! lookup("/mnt/logs/../../etc") : /srv/data/logs -> /srv/data -> hand off "etc" to /
//! ```

use crate::directory::{Dir, DirKind, Entry};
use crate::error::{FsError, Result};
use crate::file::{FileRef, HostFile};
use crate::resolver;
use crate::types::Lookup;
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Create a detached host-backed root over `host_path`
pub(crate) fn mount(host_path: &Path, writable: bool, pathsep: char) -> Result<Dir> {
    let host_path = fs::canonicalize(host_path)?;
    if !host_path.is_dir() {
        return Err(FsError::invalid_configuration(format!(
            "mount source {} is not a directory",
            host_path.display()
        )));
    }
    debug!("Mounting host directory {:?} (writable: {})", host_path, writable);
    Ok(Dir::new_node(
        DirKind::Host {
            host_root: host_path.clone(),
            host_path,
        },
        writable,
        pathsep,
        None,
    ))
}

fn host_paths(dir: &Dir) -> Option<(PathBuf, PathBuf)> {
    match &dir.0.borrow().kind {
        DirKind::Host { host_path, host_root } => Some((host_path.clone(), host_root.clone())),
        DirKind::Memory { .. } => None,
    }
}

/// Host names must be a single component on the host as well
fn is_host_name(name: &str, sep: char) -> bool {
    utils::is_valid_entry_name(name, sep) && !name.contains('/') && !name.contains(std::path::MAIN_SEPARATOR)
}

/// Resolve `path` against the host namespace below `dir`
pub(crate) fn resolve(dir: &Dir, path: &str, writing: bool) -> Result<Lookup> {
    let Some((host_path, host_root)) = host_paths(dir) else {
        return Ok(Lookup::NotFound);
    };
    let sep = dir.pathsep();
    let segments: Vec<&str> = path.split(sep).collect();

    let mut partial = host_path.clone();
    for (idx, segment) in segments.iter().enumerate() {
        if *segment == ".." && partial == host_root {
            let parent = dir.parent();
            if parent.ptr_eq(dir) {
                // Unmounted: `..` of the root is the root
                continue;
            }
            let rest = segments[idx + 1..].join(&sep.to_string());
            trace!("Leaving host root {:?}, resolving {:?} in the virtual parent", host_root, rest);
            return resolver::resolve(&parent, &rest, writing);
        }
        if !partial.is_dir() {
            return Ok(Lookup::NotFound);
        }
        if segment.is_empty() || *segment == "." {
            continue;
        }

        partial = match fs::canonicalize(partial.join(segment)) {
            Ok(real) => real,
            Err(_) => return Ok(Lookup::NotFound),
        };
        if !partial.starts_with(&host_root) {
            trace!("Host path {:?} escapes root {:?}", partial, host_root);
            return Ok(Lookup::NotFound);
        }
    }

    let writable = dir.writable();
    if writing && !writable {
        return Ok(Lookup::NotWritable);
    }
    if partial == host_path {
        return Ok(Lookup::Found(Entry::Dir(dir.clone())));
    }

    let metadata = match fs::metadata(&partial) {
        Ok(metadata) => metadata,
        Err(_) => return Ok(Lookup::NotFound),
    };
    let owner = dir.owner();
    if metadata.is_dir() {
        let virtual_parent = dir.parent();
        let sub = Dir::new_node(
            DirKind::Host {
                host_path: partial,
                host_root,
            },
            writable,
            sep,
            Some(virtual_parent.downgrade()),
        );
        sub.attach(owner);
        Ok(Lookup::Found(Entry::Dir(sub)))
    } else if metadata.is_file() {
        match HostFile::open(&partial, writable) {
            Ok(file) => {
                let file = FileRef::new(file);
                file.attach(owner);
                Ok(Lookup::Found(Entry::File(file)))
            }
            Err(e) => {
                trace!("Cannot open host file {:?}: {}", partial, e);
                Ok(Lookup::NotFound)
            }
        }
    } else {
        Err(FsError::UnsupportedHostNode { path: partial })
    }
}

/// Create `name` on the host: a directory for a directory entry, otherwise
/// a file holding the entry's concrete content
pub(crate) fn insert_child(dir: &Dir, name: &str, entry: Entry) -> Result<bool> {
    let Some((host_path, _)) = host_paths(dir) else {
        return Ok(false);
    };
    if !is_host_name(name, dir.pathsep()) || !dir.writable() {
        return Ok(false);
    }

    let full = host_path.join(name);
    if fs::symlink_metadata(&full).is_ok() {
        return Ok(false);
    }

    let outcome = match &entry {
        // Only the directory itself is created on disk
        Entry::Dir(sub) if !sub.is_empty() => {
            trace!("Refusing to copy populated directory into {:?}", full);
            return Ok(false);
        }
        Entry::Dir(_) => fs::create_dir(&full),
        Entry::File(file) => match file.concretize() {
            Ok(bytes) => fs::write(&full, bytes),
            Err(e) => {
                trace!("Cannot concretize {} for {:?}: {}", file.kind_name(), full, e);
                return Ok(false);
            }
        },
    };
    match outcome {
        Ok(()) => {
            trace!("Created host entry {:?}", full);
            Ok(true)
        }
        Err(e) => {
            trace!("Failed to create host entry {:?}: {}", full, e);
            Ok(false)
        }
    }
}

/// Remove `name` from the host; directories must be empty
pub(crate) fn remove_child(dir: &Dir, name: &str) -> Result<bool> {
    let Some((host_path, _)) = host_paths(dir) else {
        return Ok(false);
    };
    if !is_host_name(name, dir.pathsep()) || !dir.writable() {
        return Ok(false);
    }

    let full = host_path.join(name);
    let Ok(metadata) = fs::metadata(&full) else {
        return Ok(false);
    };
    let outcome = if metadata.is_dir() {
        fs::remove_dir(&full)
    } else if metadata.is_file() {
        fs::remove_file(&full)
    } else {
        return Err(FsError::UnsupportedHostNode { path: full });
    };
    match outcome {
        Ok(()) => {
            trace!("Removed host entry {:?}", full);
            Ok(true)
        }
        Err(e) => {
            trace!("Failed to remove host entry {:?}: {}", full, e);
            Ok(false)
        }
    }
}
