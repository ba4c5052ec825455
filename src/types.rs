//! Core data types used throughout the forkfs library
//!
//! This module contains the small value types that flow between the
//! filesystem and its collaborators.
//!
//! ## Overview
//!
//! - **Guards**: [`Condition`] - the opaque branch condition threaded through merges
//! - **Ownership**: [`StateId`] - the non-owning handle naming the owning state
//! - **Resolution**: [`Lookup`] - the tristate result of path resolution
//!
//! ## Examples
//!
//! ```rust
//! use forkfs::types::{Condition, Lookup};
//! use forkfs::Dir;
//!
//! let root = Dir::new_root();
//! assert!(matches!(root.lookup("/missing", false), Ok(Lookup::NotFound)));
//!
//! let guard = Condition::new("x > 5");
//! assert_eq!(guard.as_str(), "x > 5");
//! ```

use crate::directory::{Dir, Entry};
use crate::file::FileRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Opaque branch condition guarding one side of a merge
///
/// Produced by the symbolic engine that drives the filesystem. The filesystem
/// never evaluates a condition, it only hands it down to file-level merges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Condition(Rc<str>);

impl Condition {
    /// Wrap a textual guard expression
    pub fn new(expr: impl AsRef<str>) -> Self {
        Condition(Rc::from(expr.as_ref()))
    }

    /// The guard expression as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-owning handle to the state container that owns a tree snapshot
///
/// Holding a `StateId` never keeps the state alive; it only names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(Uuid);

impl StateId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        StateId(Uuid::new_v4())
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of resolving a path
///
/// `NotFound` and `NotWritable` are ordinary outcomes, not errors, and are
/// never conflated: a path can exist and still refuse a write.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// The path resolved to an entry
    Found(Entry),
    /// Nothing lives at the path
    NotFound,
    /// The path resolved, but the target forbids the requested write
    NotWritable,
}

impl Lookup {
    /// Check whether the path resolved
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Consume the result, keeping only a resolved entry
    pub fn entry(self) -> Option<Entry> {
        match self {
            Lookup::Found(entry) => Some(entry),
            _ => None,
        }
    }

    /// Consume the result, keeping only a resolved directory
    pub fn dir(self) -> Option<Dir> {
        self.entry().and_then(Entry::into_dir)
    }

    /// Consume the result, keeping only a resolved file
    pub fn file(self) -> Option<FileRef> {
        self.entry().and_then(Entry::into_file)
    }
}
