//! # forkfs - Fork-aware virtual filesystem
//!
//! A hierarchical namespace of directories and files that lives inside a
//! simulated execution state. Every time an execution path splits, the tree is
//! forked into independent copies; when paths join again, the copies are
//! merged back under the conditions that guarded each branch.
//!
//! ## Overview
//!
//! - In-memory directories hold named children and resolve `/`-separated
//!   paths, including `.` and `..`
//! - Host-backed directories expose a real directory read through, without
//!   copying it into memory
//! - Forking goes through a shared [`Memo`] so that shared structure stays
//!   shared and cyclic structure terminates
//! - Merging folds diverged copies into one tree, recursing down to the files
//! - A small [`SimState`] container drives the plugin lifecycle
//!
//! ## Quick Start
//!
//! ```rust
//! use forkfs::{Condition, Dir, FileRef, Lookup, MemoryFile, Memo};
//!
//! let root = Dir::new_root();
//! root.insert("etc", Dir::new_root().into())?;
//! root.insert("/etc/passwd", FileRef::new(MemoryFile::new(b"root:x:0:0".to_vec())).into())?;
//!
//! // Relative and absolute paths reach the same entry
//! let etc = root.lookup("etc", false)?.dir().unwrap();
//! assert!(etc.lookup("../etc/passwd", false)?.is_found());
//!
//! // A fork is fully independent of its origin
//! let branch = root.fork(&mut Memo::new());
//! branch.remove("/etc/passwd")?;
//! assert!(root.lookup("/etc/passwd", false)?.is_found());
//! assert!(matches!(branch.lookup("/etc/passwd", false)?, Lookup::NotFound));
//!
//! // Joining the branch back keeps the union of names
//! root.merge(&[branch], &[Condition::new("uid != 0")], None)?;
//! assert!(root.lookup("/etc/passwd", false)?.is_found());
//! # Ok::<(), forkfs::FsError>(())
//! ```
//!
//! ## Host mounts
//!
//! ```rust,no_run
//! use forkfs::FilesystemBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = FilesystemBuilder::new()
//!     .directory("/mnt")
//!     .mount("/mnt/src", "./src", false)
//!     .build()?;
//!
//! let lib = root.lookup("/mnt/src/lib.rs", false)?.file().unwrap();
//! println!("{} bytes", lib.concretize()?.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Limitations
//!
//! - Names that exist on only some branches cannot be made conditional; the
//!   merged tree holds them unconditionally and a warning is logged
//! - Host-backed directories are never merged; the real disk is shared by
//!   every branch
//! - Symbolic links are not modelled inside the in-memory tree
//!
//! ## Error Handling
//!
//! Path resolution reports missing and read-only targets through [`Lookup`].
//! Everything else returns `Result<T, FsError>`.
//!
//! ## Module Organization
//!
//! - [`directory`]: Directory handles, entries, insertion and removal
//! - [`file`]: The file contract and the in-memory and host file kinds
//! - [`plugin`]: Lifecycle trait, fork memo and default registry
//! - [`state`]: Minimal owning state container
//! - [`config`]: JSON layouts and the filesystem builder
//! - [`types`]: Conditions, state identifiers and lookup results
//! - [`error`]: Error types and handling

// Public API modules
pub mod config;
pub mod directory;
pub mod error;
pub mod file;
pub mod plugin;
pub mod state;
pub mod types;

// Internal modules (not part of public API)
mod host;
mod merge;
mod resolver;
mod utils;

// Re-export main types for convenience
pub use config::{FileConfig, FilesystemBuilder, FsConfig, MountConfig};
pub use directory::{Dir, Entry, DEFAULT_PATHSEP};
pub use error::{FsError, Result};
pub use file::{FileRef, HostFile, MemoryFile, SimFile};
pub use plugin::{Memo, PluginFactory, PluginRegistry, StatePlugin};
pub use state::{SimState, FS_SLOT};
pub use types::*;
