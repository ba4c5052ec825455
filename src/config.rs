//! Declarative filesystem layouts
//!
//! A layout is either described in JSON ([`FsConfig`]) or assembled in code
//! with [`FilesystemBuilder`]. Both end in the same `build` step, which
//! creates directories parent-first, then files, then host mounts.
//!
//! ```json
//! {
//!   "pathsep": "/",
//!   "directories": ["/etc", "/tmp"],
//!   "files": [{ "path": "/etc/hostname", "content": "box\n", "writable": false }],
//!   "mounts": [{ "path": "/srv", "host_path": "./fixtures", "writable": false }]
//! }
//! ```

use crate::directory::{Dir, Entry, DEFAULT_PATHSEP};
use crate::error::{FsError, Result};
use crate::file::{FileRef, MemoryFile};
use crate::types::Lookup;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Serializable description of a filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Path separator of the whole tree
    pub pathsep: char,
    /// Whether the root accepts new entries after the build
    pub writable: bool,
    /// Directories to create
    pub directories: Vec<String>,
    /// In-memory files to create
    pub files: Vec<FileConfig>,
    /// Host directories to mount
    pub mounts: Vec<MountConfig>,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            pathsep: DEFAULT_PATHSEP,
            writable: true,
            directories: Vec::new(),
            files: Vec::new(),
            mounts: Vec::new(),
        }
    }
}

/// One in-memory file of a layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Absolute virtual path
    pub path: String,
    /// UTF-8 content
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_writable")]
    pub writable: bool,
}

/// One host mount of a layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Absolute virtual path of the mount point
    pub path: String,
    /// Real directory to expose
    pub host_path: PathBuf,
    #[serde(default = "default_writable")]
    pub writable: bool,
}

fn default_writable() -> bool {
    true
}

impl FsConfig {
    /// Parse a layout from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON layout file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        debug!("Loaded filesystem layout from {:?}", path.as_ref());
        Self::from_json_str(&text)
    }

    /// Build the described tree
    pub fn build(&self) -> Result<Dir> {
        FilesystemBuilder::from_config(self).build()
    }
}

/// Builder for an in-memory tree with optional host mounts
///
/// # Examples
///
/// ```rust
/// use forkfs::FilesystemBuilder;
///
/// let root = FilesystemBuilder::new()
///     .directory("/etc")
///     .read_only_file("/etc/hostname", b"box\n".to_vec())
///     .file("/notes", b"".to_vec())
///     .build()?;
///
/// assert!(root.lookup("/etc/hostname", false)?.is_found());
/// # Ok::<(), forkfs::FsError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemBuilder {
    pathsep: char,
    writable: bool,
    directories: Vec<String>,
    files: Vec<(String, Vec<u8>, bool)>,
    mounts: Vec<(String, PathBuf, bool)>,
}

impl FilesystemBuilder {
    /// Start from an empty writable root using `/`
    pub fn new() -> Self {
        Self {
            pathsep: DEFAULT_PATHSEP,
            writable: true,
            directories: Vec::new(),
            files: Vec::new(),
            mounts: Vec::new(),
        }
    }

    /// Start from a parsed layout
    pub fn from_config(config: &FsConfig) -> Self {
        let mut builder = Self::new()
            .pathsep(config.pathsep)
            .writable(config.writable);
        for dir in &config.directories {
            builder = builder.directory(dir.clone());
        }
        for file in &config.files {
            builder.files.push((
                file.path.clone(),
                file.content.clone().into_bytes(),
                file.writable,
            ));
        }
        for mount in &config.mounts {
            builder = builder.mount(mount.path.clone(), mount.host_path.clone(), mount.writable);
        }
        builder
    }

    /// Set the path separator
    pub fn pathsep(mut self, pathsep: char) -> Self {
        self.pathsep = pathsep;
        self
    }

    /// Set whether the root stays writable once built
    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Add a directory
    pub fn directory(mut self, path: impl Into<String>) -> Self {
        self.directories.push(path.into());
        self
    }

    /// Add a writable in-memory file
    pub fn file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), content.into(), true));
        self
    }

    /// Add a read-only in-memory file
    pub fn read_only_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), content.into(), false));
        self
    }

    /// Mount the real directory `host_path` at `path`
    pub fn mount(mut self, path: impl Into<String>, host_path: impl Into<PathBuf>, writable: bool) -> Self {
        self.mounts.push((path.into(), host_path.into(), writable));
        self
    }

    /// Create the tree
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidConfiguration`] if an entry's parent does not
    ///   resolve to a directory or its name is already taken
    /// - [`FsError::Io`] if a mount source cannot be canonicalized
    pub fn build(self) -> Result<Dir> {
        let sep = self.pathsep;
        let root = Dir::with_options(true, sep);

        let mut directories = self.directories;
        directories.sort_by_key(|path| depth(path, sep));
        for path in &directories {
            if matches!(root.lookup(path, false)?, Lookup::Found(Entry::Dir(_))) {
                continue;
            }
            place(&root, path, Dir::with_options(true, sep).into())?;
        }

        for (path, content, writable) in self.files {
            let file = if writable {
                MemoryFile::new(content)
            } else {
                MemoryFile::read_only(content)
            };
            place(&root, &path, FileRef::new(file).into())?;
        }

        for (path, host_path, writable) in self.mounts {
            let mounted = Dir::host(&host_path, writable)?;
            place(&root, &path, mounted.into())?;
        }

        root.set_writable(self.writable);
        info!("Built filesystem with {} top-level entries", root.len().saturating_sub(2));
        Ok(root)
    }
}

impl Default for FilesystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn depth(path: &str, sep: char) -> usize {
    path.split(sep).filter(|segment| !segment.is_empty()).count()
}

fn place(root: &Dir, path: &str, entry: Entry) -> Result<()> {
    let trimmed = utils::strip_trailing_separators(path, root.pathsep());
    if trimmed.is_empty() || trimmed == root.pathsep().to_string() {
        return Err(FsError::invalid_configuration("cannot replace the root directory"));
    }
    if root.insert(trimmed, entry)? {
        debug!("Created {}", trimmed);
        Ok(())
    } else {
        Err(FsError::invalid_configuration(format!(
            "cannot create {}: parent missing or name taken",
            trimmed
        )))
    }
}
