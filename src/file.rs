//! Leaf payloads stored in the directory tree
//!
//! The filesystem treats file contents as an external collaborator: it only
//! relies on the [`SimFile`] contract. Two implementations ship with the
//! crate:
//!
//! - [`MemoryFile`]: bytes held in memory, with merge alternatives and widened
//!   candidates
//! - [`HostFile`]: a thin wrapper over a real file, produced by host-backed
//!   directories

use crate::error::{FsError, Result};
use crate::plugin::Memo;
use crate::directory::Entry;
use crate::types::{Condition, StateId};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::trace;

/// Contract the filesystem relies on for leaf entries
pub trait SimFile: fmt::Debug {
    /// Human readable kind, used in merge type errors
    fn kind_name(&self) -> &'static str;

    /// Independent copy with no owner attached
    ///
    /// [`FileRef::fork`] handles the memo lookup and registration; this only
    /// builds the copy.
    fn fork(&self, memo: &mut Memo) -> FileRef;

    /// Fold `others` into `self`, each guarded by the matching condition
    fn merge(
        &mut self,
        others: &[FileRef],
        conditions: &[Condition],
        ancestor: Option<&FileRef>,
    ) -> Result<bool>;

    /// Generalize `self` to cover every one of `others`
    fn widen(&mut self, others: &[FileRef]) -> Result<bool>;

    /// Record the owning state
    fn attach(&mut self, owner: Option<StateId>);

    /// Owning state, if attached
    fn owner(&self) -> Option<StateId>;

    /// Whether writes to the file are allowed
    fn writable(&self) -> bool;

    /// The file's content as bytes
    fn concretize(&self) -> Result<Vec<u8>>;

    /// Access to the concrete type for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a leaf payload
#[derive(Clone)]
pub struct FileRef(Rc<RefCell<dyn SimFile>>);

impl FileRef {
    /// Wrap a file payload
    pub fn new<F: SimFile + 'static>(file: F) -> Self {
        FileRef(Rc::new(RefCell::new(file)))
    }

    /// Immutable access to the payload
    pub fn borrow(&self) -> Ref<'_, dyn SimFile> {
        self.0.borrow()
    }

    /// Mutable access to the payload
    pub fn borrow_mut(&self) -> RefMut<'_, dyn SimFile> {
        self.0.borrow_mut()
    }

    /// Borrow the payload as a concrete type
    pub fn downcast<T: SimFile + 'static>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.0.borrow(), |file| file.as_any().downcast_ref::<T>()).ok()
    }

    /// Check whether both handles point at the same payload
    pub fn ptr_eq(&self, other: &FileRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn memo_key(&self) -> usize {
        Memo::key_of(&self.0)
    }

    /// Kind of the payload
    pub fn kind_name(&self) -> &'static str {
        self.0.borrow().kind_name()
    }

    /// Whether writes to the file are allowed
    pub fn writable(&self) -> bool {
        self.0.borrow().writable()
    }

    /// Owning state, if attached
    pub fn owner(&self) -> Option<StateId> {
        self.0.borrow().owner()
    }

    /// The file's content as bytes
    pub fn concretize(&self) -> Result<Vec<u8>> {
        self.0.borrow().concretize()
    }

    /// Record the owning state
    pub fn attach(&self, owner: Option<StateId>) {
        self.0.borrow_mut().attach(owner);
    }

    /// Memoized copy of the payload
    pub fn fork(&self, memo: &mut Memo) -> FileRef {
        let key = self.memo_key();
        if let Some(Entry::File(copy)) = memo.get(key) {
            return copy.clone();
        }
        let copy = self.0.borrow().fork(memo);
        memo.insert(key, Entry::File(copy.clone()));
        copy
    }

    /// Merge siblings into this payload
    ///
    /// Siblings that are this very payload are dropped along with their
    /// conditions: folding a file into itself changes nothing. Fails with
    /// [`FsError::ConditionCount`] unless each sibling has a condition.
    pub fn merge(
        &self,
        others: &[FileRef],
        conditions: &[Condition],
        ancestor: Option<&FileRef>,
    ) -> Result<bool> {
        FsError::check_condition_count(others.len(), conditions.len())?;
        let (siblings, guards): (Vec<FileRef>, Vec<Condition>) = others
            .iter()
            .zip(conditions)
            .filter(|(other, _)| !other.ptr_eq(self))
            .map(|(other, condition)| (other.clone(), condition.clone()))
            .unzip();
        let ancestor = ancestor.filter(|a| !a.ptr_eq(self));
        self.0.borrow_mut().merge(&siblings, &guards, ancestor)
    }

    /// Widen this payload over its siblings
    pub fn widen(&self, others: &[FileRef]) -> Result<bool> {
        let siblings: Vec<FileRef> = others
            .iter()
            .filter(|other| !other.ptr_eq(self))
            .cloned()
            .collect();
        self.0.borrow_mut().widen(&siblings)
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(file) => file.fmt(f),
            Err(_) => f.write_str("FileRef(<borrowed>)"),
        }
    }
}

/// File content held in memory
///
/// After a merge the file remembers, for every branch whose content differed,
/// the guarding condition and that branch's bytes. After a widen it remembers
/// every distinct content it may hold.
///
/// # Examples
///
/// ```rust
/// use forkfs::{Condition, FileRef, MemoryFile};
///
/// let ours = FileRef::new(MemoryFile::new(b"1".to_vec()));
/// let theirs = FileRef::new(MemoryFile::new(b"2".to_vec()));
///
/// let merged = ours.merge(&[theirs], &[Condition::new("x == 2")], None)?;
/// assert!(merged);
///
/// let file = ours.downcast::<MemoryFile>().unwrap();
/// assert_eq!(file.alternatives().len(), 1);
/// # Ok::<(), forkfs::FsError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFile {
    content: Vec<u8>,
    alternatives: Vec<(Condition, Vec<u8>)>,
    widened: Vec<Vec<u8>>,
    writable: bool,
    owner: Option<StateId>,
}

impl MemoryFile {
    /// Writable file holding `content`
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            alternatives: Vec::new(),
            widened: Vec::new(),
            writable: true,
            owner: None,
        }
    }

    /// Read-only file holding `content`
    pub fn read_only(content: impl Into<Vec<u8>>) -> Self {
        Self {
            writable: false,
            ..Self::new(content)
        }
    }

    /// Primary content
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Overwrite the content, discarding merge and widen history
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = content.into();
        self.alternatives.clear();
        self.widened.clear();
    }

    /// Guarded contents folded in by merges
    pub fn alternatives(&self) -> &[(Condition, Vec<u8>)] {
        &self.alternatives
    }

    /// Every distinct content the file may hold, primary first
    pub fn candidates(&self) -> Vec<&[u8]> {
        let mut candidates: Vec<&[u8]> = vec![self.content.as_slice()];
        let extra = self
            .alternatives
            .iter()
            .map(|(_, bytes)| bytes.as_slice())
            .chain(self.widened.iter().map(Vec::as_slice));
        for bytes in extra {
            if !candidates.contains(&bytes) {
                candidates.push(bytes);
            }
        }
        candidates
    }
}

impl SimFile for MemoryFile {
    fn kind_name(&self) -> &'static str {
        "memory file"
    }

    fn fork(&self, _memo: &mut Memo) -> FileRef {
        FileRef::new(MemoryFile {
            owner: None,
            ..self.clone()
        })
    }

    fn merge(
        &mut self,
        others: &[FileRef],
        conditions: &[Condition],
        _ancestor: Option<&FileRef>,
    ) -> Result<bool> {
        let siblings = others
            .iter()
            .map(|other| {
                other
                    .downcast::<MemoryFile>()
                    .ok_or_else(|| FsError::merge_type(self.kind_name(), other.kind_name()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut merged = false;
        for (other, condition) in siblings.iter().zip(conditions) {
            if other.content != self.content {
                self.alternatives.push((condition.clone(), other.content.clone()));
                merged = true;
            }
        }
        Ok(merged)
    }

    fn widen(&mut self, others: &[FileRef]) -> Result<bool> {
        let siblings = others
            .iter()
            .map(|other| {
                other
                    .downcast::<MemoryFile>()
                    .ok_or_else(|| FsError::merge_type(self.kind_name(), other.kind_name()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut widened = false;
        for other in &siblings {
            for bytes in other.candidates() {
                if !self.candidates().contains(&bytes) {
                    self.widened.push(bytes.to_vec());
                    widened = true;
                }
            }
        }
        Ok(widened)
    }

    fn attach(&mut self, owner: Option<StateId>) {
        self.owner = owner;
    }

    fn owner(&self) -> Option<StateId> {
        self.owner
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn concretize(&self) -> Result<Vec<u8>> {
        Ok(self.content.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A real file on the host, read on demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFile {
    host_path: PathBuf,
    writable: bool,
    owner: Option<StateId>,
}

impl HostFile {
    /// Wrap the regular file at `path`
    ///
    /// # Errors
    ///
    /// - [`FsError::Io`] if the path cannot be resolved or opened for reading
    /// - [`FsError::UnsupportedHostNode`] if the path is not a regular file
    pub fn open(path: impl AsRef<Path>, writable: bool) -> Result<Self> {
        let host_path = fs::canonicalize(path.as_ref())?;
        if !fs::metadata(&host_path)?.is_file() {
            return Err(FsError::UnsupportedHostNode { path: host_path });
        }
        fs::File::open(&host_path)?;
        trace!("Opened host file {:?}", host_path);
        Ok(Self {
            host_path,
            writable,
            owner: None,
        })
    }

    /// Real path of the wrapped file
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }
}

impl SimFile for HostFile {
    fn kind_name(&self) -> &'static str {
        "host file"
    }

    fn fork(&self, _memo: &mut Memo) -> FileRef {
        FileRef::new(HostFile {
            owner: None,
            ..self.clone()
        })
    }

    fn merge(
        &mut self,
        others: &[FileRef],
        _conditions: &[Condition],
        _ancestor: Option<&FileRef>,
    ) -> Result<bool> {
        self.widen(others)
    }

    // Host files are views of one real file; two wrappers can only fold if
    // they wrap the same path.
    fn widen(&mut self, others: &[FileRef]) -> Result<bool> {
        for other in others {
            let same = other
                .downcast::<HostFile>()
                .map(|file| file.host_path == self.host_path)
                .unwrap_or(false);
            if !same {
                return Err(FsError::merge_type(
                    format!("host file {}", self.host_path.display()),
                    other.kind_name(),
                ));
            }
        }
        Ok(false)
    }

    fn attach(&mut self, owner: Option<StateId>) {
        self.owner = owner;
    }

    fn owner(&self) -> Option<StateId> {
        self.owner
    }

    fn writable(&self) -> bool {
        self.writable
    }

    fn concretize(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.host_path)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
