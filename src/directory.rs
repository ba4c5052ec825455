//! Directory tree with copy-on-fork semantics
//!
//! A [`Dir`] is a shared handle to one directory node. Nodes own their
//! children; the parent link is a non-owning back-reference, and a root is
//! the unique node whose parent is itself.
//!
//! ## Structure
//!
//! ```text
//! /            parent: /      (root, one-node cycle)
//! ├── etc      parent: /
//! │   └── passwd
//! └── mnt      parent: /      (host-backed: children come from the host)
//! ```
//!
//! Every directory exposes the reserved entries `.` (itself) and `..` (its
//! parent). They are synthesized when read rather than stored, so the tree
//! holds no strong reference cycles while `child(".")` and `child("..")`
//! always answer with the directory and its parent.
//!
//! ## Forking
//!
//! [`Dir::fork`] copies a whole graph through a [`Memo`]: the copy of a node
//! is registered before its parent and children are copied, which is what
//! terminates the root's self-cycle and keeps shared subtrees shared.
//! Forks are normally taken from the root. Forking an inner directory also
//! copies its ancestors, which then live only as long as the memo.

use crate::error::Result;
use crate::file::FileRef;
use crate::plugin::{downcast_siblings, Memo, StatePlugin};
use crate::resolver;
use crate::types::{Condition, Lookup, StateId};
use crate::utils;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

/// Default path separator
pub const DEFAULT_PATHSEP: char = '/';

/// A directory or a file
#[derive(Debug, Clone)]
pub enum Entry {
    /// A directory, in-memory or host-backed
    Dir(Dir),
    /// A leaf payload
    File(FileRef),
}

impl Entry {
    /// Check whether this is a directory
    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Dir(_))
    }

    /// Borrow as a directory
    pub fn as_dir(&self) -> Option<&Dir> {
        match self {
            Entry::Dir(dir) => Some(dir),
            Entry::File(_) => None,
        }
    }

    /// Borrow as a file
    pub fn as_file(&self) -> Option<&FileRef> {
        match self {
            Entry::File(file) => Some(file),
            Entry::Dir(_) => None,
        }
    }

    /// Convert into a directory
    pub fn into_dir(self) -> Option<Dir> {
        match self {
            Entry::Dir(dir) => Some(dir),
            Entry::File(_) => None,
        }
    }

    /// Convert into a file
    pub fn into_file(self) -> Option<FileRef> {
        match self {
            Entry::File(file) => Some(file),
            Entry::Dir(_) => None,
        }
    }

    /// Kind name, used in merge type errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Entry::Dir(dir) => dir.kind_name(),
            Entry::File(file) => file.kind_name(),
        }
    }

    /// Whether writes to the entry are allowed
    pub fn writable(&self) -> bool {
        match self {
            Entry::Dir(dir) => dir.writable(),
            Entry::File(file) => file.writable(),
        }
    }

    /// Check whether both entries are the same object
    pub fn ptr_eq(&self, other: &Entry) -> bool {
        match (self, other) {
            (Entry::Dir(a), Entry::Dir(b)) => a.ptr_eq(b),
            (Entry::File(a), Entry::File(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Record the owning state on the entry and everything below it
    pub fn attach(&self, owner: Option<StateId>) {
        match self {
            Entry::Dir(dir) => dir.attach(owner),
            Entry::File(file) => file.attach(owner),
        }
    }

    /// Memoized independent copy
    pub fn fork(&self, memo: &mut Memo) -> Entry {
        match self {
            Entry::Dir(dir) => Entry::Dir(dir.fork(memo)),
            Entry::File(file) => Entry::File(file.fork(memo)),
        }
    }

    /// Fold sibling entries into this one
    ///
    /// Every sibling must be the same kind of entry as `self`.
    pub fn merge(
        &self,
        siblings: &[Entry],
        conditions: &[Condition],
        ancestor: Option<&Entry>,
    ) -> Result<bool> {
        match self {
            Entry::Dir(dir) => {
                let others = same_kind(self, siblings, Entry::as_dir)?;
                dir.merge(&others, conditions, ancestor.and_then(Entry::as_dir))
            }
            Entry::File(file) => {
                let others = same_kind(self, siblings, Entry::as_file)?;
                file.merge(&others, conditions, ancestor.and_then(Entry::as_file))
            }
        }
    }

    /// Widen this entry over sibling entries
    pub fn widen(&self, siblings: &[Entry]) -> Result<bool> {
        match self {
            Entry::Dir(dir) => dir.widen(&same_kind(self, siblings, Entry::as_dir)?),
            Entry::File(file) => file.widen(&same_kind(self, siblings, Entry::as_file)?),
        }
    }
}

fn same_kind<T: Clone>(
    primary: &Entry,
    siblings: &[Entry],
    project: fn(&Entry) -> Option<&T>,
) -> Result<Vec<T>> {
    siblings
        .iter()
        .map(|sibling| {
            project(sibling)
                .cloned()
                .ok_or_else(|| crate::FsError::merge_type(primary.kind_name(), sibling.kind_name()))
        })
        .collect()
}

impl From<Dir> for Entry {
    fn from(dir: Dir) -> Self {
        Entry::Dir(dir)
    }
}

impl From<FileRef> for Entry {
    fn from(file: FileRef) -> Self {
        Entry::File(file)
    }
}

pub(crate) enum DirKind {
    /// Children stored in memory, without the reserved `.` / `..`
    Memory { children: BTreeMap<String, Entry> },
    /// Children materialized from the host on every lookup
    Host { host_path: PathBuf, host_root: PathBuf },
}

pub(crate) struct DirNode {
    pub(crate) kind: DirKind,
    pub(crate) writable: bool,
    pub(crate) parent: Weak<RefCell<DirNode>>,
    pub(crate) pathsep: char,
    pub(crate) owner: Option<StateId>,
}

/// Shared handle to a directory node
///
/// Cloning the handle does not copy the directory; use [`Dir::fork`] for
/// an independent copy.
///
/// # Examples
///
/// ```rust
/// use forkfs::{Dir, FileRef, Lookup, MemoryFile, Memo};
///
/// let root = Dir::new_root();
/// assert!(root.insert("etc", Dir::new_root().into())?);
/// assert!(root.insert("/etc/passwd", FileRef::new(MemoryFile::new(b"root:x:0:0".to_vec())).into())?);
///
/// let fork = root.fork(&mut Memo::new());
/// assert!(fork.remove("/etc/passwd")?);
///
/// // The original is untouched
/// assert!(root.lookup("/etc/passwd", false)?.is_found());
/// assert!(matches!(fork.lookup("/etc/passwd", false)?, Lookup::NotFound));
/// # Ok::<(), forkfs::FsError>(())
/// ```
#[derive(Clone)]
pub struct Dir(pub(crate) Rc<RefCell<DirNode>>);

impl Dir {
    /// Empty writable root using `/` as separator
    pub fn new_root() -> Self {
        Self::with_options(true, DEFAULT_PATHSEP)
    }

    /// Empty root with explicit permissions and separator
    pub fn with_options(writable: bool, pathsep: char) -> Self {
        Self::new_node(
            DirKind::Memory {
                children: BTreeMap::new(),
            },
            writable,
            pathsep,
            None,
        )
    }

    /// Build a node; with `parent == None` the node is its own parent
    pub(crate) fn new_node(
        kind: DirKind,
        writable: bool,
        pathsep: char,
        parent: Option<Weak<RefCell<DirNode>>>,
    ) -> Self {
        Dir(Rc::new_cyclic(|this| {
            RefCell::new(DirNode {
                kind,
                writable,
                parent: parent.unwrap_or_else(|| this.clone()),
                pathsep,
                owner: None,
            })
        }))
    }

    pub(crate) fn memo_key(&self) -> usize {
        Memo::key_of(&self.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<DirNode>> {
        Rc::downgrade(&self.0)
    }

    /// Check whether both handles point at the same directory
    pub fn ptr_eq(&self, other: &Dir) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Kind name, used in merge type errors
    pub fn kind_name(&self) -> &'static str {
        match self.0.borrow().kind {
            DirKind::Memory { .. } => "directory",
            DirKind::Host { .. } => "host directory",
        }
    }

    /// Path separator used by this tree
    pub fn pathsep(&self) -> char {
        self.0.borrow().pathsep
    }

    /// Whether writes below this directory are allowed
    pub fn writable(&self) -> bool {
        self.0.borrow().writable
    }

    /// Change the writable flag
    pub fn set_writable(&self, writable: bool) {
        self.0.borrow_mut().writable = writable;
    }

    /// Owning state, if attached
    pub fn owner(&self) -> Option<StateId> {
        self.0.borrow().owner
    }

    /// Check whether the directory reflects the host filesystem
    pub fn is_host(&self) -> bool {
        matches!(self.0.borrow().kind, DirKind::Host { .. })
    }

    /// Real path of a host-backed directory
    pub fn host_path(&self) -> Option<PathBuf> {
        match &self.0.borrow().kind {
            DirKind::Host { host_path, .. } => Some(host_path.clone()),
            DirKind::Memory { .. } => None,
        }
    }

    /// Real path beyond which `..` hands off to the virtual parent
    pub fn host_root(&self) -> Option<PathBuf> {
        match &self.0.borrow().kind {
            DirKind::Host { host_root, .. } => Some(host_root.clone()),
            DirKind::Memory { .. } => None,
        }
    }

    /// The parent directory (the directory itself for a root)
    ///
    /// A directory whose parent has been dropped behaves as a root.
    pub fn parent(&self) -> Dir {
        self.0
            .borrow()
            .parent
            .upgrade()
            .map(Dir)
            .unwrap_or_else(|| self.clone())
    }

    /// Check whether this directory is its own parent
    pub fn is_root(&self) -> bool {
        self.parent().ptr_eq(self)
    }

    /// Walk parent links up to the root of the tree
    pub fn root(&self) -> Dir {
        let mut current = self.clone();
        loop {
            let parent = current.parent();
            if parent.ptr_eq(&current) {
                return current;
            }
            current = parent;
        }
    }

    /// Number of entries, counting the reserved `.` and `..`
    ///
    /// A host-backed directory counts the host entries; an unreadable one
    /// reports only the reserved pair.
    pub fn len(&self) -> usize {
        match &self.0.borrow().kind {
            DirKind::Memory { children } => children.len() + 2,
            DirKind::Host { host_path, .. } => {
                std::fs::read_dir(host_path).map(|it| it.count()).unwrap_or(0) + 2
            }
        }
    }

    /// Check whether the directory holds nothing but `.` and `..`
    pub fn is_empty(&self) -> bool {
        self.len() == 2
    }

    /// Entry names, reserved links first, then user entries sorted
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![".".to_string(), "..".to_string()];
        match &self.0.borrow().kind {
            DirKind::Memory { children } => names.extend(children.keys().cloned()),
            DirKind::Host { host_path, .. } => {
                let mut host: Vec<String> = std::fs::read_dir(host_path)
                    .map(|it| {
                        it.filter_map(|entry| entry.ok())
                            .map(|entry| entry.file_name().to_string_lossy().into_owned())
                            .collect()
                    })
                    .unwrap_or_default();
                host.sort();
                names.extend(host);
            }
        }
        names
    }

    /// Stored child by exact name, including the reserved links
    ///
    /// Host-backed directories store no children; resolve their entries with
    /// [`Dir::lookup`].
    pub fn child(&self, name: &str) -> Option<Entry> {
        match name {
            "." => Some(Entry::Dir(self.clone())),
            ".." => Some(Entry::Dir(self.parent())),
            _ => match &self.0.borrow().kind {
                DirKind::Memory { children } => children.get(name).cloned(),
                DirKind::Host { .. } => None,
            },
        }
    }

    /// Snapshot of the stored children, without the reserved links
    pub(crate) fn children_snapshot(&self) -> BTreeMap<String, Entry> {
        match &self.0.borrow().kind {
            DirKind::Memory { children } => children.clone(),
            DirKind::Host { .. } => BTreeMap::new(),
        }
    }

    pub(crate) fn replace_children(&self, folded: BTreeMap<String, Entry>) {
        if let DirKind::Memory { children } = &mut self.0.borrow_mut().kind {
            *children = folded;
        }
    }

    /// Resolve `path` starting from this directory
    ///
    /// Absolute paths restart from the root of the tree. With `writing` set,
    /// a target that forbids writes yields [`Lookup::NotWritable`].
    ///
    /// # Errors
    ///
    /// Only host-backed directories can fail, with
    /// [`FsError::UnsupportedHostNode`](crate::FsError::UnsupportedHostNode)
    /// when the host holds something other than a file or directory.
    pub fn lookup(&self, path: &str, writing: bool) -> Result<Lookup> {
        resolver::lookup(self, path, writing)
    }

    /// Add `entry` at `path`, relative to this directory
    ///
    /// Returns `Ok(false)` if the name is taken, the parent does not resolve
    /// or forbids writes. A directory being inserted is re-parented only while
    /// it is still a detached root; inserting a directory that already has a
    /// parent keeps that parent and logs a warning. A directory that contains
    /// the target directory is refused, since the tree would become a cycle.
    ///
    /// Host-backed directories only accept files and empty directories: the
    /// real directory is created empty and nothing is copied into it.
    pub fn insert(&self, path: &str, entry: Entry) -> Result<bool> {
        let sep = self.pathsep();
        let path = utils::strip_trailing_separators(path, sep);
        match utils::split_last_segment(path, sep) {
            None => self.insert_child(path, entry),
            Some((head, tail)) => match self.lookup(head, true)? {
                Lookup::Found(Entry::Dir(parent)) => parent.insert_child(tail, entry),
                _ => Ok(false),
            },
        }
    }

    /// Remove the entry at `path`, relative to this directory
    ///
    /// Refuses `.` / `..`, missing names and non-empty directories.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let sep = self.pathsep();
        let path = utils::strip_trailing_separators(path, sep);
        match utils::split_last_segment(path, sep) {
            None => self.remove_child(path),
            Some((head, tail)) => match self.lookup(head, true)? {
                Lookup::Found(Entry::Dir(parent)) => parent.remove_child(tail),
                _ => Ok(false),
            },
        }
    }

    fn insert_child(&self, name: &str, entry: Entry) -> Result<bool> {
        if self.is_host() {
            return crate::host::insert_child(self, name, entry);
        }
        let sep = self.pathsep();
        if !utils::is_valid_entry_name(name, sep) || !self.writable() || self.child(name).is_some() {
            return Ok(false);
        }

        if let Entry::Dir(dir) = &entry {
            if dir.reaches(self) {
                warn!("Refusing to insert directory {} beneath itself", name);
                return Ok(false);
            }
            if dir.is_root() {
                dir.0.borrow_mut().parent = self.downgrade();
                dir.set_pathsep(sep);
            } else {
                warn!("Trying to add directory {} to filesystem which already has a parent", name);
            }
        }

        entry.attach(self.owner());
        if let DirKind::Memory { children } = &mut self.0.borrow_mut().kind {
            children.insert(name.to_string(), entry);
        }
        Ok(true)
    }

    fn remove_child(&self, name: &str) -> Result<bool> {
        if self.is_host() {
            return crate::host::remove_child(self, name);
        }
        if name == "." || name == ".." || !self.writable() {
            return Ok(false);
        }
        let Some(target) = self.child(name) else {
            return Ok(false);
        };
        if let Entry::Dir(dir) = &target {
            if !dir.is_empty() {
                return Ok(false);
            }
        }

        if let DirKind::Memory { children } = &mut self.0.borrow_mut().kind {
            children.remove(name);
        }
        // A detached directory becomes a root again so it can be re-inserted,
        // unless it is still linked here under another name
        if let Entry::Dir(dir) = &target {
            let still_linked = self
                .children_snapshot()
                .values()
                .any(|entry| entry.as_dir().is_some_and(|other| other.ptr_eq(dir)));
            if dir.parent().ptr_eq(self) && !still_linked {
                dir.0.borrow_mut().parent = dir.downgrade();
            }
        }
        Ok(true)
    }

    /// Check whether `target` is this directory or stored somewhere below it
    fn reaches(&self, target: &Dir) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![self.clone()];
        while let Some(dir) = pending.pop() {
            if dir.ptr_eq(target) {
                return true;
            }
            if !seen.insert(dir.memo_key()) {
                continue;
            }
            pending.extend(dir.children_snapshot().into_values().filter_map(Entry::into_dir));
        }
        false
    }

    fn set_pathsep(&self, sep: char) {
        self.0.borrow_mut().pathsep = sep;
        for entry in self.children_snapshot().into_values() {
            if let Entry::Dir(dir) = entry {
                if dir.parent().ptr_eq(self) {
                    dir.set_pathsep(sep);
                }
            }
        }
    }

    /// Record the owning state on this directory and everything below it
    pub fn attach(&self, owner: Option<StateId>) {
        self.0.borrow_mut().owner = owner;
        for (_, entry) in self.children_snapshot() {
            entry.attach(owner);
        }
    }

    /// Independent copy of the directory graph
    ///
    /// The copy and everything reachable from it share no mutable state with
    /// the original; file payloads are copied through their own fork. Owners
    /// are reset to `None`.
    pub fn fork(&self, memo: &mut Memo) -> Dir {
        let key = self.memo_key();
        if let Some(Entry::Dir(copy)) = memo.get(key) {
            return copy.clone();
        }

        let (kind, writable, pathsep) = {
            let node = self.0.borrow();
            let kind = match &node.kind {
                DirKind::Memory { .. } => DirKind::Memory {
                    children: BTreeMap::new(),
                },
                DirKind::Host { host_path, host_root } => DirKind::Host {
                    host_path: host_path.clone(),
                    host_root: host_root.clone(),
                },
            };
            (kind, node.writable, node.pathsep)
        };
        let copy = Dir::new_node(kind, writable, pathsep, None);
        // Registered before recursing: `..` of every child leads back here
        memo.insert(key, Entry::Dir(copy.clone()));

        if !self.is_root() {
            let parent = self.parent().fork(memo);
            copy.0.borrow_mut().parent = parent.downgrade();
        }

        let children: BTreeMap<String, Entry> = self
            .children_snapshot()
            .into_iter()
            .map(|(name, entry)| (name, entry.fork(memo)))
            .collect();
        copy.replace_children(children);
        copy
    }

    /// Mount the host directory `host_path` as a detached root
    ///
    /// The real path is canonicalized and becomes the mount's host root.
    /// Insert the result into a virtual tree to give `..` somewhere to go.
    pub fn host(host_path: impl AsRef<Path>, writable: bool) -> Result<Dir> {
        crate::host::mount(host_path.as_ref(), writable, DEFAULT_PATHSEP)
    }
}

impl fmt::Debug for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(node) = self.0.try_borrow() else {
            return f.write_str("Dir(<borrowed>)");
        };
        let mut out = f.debug_struct("Dir");
        match &node.kind {
            DirKind::Memory { children } => {
                out.field("children", &children.keys().collect::<Vec<_>>());
            }
            DirKind::Host { host_path, host_root } => {
                out.field("host_path", host_path).field("host_root", host_root);
            }
        }
        out.field("writable", &node.writable)
            .field("pathsep", &node.pathsep)
            .field("owner", &node.owner)
            .finish()
    }
}

impl StatePlugin for Dir {
    fn kind_name(&self) -> &'static str {
        Dir::kind_name(self)
    }

    fn attach(&mut self, owner: Option<StateId>) {
        Dir::attach(self, owner);
    }

    fn copy_plugin(&self, memo: &mut Memo) -> Box<dyn StatePlugin> {
        let copy = self.fork(memo);
        debug!("Forked filesystem ({} objects copied)", memo.len());
        Box::new(copy)
    }

    fn merge_plugin(
        &mut self,
        others: &[&dyn StatePlugin],
        conditions: &[Condition],
        ancestor: Option<&dyn StatePlugin>,
    ) -> Result<bool> {
        let others: Vec<Dir> = downcast_siblings::<Dir>(Dir::kind_name(self), others)?
            .into_iter()
            .cloned()
            .collect();
        let ancestor = ancestor.and_then(|a| a.as_any().downcast_ref::<Dir>());
        Dir::merge(self, &others, conditions, ancestor)
    }

    fn widen_plugin(&mut self, others: &[&dyn StatePlugin]) -> Result<bool> {
        let others: Vec<Dir> = downcast_siblings::<Dir>(Dir::kind_name(self), others)?
            .into_iter()
            .cloned()
            .collect();
        Dir::widen(self, &others)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
