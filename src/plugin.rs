//! The lifecycle contract shared by every fork-aware state component
//!
//! A state container owns a set of named plugins. When an execution path
//! forks, every plugin is copied; when paths join, the copies are merged back
//! under per-branch conditions; static analyses widen them instead.
//!
//! ## Memoized copying
//!
//! Copies go through a [`Memo`] keyed by the identity of the original object.
//! A component checks the memo first and returns the registered copy if there
//! is one. Components that can be reached again while their own copy is being
//! built (a directory is its own `.` and its children's `..`) must register
//! the fresh copy *before* recursing, otherwise copying a root never ends.
//!
//! ## Default instances
//!
//! [`PluginRegistry`] maps slot names to constructors. It is an ordinary value
//! handed to whoever creates states, so tests can build isolated registries.

use crate::directory::{Dir, Entry};
use crate::error::{FsError, Result};
use crate::types::{Condition, StateId};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Lifecycle every stateful, fork-aware component implements
///
/// The trait is object safe so a state container can hold heterogeneous
/// plugins. Merge and widen receive their siblings as trait objects and
/// downcast them; a sibling of another kind is a [`FsError::MergeType`].
pub trait StatePlugin: fmt::Debug {
    /// Human readable kind, used in merge type errors
    fn kind_name(&self) -> &'static str;

    /// Record the state that owns this plugin (`None` detaches it)
    fn attach(&mut self, owner: Option<StateId>);

    /// Produce an independent copy with no owner attached
    fn copy_plugin(&self, memo: &mut Memo) -> Box<dyn StatePlugin>;

    /// Fold `others` into `self`, each guarded by the matching condition
    ///
    /// Returns whether anything actually diverged.
    fn merge_plugin(
        &mut self,
        others: &[&dyn StatePlugin],
        conditions: &[Condition],
        ancestor: Option<&dyn StatePlugin>,
    ) -> Result<bool>;

    /// Generalize `self` to cover every one of `others`
    fn widen_plugin(&mut self, others: &[&dyn StatePlugin]) -> Result<bool>;

    /// Hook run once when the plugin is registered with a state
    fn init_state(&mut self) {}

    /// Access to the concrete type for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Downcast every sibling to `T`, failing on the first one of another kind
pub fn downcast_siblings<'a, T: StatePlugin + 'static>(
    expected: &str,
    others: &[&'a dyn StatePlugin],
) -> Result<Vec<&'a T>> {
    others
        .iter()
        .map(|other| {
            other
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| FsError::merge_type(expected, other.kind_name()))
        })
        .collect()
}

/// Identity-keyed map from original object to its copy
///
/// One memo is shared by every copy made during a single fork so that shared
/// substructure stays shared and cycles terminate. The memo holds strong
/// handles to the copies it has produced.
#[derive(Default)]
pub struct Memo {
    copies: HashMap<usize, Entry>,
}

impl Memo {
    /// Create an empty memo for one fork
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity key of a reference-counted object
    pub fn key_of<T: ?Sized>(rc: &Rc<T>) -> usize {
        Rc::as_ptr(rc) as *const () as usize
    }

    /// Copy previously registered for `key`
    pub fn get(&self, key: usize) -> Option<&Entry> {
        self.copies.get(&key)
    }

    /// Register the copy of the object identified by `key`
    pub fn insert(&mut self, key: usize, copy: Entry) {
        self.copies.insert(key, copy);
    }

    /// Seed the memo so that `original` copies to `replacement`
    ///
    /// Used to graft a subtree from one graph into another: anything in the
    /// subtree that points at `original` will point at `replacement` instead.
    pub fn redirect(&mut self, original: &Dir, replacement: &Dir) {
        self.insert(original.memo_key(), Entry::Dir(replacement.clone()));
    }

    /// Number of objects copied so far
    pub fn len(&self) -> usize {
        self.copies.len()
    }

    /// Check whether nothing has been copied yet
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }
}

impl fmt::Debug for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("copies", &self.copies.len())
            .finish()
    }
}

/// Constructor for a default plugin instance
pub type PluginFactory = fn() -> Box<dyn StatePlugin>;

/// Table of default constructors per plugin slot
///
/// Each slot name is registered exactly once; lookups afterwards are read
/// only.
///
/// # Examples
///
/// ```rust
/// use forkfs::PluginRegistry;
///
/// let registry = PluginRegistry::with_defaults();
/// let fs = registry.create("fs")?;
/// assert_eq!(fs.kind_name(), "directory");
/// # Ok::<(), forkfs::FsError>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    defaults: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in slots (`"fs"`: an empty writable root)
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.defaults.insert("fs".to_string(), default_filesystem);
        registry
    }

    /// Register the default constructor for `name`
    ///
    /// # Errors
    ///
    /// Returns [`FsError::DuplicatePlugin`] if the slot already has a default.
    /// The existing registration is left untouched.
    pub fn register_default(&mut self, name: impl Into<String>, factory: PluginFactory) -> Result<()> {
        let name = name.into();
        if self.defaults.contains_key(&name) {
            return Err(FsError::DuplicatePlugin(name));
        }
        debug!("Registered default plugin for slot {}", name);
        self.defaults.insert(name, factory);
        Ok(())
    }

    /// Build a fresh default instance for `name`
    pub fn create(&self, name: &str) -> Result<Box<dyn StatePlugin>> {
        self.defaults
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| FsError::UnknownPlugin(name.to_string()))
    }

    /// Check whether `name` has a default
    pub fn contains(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }

    /// Registered slot names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }
}

fn default_filesystem() -> Box<dyn StatePlugin> {
    Box::new(Dir::new_root())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_only_root() -> Box<dyn StatePlugin> {
        Box::new(Dir::with_options(false, '/'))
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register_default("fs", read_only_root).unwrap();

        let err = registry.register_default("fs", default_filesystem).unwrap_err();
        assert!(matches!(err, FsError::DuplicatePlugin(ref name) if name == "fs"));

        // The first registration survives
        let fs = registry.create("fs").unwrap();
        let dir = fs.as_any().downcast_ref::<Dir>().unwrap();
        assert!(!dir.writable());
    }

    #[test]
    fn test_unknown_slot() {
        let registry = PluginRegistry::with_defaults();
        assert!(registry.contains("fs"));
        assert!(matches!(registry.create("heap"), Err(FsError::UnknownPlugin(_))));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["fs"]);
    }

    #[test]
    fn test_defaults_are_fresh_instances() {
        let registry = PluginRegistry::with_defaults();
        let a = registry.create("fs").unwrap();
        let b = registry.create("fs").unwrap();
        let a = a.as_any().downcast_ref::<Dir>().unwrap();
        let b = b.as_any().downcast_ref::<Dir>().unwrap();
        assert!(!a.ptr_eq(b));
    }

    #[test]
    fn test_memo_redirect() {
        let original = Dir::new_root();
        let replacement = Dir::new_root();
        let mut memo = Memo::new();
        assert!(memo.is_empty());

        memo.redirect(&original, &replacement);
        let copy = original.fork(&mut memo);
        assert!(copy.ptr_eq(&replacement));
        assert_eq!(memo.len(), 1);
    }
}
