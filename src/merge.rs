//! Merging and widening of directory trees
//!
//! Merge folds several diverged copies of a directory back into one. Names
//! are matched across branches; every name present in `self` collects the
//! same-named entries of the other branches and their guarding conditions,
//! then merges them recursively, down to the files.
//!
//! A name that exists only on some branches cannot be made conditional: the
//! merged directory holds it unconditionally and a warning is logged. The
//! entry is grafted into `self`'s tree rather than shared with the branch it
//! came from.
//!
//! Widen follows the same shape without conditions and is only used by
//! fixpoint analyses.

use crate::directory::{Dir, Entry};
use crate::error::{FsError, Result};
use crate::plugin::Memo;
use crate::types::Condition;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Per-name accumulator for a merge: primary entry, siblings, their guards
type Folded = BTreeMap<String, (Entry, Vec<Entry>, Vec<Condition>)>;

impl Dir {
    /// Fold `others` into this directory, each guarded by its condition
    ///
    /// `conditions[i]` guards `others[i]`. When `ancestor` is a directory,
    /// each child merge receives the ancestor's same-named entry.
    ///
    /// Returns `true` if any branch differed from `self`.
    ///
    /// # Errors
    ///
    /// [`FsError::MergeType`] if a sibling is not the same directory variant,
    /// or if a name maps to entries of different kinds on different branches.
    /// [`FsError::ConditionCount`] unless there is one condition per sibling.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use forkfs::{Condition, Dir, FileRef, MemoryFile, Memo};
    ///
    /// let root = Dir::new_root();
    /// root.insert("a", FileRef::new(MemoryFile::new(b"a".to_vec())).into())?;
    ///
    /// let branch = root.fork(&mut Memo::new());
    /// branch.insert("b", FileRef::new(MemoryFile::new(b"b".to_vec())).into())?;
    ///
    /// assert!(root.merge(&[branch], &[Condition::new("x > 0")], None)?);
    /// assert_eq!(root.names(), vec![".", "..", "a", "b"]);
    /// # Ok::<(), forkfs::FsError>(())
    /// ```
    pub fn merge(
        &self,
        others: &[Dir],
        conditions: &[Condition],
        ancestor: Option<&Dir>,
    ) -> Result<bool> {
        FsError::check_condition_count(others.len(), conditions.len())?;
        self.check_variants(others)?;
        if self.is_host() {
            // Host-backed directories store nothing to fold
            return Ok(false);
        }

        let ours = self.children_snapshot();
        let mut folded: Folded = ours
            .iter()
            .map(|(name, entry)| (name.clone(), (entry.clone(), Vec::new(), Vec::new())))
            .collect();
        let mut merged = false;

        for (other, condition) in others.iter().zip(conditions) {
            if other.ptr_eq(self) {
                continue;
            }
            let theirs = other.children_snapshot();
            if ours.keys().any(|name| !theirs.contains_key(name)) {
                merged = true;
            }
            for (name, entry) in theirs {
                match folded.get_mut(&name) {
                    Some((_, siblings, guards)) => {
                        siblings.push(entry);
                        guards.push(condition.clone());
                    }
                    None => {
                        warn!("Cannot represent the conditional creation of files ({})", name);
                        let adopted = self.adopt(other, &entry);
                        folded.insert(name, (adopted, Vec::new(), Vec::new()));
                        merged = true;
                    }
                }
            }
        }

        for (name, (entry, siblings, guards)) in &folded {
            let ancestor_entry = ancestor.and_then(|a| a.child(name));
            merged |= entry.merge(siblings, guards, ancestor_entry.as_ref())?;
        }

        self.replace_children(
            folded
                .into_iter()
                .map(|(name, (entry, _, _))| (name, entry))
                .collect(),
        );
        debug!("Merged directory with {} branches (changed: {})", others.len(), merged);
        Ok(merged)
    }

    /// Generalize this directory to cover every one of `others`
    ///
    /// Names missing from `self` are added; every name widens its entry over
    /// the same-named entries of the other directories.
    pub fn widen(&self, others: &[Dir]) -> Result<bool> {
        self.check_variants(others)?;
        if self.is_host() {
            return Ok(false);
        }

        let mut folded: BTreeMap<String, (Entry, Vec<Entry>)> = self
            .children_snapshot()
            .into_iter()
            .map(|(name, entry)| (name, (entry, Vec::new())))
            .collect();
        let mut widened = false;

        for other in others {
            if other.ptr_eq(self) {
                continue;
            }
            for (name, entry) in other.children_snapshot() {
                match folded.get_mut(&name) {
                    Some((_, siblings)) => siblings.push(entry),
                    None => {
                        let adopted = self.adopt(other, &entry);
                        folded.insert(name, (adopted, Vec::new()));
                        widened = true;
                    }
                }
            }
        }

        for (entry, siblings) in folded.values() {
            widened |= entry.widen(siblings)?;
        }

        self.replace_children(
            folded
                .into_iter()
                .map(|(name, (entry, _))| (name, entry))
                .collect(),
        );
        debug!("Widened directory over {} others (changed: {})", others.len(), widened);
        Ok(widened)
    }

    fn check_variants(&self, others: &[Dir]) -> Result<()> {
        let expected = self.kind_name();
        match others.iter().find(|other| other.kind_name() != expected) {
            Some(other) => Err(FsError::merge_type(expected, other.kind_name())),
            None => Ok(()),
        }
    }

    /// Copy an entry of `from` into this directory's graph
    ///
    /// Directories below the entry that pointed at `from` as their parent
    /// point at `self` in the copy.
    fn adopt(&self, from: &Dir, entry: &Entry) -> Entry {
        let mut memo = Memo::new();
        memo.redirect(from, self);
        let adopted = entry.fork(&mut memo);
        adopted.attach(self.owner());
        adopted
    }
}
