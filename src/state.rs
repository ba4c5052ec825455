//! Minimal owning state container
//!
//! `SimState` holds named plugins and drives their lifecycle: it attaches
//! itself as owner, forks every plugin through one shared [`Memo`], and
//! merges or widens plugins slot by slot. The filesystem lives in the
//! `"fs"` slot.
//!
//! ## Examples
//!
//! ```rust
//! use forkfs::{Condition, FileRef, MemoryFile, PluginRegistry, SimState};
//!
//! let registry = PluginRegistry::with_defaults();
//! let mut state = SimState::with_defaults(&registry, &["fs"])?;
//!
//! let branch = state.fork();
//! branch.fs().unwrap().insert("/flag", FileRef::new(MemoryFile::new(b"1".to_vec())).into())?;
//!
//! state.merge(&[&branch], &[Condition::new("taken")], None)?;
//! assert!(state.fs().unwrap().lookup("/flag", false)?.is_found());
//! # Ok::<(), forkfs::FsError>(())
//! ```

use crate::directory::Dir;
use crate::error::{FsError, Result};
use crate::plugin::{Memo, PluginRegistry, StatePlugin};
use crate::types::{Condition, StateId};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Slot name of the filesystem plugin
pub const FS_SLOT: &str = "fs";

/// One execution state and the plugins it owns
#[derive(Debug)]
pub struct SimState {
    id: StateId,
    plugins: BTreeMap<String, Box<dyn StatePlugin>>,
}

impl SimState {
    /// Empty state with a fresh identifier
    pub fn new() -> Self {
        Self {
            id: StateId::new(),
            plugins: BTreeMap::new(),
        }
    }

    /// State whose `names` slots are filled from `registry`
    pub fn with_defaults(registry: &PluginRegistry, names: &[&str]) -> Result<Self> {
        let mut state = Self::new();
        for name in names {
            state.register_plugin(*name, registry.create(name)?);
        }
        Ok(state)
    }

    /// Identifier other components use to refer to this state
    pub fn id(&self) -> StateId {
        self.id
    }

    /// Install `plugin` under `name`, replacing any previous one
    pub fn register_plugin(&mut self, name: impl Into<String>, mut plugin: Box<dyn StatePlugin>) {
        plugin.attach(Some(self.id));
        plugin.init_state();
        self.plugins.insert(name.into(), plugin);
    }

    /// Check whether a slot is filled
    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Plugin in slot `name`
    pub fn plugin(&self, name: &str) -> Option<&dyn StatePlugin> {
        self.plugins.get(name).map(|plugin| plugin.as_ref())
    }

    /// Plugin in slot `name`, created from `registry` if the slot is empty
    pub fn get_or_default(
        &mut self,
        name: &str,
        registry: &PluginRegistry,
    ) -> Result<&dyn StatePlugin> {
        if !self.plugins.contains_key(name) {
            self.register_plugin(name, registry.create(name)?);
        }
        self.plugin(name)
            .ok_or_else(|| FsError::UnknownPlugin(name.to_string()))
    }

    /// Slot names, sorted
    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Root directory of this state's filesystem
    pub fn fs(&self) -> Option<Dir> {
        self.plugin(FS_SLOT)
            .and_then(|plugin| plugin.as_any().downcast_ref::<Dir>())
            .cloned()
    }

    /// Independent copy of this state under a fresh identifier
    ///
    /// All plugins share one memo, so structure shared between plugins stays
    /// shared in the copy. Owners are attached once copying is complete.
    #[instrument(skip(self), fields(state = %self.id))]
    pub fn fork(&self) -> SimState {
        let mut memo = Memo::new();
        let mut copy = SimState::new();
        for (name, plugin) in &self.plugins {
            copy.plugins.insert(name.clone(), plugin.copy_plugin(&mut memo));
        }
        for plugin in copy.plugins.values_mut() {
            plugin.attach(Some(copy.id));
        }
        debug!("Forked state {} into {}", self.id, copy.id);
        copy
    }

    /// Merge `others` into this state slot by slot
    ///
    /// # Errors
    ///
    /// [`FsError::MergeType`] if another state lacks one of this state's
    /// slots, or if a plugin merge fails. [`FsError::ConditionCount`] unless
    /// there is one condition per state.
    pub fn merge(
        &mut self,
        others: &[&SimState],
        conditions: &[Condition],
        ancestor: Option<&SimState>,
    ) -> Result<bool> {
        FsError::check_condition_count(others.len(), conditions.len())?;
        let mut merged = false;
        for (name, plugin) in self.plugins.iter_mut() {
            let siblings = Self::slot_of(name, plugin.kind_name(), others)?;
            let ancestor = ancestor.and_then(|a| a.plugin(name));
            merged |= plugin.merge_plugin(&siblings, conditions, ancestor)?;
        }
        debug!("Merged {} states into {} (changed: {})", others.len(), self.id, merged);
        Ok(merged)
    }

    /// Widen this state over `others` slot by slot
    pub fn widen(&mut self, others: &[&SimState]) -> Result<bool> {
        let mut widened = false;
        for (name, plugin) in self.plugins.iter_mut() {
            let siblings = Self::slot_of(name, plugin.kind_name(), others)?;
            widened |= plugin.widen_plugin(&siblings)?;
        }
        Ok(widened)
    }

    fn slot_of<'a>(
        name: &str,
        kind: &str,
        others: &[&'a SimState],
    ) -> Result<Vec<&'a dyn StatePlugin>> {
        others
            .iter()
            .map(|other| {
                other
                    .plugin(name)
                    .ok_or_else(|| FsError::merge_type(kind, format!("state without slot '{}'", name)))
            })
            .collect()
    }
}

impl Default for SimState {
    fn default() -> Self {
        Self::new()
    }
}
