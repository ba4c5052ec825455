//! Error types for the forkfs library
//!
//! Path resolution never fails with an error: a path that does not resolve, or
//! that resolves to something the caller may not write, is reported through
//! [`Lookup`](crate::types::Lookup). The variants here cover the conditions a
//! caller cannot recover from locally, such as merging a directory with a file
//! or finding a socket inside a host-backed mount.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the forkfs library
pub type Result<T> = std::result::Result<T, FsError>;

/// Main error type for all forkfs operations
#[derive(Debug, Error)]
pub enum FsError {
    /// A sibling handed to merge or widen is not the same kind of component
    #[error("Can't merge filesystem elements of disparate types: expected {expected}, found {found}")]
    MergeType {
        /// Kind of the entry being merged into
        expected: String,
        /// Kind of the offending sibling
        found: String,
    },

    /// The host namespace contains something other than a file or a directory
    #[error("Unsupported host node (not a file or directory): {path:?}")]
    UnsupportedHostNode {
        /// Real path of the offending node
        path: PathBuf,
    },

    /// I/O errors surfaced outside the insert/remove boundary
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors while reading a JSON configuration
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A default plugin was registered twice under the same slot name
    #[error("Plugin slot '{0}' already has a default")]
    DuplicatePlugin(String),

    /// No default plugin is registered for the requested slot
    #[error("No default plugin registered for slot '{0}'")]
    UnknownPlugin(String),

    /// Merge was handed a different number of conditions than branches
    #[error("Merge needs one condition per branch: {branches} branches, {conditions} conditions")]
    ConditionCount {
        /// Number of sibling branches
        branches: usize,
        /// Number of guarding conditions
        conditions: usize,
    },

    /// The filesystem configuration cannot be realised
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl FsError {
    /// Create a merge type error from the two kind names
    pub fn merge_type(expected: impl Into<String>, found: impl Into<String>) -> Self {
        FsError::MergeType {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Require exactly one guarding condition per merged branch
    pub(crate) fn check_condition_count(branches: usize, conditions: usize) -> Result<()> {
        if branches == conditions {
            Ok(())
        } else {
            Err(FsError::ConditionCount { branches, conditions })
        }
    }

    /// Create a configuration error with a custom message
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        FsError::InvalidConfiguration(msg.into())
    }

    /// Check if this error indicates a caller contract violation
    ///
    /// These are construction bugs outside the filesystem: merging disparate
    /// kinds, mismatched conditions, or registering the same default twice.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            FsError::MergeType { .. } | FsError::ConditionCount { .. } | FsError::DuplicatePlugin(_)
        )
    }

    /// Check if this error originated from the host filesystem
    pub fn is_host_error(&self) -> bool {
        matches!(self, FsError::Io(_) | FsError::UnsupportedHostNode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FsError::merge_type("directory", "file");
        assert_eq!(
            err.to_string(),
            "Can't merge filesystem elements of disparate types: expected directory, found file"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(FsError::merge_type("a", "b").is_contract_violation());
        assert!(FsError::DuplicatePlugin("fs".to_string()).is_contract_violation());
        assert!(!FsError::UnknownPlugin("fs".to_string()).is_contract_violation());
        assert!(FsError::check_condition_count(2, 1).unwrap_err().is_contract_violation());
        assert!(FsError::check_condition_count(0, 0).is_ok());

        assert!(FsError::UnsupportedHostNode {
            path: PathBuf::from("/dev/null"),
        }
        .is_host_error());
        assert!(FsError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "test")).is_host_error());
        assert!(!FsError::invalid_configuration("bad").is_host_error());
    }
}
