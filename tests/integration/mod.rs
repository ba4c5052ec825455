//! Integration tests for forkfs
//!
//! Drives whole execution trees: a root state is forked repeatedly, each
//! branch mutates its filesystem, and the branches are merged back.

use ::forkfs::*;
use std::fs;
use tempfile::TempDir;

/// Test harness for branching execution scenarios
pub struct ForkHarness {
    pub state: SimState,
    pub operation_log: Vec<TestOperation>,
}

#[derive(Debug, Clone)]
pub enum TestOperation {
    Insert { branch: usize, path: String },
    Remove { branch: usize, path: String },
    Merge { branches: usize },
}

impl ForkHarness {
    /// Create a harness around a state with an empty filesystem
    pub fn new() -> Self {
        let registry = PluginRegistry::with_defaults();
        let state = SimState::with_defaults(&registry, &[FS_SLOT]).unwrap();
        Self {
            state,
            operation_log: Vec::new(),
        }
    }

    /// Root directory of the current state
    pub fn fs(&self) -> Dir {
        self.state.fs().unwrap()
    }

    /// Populate `/projN/src/fileM.rs` style directories
    pub fn generate_project(&mut self, projects: usize, files: usize) {
        let fs = self.fs();
        for p in 0..projects {
            let proj = format!("/proj{}", p);
            assert!(fs.insert(&proj, Dir::new_root().into()).unwrap());
            assert!(fs.insert(&format!("{}/src", proj), Dir::new_root().into()).unwrap());
            for f in 0..files {
                let path = format!("{}/src/file{}.rs", proj, f);
                let content = format!("// file {} of project {}", f, p).into_bytes();
                assert!(fs.insert(&path, FileRef::new(MemoryFile::new(content)).into()).unwrap());
            }
        }
    }

    /// Fork `count` branches off the current state
    pub fn branch(&self, count: usize) -> Vec<SimState> {
        (0..count).map(|_| self.state.fork()).collect()
    }

    pub fn insert(&mut self, branches: &[SimState], branch: usize, path: &str, content: &str) -> bool {
        self.operation_log.push(TestOperation::Insert {
            branch,
            path: path.to_string(),
        });
        let file = FileRef::new(MemoryFile::new(content.as_bytes().to_vec()));
        branches[branch].fs().unwrap().insert(path, file.into()).unwrap()
    }

    pub fn remove(&mut self, branches: &[SimState], branch: usize, path: &str) -> bool {
        self.operation_log.push(TestOperation::Remove {
            branch,
            path: path.to_string(),
        });
        branches[branch].fs().unwrap().remove(path).unwrap()
    }

    /// Merge every branch back, guarded by `branch == i`
    pub fn join(&mut self, branches: &[SimState]) -> bool {
        self.operation_log.push(TestOperation::Merge {
            branches: branches.len(),
        });
        let others: Vec<&SimState> = branches.iter().collect();
        let guards: Vec<Condition> = (0..branches.len())
            .map(|i| Condition::new(format!("branch == {}", i)))
            .collect();
        self.state.merge(&others, &guards, None).unwrap()
    }
}

impl Default for ForkHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_branching_execution_tree() {
        let mut harness = ForkHarness::new();
        harness.generate_project(3, 5);

        let branches = harness.branch(3);
        assert!(harness.insert(&branches, 0, "/proj0/src/generated.rs", "gen"));
        assert!(harness.remove(&branches, 1, "/proj1/src/file0.rs"));
        assert!(harness.insert(&branches, 2, "/proj2/src/file1.rs.bak", "bak"));

        // Siblings never see each other's changes
        for (i, branch) in branches.iter().enumerate() {
            let fs = branch.fs().unwrap();
            assert_eq!(fs.lookup("/proj0/src/generated.rs", false).unwrap().is_found(), i == 0);
            assert_eq!(fs.lookup("/proj1/src/file0.rs", false).unwrap().is_found(), i != 1);
        }
        assert!(!harness.fs().lookup("/proj0/src/generated.rs", false).unwrap().is_found());

        assert!(harness.join(&branches));
        let fs = harness.fs();
        assert!(fs.lookup("/proj0/src/generated.rs", false).unwrap().is_found());
        assert!(fs.lookup("/proj1/src/file0.rs", false).unwrap().is_found());
        assert!(fs.lookup("/proj2/src/file1.rs.bak", false).unwrap().is_found());
        assert!(logs_contain("Cannot represent the conditional creation of files"));
        assert_eq!(harness.operation_log.len(), 4);
    }

    #[test]
    fn test_nested_forks_merge_back_in_order() {
        let mut harness = ForkHarness::new();
        harness.generate_project(1, 1);

        let outer = harness.branch(2);
        let inner: Vec<SimState> = (0..2).map(|_| outer[0].fork()).collect();
        inner[1]
            .fs()
            .unwrap()
            .insert("/proj0/deep.txt", FileRef::new(MemoryFile::new(b"deep".to_vec())).into())
            .unwrap();

        // Join the inner pair into the first outer branch, then the outer pair
        let mut joined = outer[0].fork();
        assert!(joined
            .merge(&[&inner[0], &inner[1]], &[Condition::new("y"), Condition::new("!y")], None)
            .unwrap());
        assert!(harness
            .state
            .merge(&[&joined, &outer[1]], &[Condition::new("x"), Condition::new("!x")], None)
            .unwrap());

        let deep = harness.fs().lookup("/proj0/deep.txt", false).unwrap().file().unwrap();
        assert_eq!(deep.owner(), Some(harness.state.id()));
        assert_eq!(deep.concretize().unwrap(), b"deep");
    }

    #[test]
    fn test_merge_with_common_ancestor() {
        let mut harness = ForkHarness::new();
        harness.generate_project(1, 2);
        let ancestor = harness.state.fork();
        let branches = harness.branch(2);

        let others: Vec<&SimState> = branches.iter().collect();
        let merged = harness
            .state
            .merge(&others, &[Condition::new("a"), Condition::new("b")], Some(&ancestor))
            .unwrap();
        assert!(!merged);
    }

    #[test]
    fn test_widen_accumulates_contents() {
        let mut harness = ForkHarness::new();
        harness.generate_project(1, 1);
        let branches = harness.branch(3);
        for (i, branch) in branches.iter().enumerate() {
            let fs = branch.fs().unwrap();
            fs.remove("/proj0/src/file0.rs").unwrap();
            let content = format!("v{}", i).into_bytes();
            fs.insert("/proj0/src/file0.rs", FileRef::new(MemoryFile::new(content)).into())
                .unwrap();
        }

        let others: Vec<&SimState> = branches.iter().collect();
        assert!(harness.state.widen(&others).unwrap());
        let file = harness.fs().lookup("/proj0/src/file0.rs", false).unwrap().file().unwrap();
        let file = file.downcast::<MemoryFile>().unwrap();
        assert_eq!(file.candidates().len(), 4);
    }

    #[test]
    fn test_host_mount_shared_between_states() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("config.ini"), "[core]\n").unwrap();

        let mut harness = ForkHarness::new();
        let mount = Dir::host(temp.path(), true).unwrap();
        assert!(harness.fs().insert("etc", mount.into()).unwrap());

        let branches = harness.branch(2);
        assert!(harness.insert(&branches, 0, "/etc/added.ini", "x"));

        // The disk is not forked: every state sees the new file
        assert!(harness.fs().lookup("/etc/added.ini", false).unwrap().is_found());
        assert!(branches[1].fs().unwrap().lookup("/etc/added.ini", false).unwrap().is_found());

        // Host directories are left alone by merge
        assert!(!harness.join(&branches));
        assert_eq!(
            fs::read_to_string(temp.path().join("config.ini")).unwrap(),
            "[core]\n"
        );
    }
}
