//! Property-based testing for forkfs
//!
//! Uses proptest to verify tree invariants across randomly generated
//! layouts and operations.

use ::forkfs::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Operations applied to a tree
#[derive(Debug, Clone)]
pub enum TreeOperation {
    MakeDir { path: Vec<String> },
    MakeFile { path: Vec<String>, content: Vec<u8> },
    Remove { path: Vec<String> },
}

/// Short names so that generated paths collide often
fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-c]".prop_map(|s| s),
        "dir[0-2]".prop_map(|s| s),
        "f[0-2]\\.txt".prop_map(|s| s),
    ]
}

fn path_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(name_strategy(), 1..=4)
}

fn tree_operation_strategy() -> impl Strategy<Value = TreeOperation> {
    prop_oneof![
        path_strategy().prop_map(|path| TreeOperation::MakeDir { path }),
        (path_strategy(), prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(path, content)| TreeOperation::MakeFile { path, content }),
        path_strategy().prop_map(|path| TreeOperation::Remove { path }),
    ]
}

fn absolute(path: &[String]) -> String {
    format!("/{}", path.join("/"))
}

fn apply(root: &Dir, op: &TreeOperation) {
    match op {
        TreeOperation::MakeDir { path } => {
            root.insert(&absolute(path), Dir::new_root().into()).unwrap();
        }
        TreeOperation::MakeFile { path, content } => {
            let file = FileRef::new(MemoryFile::new(content.clone()));
            root.insert(&absolute(path), file.into()).unwrap();
        }
        TreeOperation::Remove { path } => {
            root.remove(&absolute(path)).unwrap();
        }
    }
}

/// Every path reachable from `dir`, with its kind, files carrying content
fn describe(dir: &Dir, prefix: &str, out: &mut BTreeSet<(String, Option<Vec<u8>>)>) {
    for name in dir.names().into_iter().filter(|n| n != "." && n != "..") {
        let path = format!("{}/{}", prefix, name);
        match dir.child(&name).unwrap() {
            Entry::Dir(sub) => {
                out.insert((path.clone(), None));
                describe(&sub, &path, out);
            }
            Entry::File(file) => {
                out.insert((path, Some(file.concretize().unwrap())));
            }
        }
    }
}

fn snapshot(root: &Dir) -> BTreeSet<(String, Option<Vec<u8>>)> {
    let mut out = BTreeSet::new();
    describe(root, "", &mut out);
    out
}

/// Every directory in the tree, depth first
fn directories(dir: &Dir, out: &mut Vec<Dir>) {
    out.push(dir.clone());
    for name in dir.names().into_iter().filter(|n| n != "." && n != "..") {
        if let Some(Entry::Dir(sub)) = dir.child(&name) {
            directories(&sub, out);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Mutating a fork never changes the original, and vice versa
    #[test]
    fn fork_is_alias_free(
        setup in prop::collection::vec(tree_operation_strategy(), 0..40),
        mutations in prop::collection::vec(tree_operation_strategy(), 1..20)
    ) {
        let root = Dir::new_root();
        for op in &setup {
            apply(&root, op);
        }
        let before = snapshot(&root);

        let fork = root.fork(&mut Memo::new());
        prop_assert_eq!(snapshot(&fork), before.clone());
        for op in &mutations {
            apply(&fork, op);
        }
        prop_assert_eq!(snapshot(&root), before.clone());

        let forked = snapshot(&fork);
        for op in &mutations {
            apply(&root, op);
        }
        prop_assert_eq!(snapshot(&fork), forked);

        // No directory object is shared between the two trees
        let mut ours = Vec::new();
        let mut theirs = Vec::new();
        directories(&root, &mut ours);
        directories(&fork, &mut theirs);
        for dir in &ours {
            prop_assert!(!theirs.iter().any(|other| other.ptr_eq(dir)));
        }
    }

    /// Inserting then removing a fresh name leaves the tree unchanged
    #[test]
    fn insert_remove_round_trip(
        setup in prop::collection::vec(tree_operation_strategy(), 0..40),
        content in prop::collection::vec(any::<u8>(), 0..16)
    ) {
        let root = Dir::new_root();
        for op in &setup {
            apply(&root, op);
        }
        let before = snapshot(&root);

        let mut dirs = Vec::new();
        directories(&root, &mut dirs);
        for dir in &dirs {
            let entry = FileRef::new(MemoryFile::new(content.clone())).into();
            prop_assert!(dir.insert("fresh-name", entry).unwrap());
            prop_assert!(dir.lookup("fresh-name", false).unwrap().is_found());
            prop_assert!(dir.remove("fresh-name").unwrap());
            prop_assert!(matches!(dir.lookup("fresh-name", false).unwrap(), Lookup::NotFound));
        }
        prop_assert_eq!(snapshot(&root), before);
    }

    /// Absolute lookups give the same entry from anywhere in the tree
    #[test]
    fn absolute_lookup_is_location_independent(
        setup in prop::collection::vec(tree_operation_strategy(), 0..40),
        target in path_strategy()
    ) {
        let root = Dir::new_root();
        for op in &setup {
            apply(&root, op);
        }
        let path = absolute(&target);
        let expected = root.lookup(&path, false).unwrap().entry();

        let mut dirs = Vec::new();
        directories(&root, &mut dirs);
        for dir in &dirs {
            let found = dir.lookup(&path, false).unwrap().entry();
            match (&expected, &found) {
                (Some(a), Some(b)) => prop_assert!(a.ptr_eq(b)),
                (None, None) => {}
                _ => prop_assert!(false, "lookup of {} differs from {:?}", path, dir),
            }
        }

        // The relative form from the root agrees as well
        let relative = root.lookup(&target.join("/"), false).unwrap().entry();
        prop_assert_eq!(relative.is_some(), expected.is_some());
    }
}
