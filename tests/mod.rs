//! Main test module for forkfs
//!
//! This module includes all test suites:
//! - Integration tests for fork/merge scenarios across states
//! - Property-based tests for tree invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::forkfs::*;

    fn file(content: &str) -> Entry {
        FileRef::new(MemoryFile::new(content.as_bytes().to_vec())).into()
    }

    #[test]
    fn test_empty_tree() {
        let root = Dir::new_root();
        assert_eq!(root.len(), 2);
        assert!(root.is_empty());
        assert!(root.is_root());
        assert!(root.lookup("/", false).unwrap().dir().unwrap().ptr_eq(&root));
        assert!(matches!(root.lookup("/missing", false).unwrap(), Lookup::NotFound));
        assert!(!root.remove("/missing").unwrap());
    }

    #[test]
    fn test_special_names() {
        let root = Dir::new_root();
        let names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "...",
            "файл.txt",
            "文件.txt",
        ];
        for name in &names {
            assert!(root.insert(name, file(name)).unwrap(), "insert {}", name);
        }
        for name in &names {
            let found = root.lookup(&format!("/{}", name), false).unwrap().file().unwrap();
            assert_eq!(found.concretize().unwrap(), name.as_bytes());
        }
    }

    #[test]
    fn test_reserved_names_are_refused() {
        let root = Dir::new_root();
        assert!(!root.insert(".", file("x")).unwrap());
        assert!(!root.insert("..", file("x")).unwrap());
        assert!(!root.insert("", file("x")).unwrap());
        assert!(!root.remove(".").unwrap());
        assert!(!root.remove("..").unwrap());
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn test_deep_nesting() {
        let root = Dir::new_root();
        let mut path = String::new();
        for depth in 0..64 {
            path.push_str(&format!("/d{}", depth));
            assert!(root.insert(&path, Dir::new_root().into()).unwrap());
        }
        let deepest = root.lookup(&path, false).unwrap().dir().unwrap();
        let mut climb = String::from("..");
        for _ in 0..63 {
            climb.push_str("/..");
        }
        assert!(deepest.lookup(&climb, false).unwrap().dir().unwrap().ptr_eq(&root));

        // Forking the deepest directory copies the whole tree above it; the
        // copied ancestors live as long as the memo does
        let mut memo = Memo::new();
        let copy = deepest.fork(&mut memo);
        assert!(!copy.root().ptr_eq(&root));
        assert!(copy.lookup("/d0/d1", false).unwrap().is_found());
    }
}
