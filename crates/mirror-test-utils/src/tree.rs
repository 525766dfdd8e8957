//! [`TestTree`]: a temporary directory tree for sync scenarios.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use mirror_core::Timestamp;
use tempfile::TempDir;

/// A temporary directory with helpers for writing and inspecting files by
/// root-relative name.
///
/// # Example
///
/// ```rust,no_run
/// use mirror_test_utils::TestTree;
///
/// let tree = TestTree::new();
/// tree.write_at("docs/a.txt", "hi", 1000);
/// tree.assert_content("docs/a.txt", "hi");
/// ```
pub struct TestTree {
    temp_dir: TempDir,
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Canonical root path, matching what the coordinator watches.
    pub fn root(&self) -> PathBuf {
        mirror_fs::canonical_root(self.temp_dir.path()).unwrap()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Create a directory (and parents) under the root and return its path.
    pub fn subdir(&self, relative: &str) -> PathBuf {
        let dir = self.path(relative);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Write `content`, creating parent directories as needed.
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Write `content` and set the modification time to `secs` since the epoch.
    pub fn write_at(&self, relative: &str, content: &str, secs: u64) -> PathBuf {
        let path = self.write(relative, content);
        mirror_fs::io::set_mtime(&path, UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
        path
    }

    pub fn read(&self, relative: &str) -> String {
        let path = self.path(relative);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Could not read {}: {}", path.display(), e))
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.path(relative)).unwrap();
    }

    pub fn mtime(&self, relative: &str) -> Timestamp {
        let modified = fs::metadata(self.path(relative)).unwrap().modified().unwrap();
        Timestamp::from_system_time(modified)
    }

    /// Names of the regular files under the root, sorted, `/`-separated.
    pub fn files(&self) -> Vec<String> {
        fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
            for entry in fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(root, &path, out);
                } else {
                    let relative = path.strip_prefix(root).unwrap();
                    let parts: Vec<_> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    out.push(parts.join("/"));
                }
            }
        }
        let root = self.root();
        let mut files = Vec::new();
        walk(&root, &root, &mut files);
        files.sort();
        files
    }

    /// # Panics
    /// Panics if the file is missing or its content differs.
    pub fn assert_content(&self, relative: &str, expected: &str) {
        let actual = self.read(relative);
        assert_eq!(
            actual,
            expected,
            "Unexpected content in {}",
            self.path(relative).display()
        );
    }

    /// # Panics
    /// Panics if the file exists.
    pub fn assert_absent(&self, relative: &str) {
        let path = self.path(relative);
        assert!(!path.exists(), "Expected file NOT to exist: {}", path.display());
    }
}
