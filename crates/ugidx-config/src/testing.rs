//! Test tree abstraction for isolated indexing tests.
//!
//! Provides `TestTree` to manage:
//! - A temporary root directory that is removed on drop
//! - File and directory creation relative to the root
//! - Deterministic modification times
//!
//! # Usage
//!
//! ```ignore
//! use ugidx_config::testing::TestTree;
//!
//! let tree = TestTree::new()?;
//! tree.create_file("src/lib.rs", b"fn main() {}")?;
//! tree.set_mtime("src/lib.rs", 1_000_000)?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use filetime::FileTime;
use tempfile::TempDir;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated directory tree with helpers for shaping its contents
pub struct TestTree {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of the tree handed to the indexer
    pub root: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestTree {
    /// Create a new, empty tree
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join(format!("tree-{}", test_id));
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            test_id,
        })
    }

    /// Absolute path of a tree-relative path
    pub fn path(&self, relative_path: &str) -> PathBuf {
        if relative_path.is_empty() || relative_path == "." {
            self.root.clone()
        } else {
            self.root.join(relative_path)
        }
    }

    /// Create a test file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.path(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a test directory
    pub fn create_dir(&self, relative_path: &str) -> anyhow::Result<PathBuf> {
        let path = self.path(relative_path);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Remove a file from the tree
    pub fn remove_file(&self, relative_path: &str) -> anyhow::Result<()> {
        std::fs::remove_file(self.path(relative_path))?;
        Ok(())
    }

    /// Set the modification time of a file or directory, in seconds since the epoch
    pub fn set_mtime(&self, relative_path: &str, secs: u64) -> anyhow::Result<()> {
        let time = FileTime::from_system_time(UNIX_EPOCH + Duration::from_secs(secs));
        filetime::set_file_mtime(self.path(relative_path), time)?;
        Ok(())
    }

    /// Push a path's modification time into the future relative to now.
    ///
    /// Used to simulate an edit that happened after the last indexing run
    /// without sleeping past the filesystem timestamp granularity.
    pub fn touch_future(&self, relative_path: &str, ahead: Duration) -> anyhow::Result<()> {
        let time = FileTime::from_system_time(SystemTime::now() + ahead);
        filetime::set_file_mtime(self.path(relative_path), time)?;
        Ok(())
    }

    /// Read a file back
    pub fn read(&self, relative_path: &str) -> anyhow::Result<Vec<u8>> {
        Ok(std::fs::read(self.path(relative_path))?)
    }

    /// Check whether a tree-relative path exists
    pub fn exists(&self, relative_path: &str) -> bool {
        Path::new(&self.path(relative_path)).exists()
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new().expect("Failed to create test tree")
    }
}
