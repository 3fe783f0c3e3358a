//! Scoped ignore rules.
//!
//! Rule files (gitignore syntax) found in a directory apply to that
//! directory's subtree. The walker pushes a frame when it enters a directory
//! holding rule files and pops it once the subtree is done. Deeper frames win,
//! so a nested `!pattern` can re-include what an outer file excluded.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use ugidx_config::log_walk_debug;
use ugidx_config::log_walk_warn;

/// Stack of ignore rule sets, innermost last
#[derive(Debug, Clone, Default)]
pub struct IgnoreStack {
    files: Vec<String>,
    frames: Vec<Gitignore>,
}

impl IgnoreStack {
    /// Create a stack honouring rule files with the given names
    pub fn new(files: &[String]) -> Self {
        Self {
            files: files.to_vec(),
            frames: Vec::new(),
        }
    }

    /// Load rule files present in `dir`.
    ///
    /// Returns whether a frame was pushed, and how many rule files or lines
    /// could not be used. Unusable lines are skipped.
    pub fn enter(&mut self, dir: &Path) -> (bool, usize) {
        let mut builder = GitignoreBuilder::new(dir);
        let mut found = false;
        let mut problems = 0;

        for name in &self.files {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            found = true;
            if let Some(err) = builder.add(&path) {
                log_walk_warn!("Problem in ignore file", path = %path.display(), error = %err);
                problems += 1;
            }
        }

        if !found {
            return (false, problems);
        }

        match builder.build() {
            Ok(rules) => {
                log_walk_debug!("Loaded ignore rules", dir = %dir.display(), rules = rules.len());
                self.frames.push(rules);
                (true, problems)
            }
            Err(e) => {
                log_walk_warn!("Failed to build ignore rules", dir = %dir.display(), error = %e);
                (false, problems + 1)
            }
        }
    }

    /// Drop the innermost frame
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn include_file(&self, path: &Path) -> bool {
        self.include(path, false)
    }

    pub fn include_dir(&self, path: &Path) -> bool {
        self.include(path, true)
    }

    fn include(&self, path: &Path, is_dir: bool) -> bool {
        for rules in self.frames.iter().rev() {
            match rules.matched(path, is_dir) {
                Match::Ignore(_) => return false,
                Match::Whitelist(_) => return true,
                Match::None => {}
            }
        }
        true
    }
}
