//! Removal of every index file below a root.

use std::fs;
use std::path::Path;

use ugidx_config::{log_walk_debug, log_walk_warn};
use ugidx_format::INDEX_FILENAME;
use walkdir::WalkDir;

use crate::{IndexerError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteStats {
    pub removed: usize,
    pub warnings: usize,
}

/// Delete all index files under `root`, hidden directories included.
pub fn delete_indexes(root: &Path) -> Result<DeleteStats> {
    if !root.is_dir() {
        return Err(IndexerError::NotADirectory(root.to_path_buf()));
    }

    let mut stats = DeleteStats::default();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log_walk_warn!("Failed to walk", error = %e);
                stats.warnings += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() || entry.file_name() != INDEX_FILENAME {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                log_walk_debug!("Removed index", path = %entry.path().display());
                stats.removed += 1;
            }
            Err(e) => {
                log_walk_warn!("Failed to remove index", path = %entry.path().display(), error = %e);
                stats.warnings += 1;
            }
        }
    }
    Ok(stats)
}
