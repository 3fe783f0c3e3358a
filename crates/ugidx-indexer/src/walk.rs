//! Tree walk driving the per-directory merge.

use std::mem;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ugidx_config::path::display_relative;
use ugidx_config::{log_index_info, log_index_warn, log_walk_info, log_walk_warn, Config};
use ugidx_fingerprint::{Accuracy, BuildOptions, DecompressOptions};
use ugidx_format::{index_path, read_index, IndexEntry, IndexFileWriter, WriteOutcome};

use crate::listing::{list_dir, mtime_micros, DirEntry, DirListing, ListOptions};
use crate::merge::{index_state, plan_merge, Fingerprinter, IndexState};
use crate::rules::IgnoreStack;
use crate::stats::IndexStats;
use crate::{IndexerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Bring every index up to date
    Index,
    /// Report stale or missing indexes without writing
    Check,
}

/// Directory being processed, with its name relative to the walk root
struct DirTarget<'a> {
    path: &'a Path,
    shown: PathBuf,
}

enum WorkItem {
    Dir(PathBuf),
    /// Subtree of the directory that pushed an ignore frame is done
    PopRules,
}

/// Walks a tree and maintains one index file per directory.
pub struct Indexer {
    list_options: ListOptions,
    ignore_files: Vec<String>,
    force: bool,
    fingerprinter: Fingerprinter,
}

impl Indexer {
    /// Build an indexer from a validated configuration
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let accuracy = Accuracy::new(config.index.accuracy)?;
        let build = BuildOptions::new(accuracy).skip_binary(config.index.skip_binary);
        let decompress = DecompressOptions {
            enabled: config.decompress.enabled,
            max_depth: config.decompress.max_depth,
        };

        Ok(Self {
            list_options: ListOptions {
                hidden: config.walk.hidden,
                dereference_files: config.walk.dereference_files,
            },
            ignore_files: config.walk.ignore_files.clone(),
            force: config.index.force,
            fingerprinter: Fingerprinter::new(build, decompress),
        })
    }

    /// Walk `root` depth first and index or check every directory.
    pub fn run(&mut self, root: &Path, mode: RunMode) -> Result<IndexStats> {
        if !root.is_dir() {
            return Err(IndexerError::NotADirectory(root.to_path_buf()));
        }

        log_walk_info!("Starting walk", root = %root.display(), mode = ?mode);
        Ok(self.walk(root, vec![WorkItem::Dir(root.to_path_buf())], mode))
    }

    fn walk(&mut self, root: &Path, mut work: Vec<WorkItem>, mode: RunMode) -> IndexStats {
        let mut stats = IndexStats::new();
        let mut rules = IgnoreStack::new(&self.ignore_files);

        while let Some(item) = work.pop() {
            let dir = match item {
                WorkItem::Dir(dir) => dir,
                WorkItem::PopRules => {
                    rules.pop();
                    continue;
                }
            };

            let mut listing = match list_dir(&dir, &self.list_options) {
                Ok(listing) => listing,
                Err(e) => {
                    log_walk_warn!("Failed to read directory", path = %dir.display(), error = %e);
                    stats.warnings += 1;
                    continue;
                }
            };
            stats.dirs_scanned += 1;
            stats.warnings += listing.errors;

            let (pushed, problems) = rules.enter(&dir);
            stats.warnings += problems;
            if pushed {
                work.push(WorkItem::PopRules);
            }

            // Reverse so subdirectories come off the stack in name order
            for sub in mem::take(&mut listing.dirs).into_iter().rev() {
                if rules.include_dir(&sub.path) {
                    work.push(WorkItem::Dir(sub.path));
                } else {
                    stats.ignored += 1;
                }
            }

            let (candidates, ignored): (Vec<DirEntry>, Vec<DirEntry>) = mem::take(&mut listing.files)
                .into_iter()
                .partition(|f| rules.include_file(&f.path));
            stats.ignored += ignored.len();
            stats.files += candidates.len();

            let target = DirTarget {
                path: &dir,
                shown: display_relative(root, &dir),
            };
            match mode {
                RunMode::Index => self.index_dir(&target, &listing, &candidates, &mut stats),
                RunMode::Check => self.check_dir(&target, &listing, &candidates, &mut stats),
            }
        }

        log_walk_info!(
            "Walk complete",
            dirs = stats.dirs_scanned,
            indexed = stats.dirs_indexed,
            stale = stats.dirs_stale,
            warnings = stats.warnings
        );
        stats
    }

    fn index_dir(
        &mut self,
        target: &DirTarget<'_>,
        listing: &DirListing,
        candidates: &[DirEntry],
        stats: &mut IndexStats,
    ) {
        let state = index_state(listing, candidates);
        if state == IndexState::Fresh && !self.force {
            stats.unchanged += candidates.len();
            stats.index_bytes += listing.index_size;
            return;
        }
        if state != IndexState::Fresh {
            stats.dirs_stale += 1;
        }

        let (old, index_time) = match state {
            IndexState::Absent => (Vec::new(), None),
            _ if self.force => (load_old(target.path, stats), None),
            _ => (load_old(target.path, stats), listing.index_time),
        };
        let plan = plan_merge(old, index_time, candidates);
        stats.added += plan.added;
        stats.modified += plan.modified;
        stats.deleted += plan.deleted;
        stats.unchanged += plan.unchanged;

        let now = mtime_micros(SystemTime::now());
        for file in candidates.iter().filter(|f| f.mtime > now) {
            log_walk_warn!("File dated in the future, directory stays stale", path = %file.path.display());
            stats.future_mtimes += 1;
        }

        let (added, modified, deleted) = (plan.added, plan.modified, plan.deleted);
        stats.writes_attempted += 1;
        match self.write_dir(target.path, plan.kept, &plan.pending, candidates, stats) {
            Ok(outcome) => {
                stats.dirs_indexed += 1;
                stats.index_bytes += outcome.bytes;
                log_index_info!(
                    "Indexed directory",
                    dir = %target.shown.display(),
                    entries = outcome.entries,
                    added,
                    modified,
                    deleted
                );
            }
            Err(e) => {
                log_index_warn!("Failed to write index", dir = %target.path.display(), error = %e);
                stats.write_failures += 1;
                stats.warnings += 1;
            }
        }
    }

    /// Stream the kept entries, then fresh fingerprints, into a new index
    fn write_dir(
        &mut self,
        dir: &Path,
        kept: Vec<IndexEntry>,
        pending: &[usize],
        candidates: &[DirEntry],
        stats: &mut IndexStats,
    ) -> ugidx_format::Result<WriteOutcome> {
        let mut out = IndexFileWriter::create(dir)?;
        for entry in kept {
            out.write_entry(&entry)?;
        }
        for &i in pending {
            self.fingerprinter.fingerprint(&candidates[i], &mut out, stats)?;
        }
        out.commit()
    }

    fn check_dir(
        &self,
        target: &DirTarget<'_>,
        listing: &DirListing,
        candidates: &[DirEntry],
        stats: &mut IndexStats,
    ) {
        match index_state(listing, candidates) {
            IndexState::Fresh => {
                stats.unchanged += candidates.len();
                stats.index_bytes += listing.index_size;
            }
            IndexState::Absent => {
                stats.dirs_stale += 1;
                stats.added += candidates.len();
                log_walk_info!("Missing index", dir = %target.shown.display(), files = candidates.len());
            }
            IndexState::Stale => {
                stats.dirs_stale += 1;
                stats.index_bytes += listing.index_size;
                let plan = plan_merge(load_old(target.path, stats), listing.index_time, candidates);
                stats.added += plan.added;
                stats.modified += plan.modified;
                stats.deleted += plan.deleted;
                stats.unchanged += plan.unchanged;
                log_walk_info!(
                    "Stale index",
                    dir = %target.shown.display(),
                    added = plan.added,
                    modified = plan.modified,
                    deleted = plan.deleted
                );
            }
        }
    }
}

/// Decode the existing index; a damaged or unreadable one counts as empty.
fn load_old(dir: &Path, stats: &mut IndexStats) -> Vec<IndexEntry> {
    let path = index_path(dir);
    match read_index(&path) {
        Ok(entries) => entries,
        Err(e) => {
            if e.is_corruption() {
                log_index_warn!("Corrupt index, rebuilding directory", path = %path.display(), error = %e);
            } else {
                log_index_warn!("Failed to read index", path = %path.display(), error = %e);
            }
            stats.warnings += 1;
            Vec::new()
        }
    }
}
