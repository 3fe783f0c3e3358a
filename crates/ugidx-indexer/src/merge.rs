//! Reconciling one directory's index with its current listing.
//!
//! [`plan_merge`] walks the old entries in order and decides, per basename,
//! whether the entries survive. Consecutive entries sharing a basename are the
//! members of one archive; they are decided together, and the matching file
//! only leaves the pending list once the whole run of members is settled.
//! Kept entries retain their old order and bytes. Files that still need a
//! fingerprint follow in listing order.

use std::collections::HashMap;
use std::io;

use ugidx_config::log_index_debug;
use ugidx_config::log_index_warn;
use ugidx_fingerprint::{
    Accuracy, BuildOptions, ContentSource, DecompressOptions, FingerprintBuilder, FingerprintError,
};
use ugidx_format::{EntryFlags, FormatError, IndexEntry, IndexFileWriter};

use crate::listing::{DirEntry, DirListing};
use crate::stats::IndexStats;

/// Freshness of a directory's index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Newer than the directory and every candidate file
    Fresh,
    Stale,
    Absent,
}

/// Classify the index of a listed directory.
pub fn index_state(listing: &DirListing, candidates: &[DirEntry]) -> IndexState {
    match listing.index_time {
        None => IndexState::Absent,
        Some(t) if t >= listing.dir_mtime && candidates.iter().all(|f| f.mtime <= t) => {
            IndexState::Fresh
        }
        Some(_) => IndexState::Stale,
    }
}

/// What happens to a directory's entries on rewrite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    /// Old entries carried over unchanged, in their old order
    pub kept: Vec<IndexEntry>,
    /// Indices into the candidate list of files to fingerprint
    pub pending: Vec<usize>,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unchanged(usize),
    Stale(usize),
    Deleted,
    /// Basename already settled earlier in the file
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Kept,
    Replaced,
}

/// Basename whose run of entries is still being read
struct PendingArchive {
    name: Vec<u8>,
    outcome: Outcome,
}

/// Merge the decoded old index against the candidate files.
///
/// With `index_time` set, a matched file is unchanged when its mtime is not
/// newer than the index. `None` treats every matched file as modified.
pub fn plan_merge(
    old: Vec<IndexEntry>,
    index_time: Option<u64>,
    candidates: &[DirEntry],
) -> MergePlan {
    let by_name: HashMap<&[u8], usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_slice(), i))
        .collect();
    let mut resolved: Vec<Option<Resolution>> = vec![None; candidates.len()];
    let mut plan = MergePlan::default();
    let mut current: Option<PendingArchive> = None;

    for entry in old {
        if let Some(run) = &current {
            if run.name == entry.name {
                if matches!(run.outcome, Outcome::Unchanged(_)) {
                    plan.kept.push(entry);
                }
                continue;
            }
        }
        if let Some(run) = current.take() {
            plan.settle(run.outcome, &mut resolved);
        }

        let outcome = match by_name.get(entry.name.as_slice()) {
            None => Outcome::Deleted,
            Some(&i) if resolved[i].is_some() => Outcome::Duplicate,
            Some(&i) => match index_time {
                Some(t) if candidates[i].mtime <= t => Outcome::Unchanged(i),
                _ => Outcome::Stale(i),
            },
        };

        let name = entry.name.clone();
        if matches!(outcome, Outcome::Unchanged(_)) {
            plan.kept.push(entry);
        }
        current = Some(PendingArchive { name, outcome });
    }
    if let Some(run) = current.take() {
        plan.settle(run.outcome, &mut resolved);
    }

    for (i, resolution) in resolved.iter().enumerate() {
        match resolution {
            Some(Resolution::Kept) => {}
            Some(Resolution::Replaced) => plan.pending.push(i),
            None => {
                plan.added += 1;
                plan.pending.push(i);
            }
        }
    }
    plan
}

impl MergePlan {
    fn settle(&mut self, outcome: Outcome, resolved: &mut [Option<Resolution>]) {
        match outcome {
            Outcome::Unchanged(i) => {
                resolved[i] = Some(Resolution::Kept);
                self.unchanged += 1;
            }
            Outcome::Stale(i) => {
                resolved[i] = Some(Resolution::Replaced);
                self.modified += 1;
            }
            Outcome::Deleted => self.deleted += 1,
            Outcome::Duplicate => {}
        }
    }
}

/// Builds index entries for files, reusing one fingerprint builder
pub struct Fingerprinter {
    builder: FingerprintBuilder,
    accuracy: Accuracy,
    decompress: DecompressOptions,
}

/// Why a file's entries could not be produced
enum Failure {
    /// The content could not be read; the file is skipped
    Read(FingerprintError),
    /// The index being written failed; the directory is abandoned
    Write(FormatError),
}

impl From<FingerprintError> for Failure {
    fn from(e: FingerprintError) -> Self {
        Failure::Read(e)
    }
}

impl From<io::Error> for Failure {
    fn from(e: io::Error) -> Self {
        Failure::Read(e.into())
    }
}

impl From<FormatError> for Failure {
    fn from(e: FormatError) -> Self {
        Failure::Write(e)
    }
}

impl Fingerprinter {
    pub fn new(options: BuildOptions, decompress: DecompressOptions) -> Self {
        Self {
            accuracy: options.accuracy,
            builder: FingerprintBuilder::new(options),
            decompress,
        }
    }

    /// Append the entries for one file to `out`: one per archive member, or
    /// exactly one.
    ///
    /// Each entry goes to `out` as soon as its table is built. When the
    /// content cannot be read, entries already written for the file are
    /// rolled back, the failure is logged and counted, and `Ok(false)` is
    /// returned. Errors writing `out` itself are returned.
    pub fn fingerprint(
        &mut self,
        file: &DirEntry,
        out: &mut IndexFileWriter,
        stats: &mut IndexStats,
    ) -> ugidx_format::Result<bool> {
        let mark = out.mark();
        match self.write_entries(file, out) {
            Ok(summary) => {
                stats.content_bytes += file.size;
                stats.binary_skipped += summary.binary_skipped;
                for noise in summary.noise {
                    stats.record_noise(noise);
                }
                Ok(true)
            }
            Err(Failure::Read(e)) => {
                out.rollback(mark)?;
                log_index_warn!("Failed to read file", path = %file.path.display(), error = %e);
                stats.warnings += 1;
                Ok(false)
            }
            Err(Failure::Write(e)) => Err(e),
        }
    }

    fn write_entries(&mut self, file: &DirEntry, out: &mut IndexFileWriter) -> Result<Summary, Failure> {
        let mut source = ContentSource::open(&file.path, &self.decompress)?;
        let archive = source.is_archive();
        let mut summary = Summary::default();

        while let Some(mut member) = source.next_member()? {
            let mut flags = EntryFlags::empty();
            flags.set(EntryFlags::ARCHIVED, member.archived);
            flags.set(EntryFlags::COMPRESSED, member.compressed);
            summary.entries += 1;

            if member.unreadable {
                flags |= EntryFlags::BINARY;
                summary.binary_skipped += 1;
                out.write_entry(&IndexEntry::new(self.accuracy, flags, file.name.clone(), Vec::new()))?;
                continue;
            }

            let fingerprint = self.builder.build(&mut member.reader)?;
            if fingerprint.is_binary() {
                flags |= EntryFlags::BINARY;
                if !fingerprint.has_table() {
                    summary.binary_skipped += 1;
                }
            }
            if fingerprint.has_table() {
                summary.noise.push(fingerprint.noise());
            }
            log_index_debug!(
                "Fingerprinted",
                path = %file.path.display(),
                member = %member.name,
                size = fingerprint.size(),
                logsize = fingerprint.logsize()
            );
            out.write_entry(&IndexEntry::new(
                self.accuracy,
                flags,
                file.name.clone(),
                fingerprint.into_table(),
            ))?;
        }

        // Keep empty archives on record so they are not re-read every run
        if summary.entries == 0 && archive {
            out.write_entry(&IndexEntry::new(
                self.accuracy,
                EntryFlags::ARCHIVED,
                file.name.clone(),
                Vec::new(),
            ))?;
        }
        Ok(summary)
    }
}

#[derive(Debug, Default)]
struct Summary {
    entries: usize,
    binary_skipped: usize,
    noise: Vec<f64>,
}
