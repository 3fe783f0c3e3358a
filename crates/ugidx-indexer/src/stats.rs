//! Counters accumulated over one run.

use crate::{IndexerError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    /// Directories listed
    pub dirs_scanned: usize,
    /// Directories whose index file was written
    pub dirs_indexed: usize,
    /// Directories with a stale or missing index
    pub dirs_stale: usize,
    /// Candidate files seen in scanned directories
    pub files: usize,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Binary files (or unreadable archive members) stored without a table
    pub binary_skipped: usize,
    /// Files and directories excluded by ignore rules
    pub ignored: usize,
    pub warnings: usize,
    /// Total size of index files after the run
    pub index_bytes: u64,
    /// On-disk size of the files fingerprinted in this run
    pub content_bytes: u64,
    /// Fingerprints built with a table
    pub fingerprinted: usize,
    pub noise_total: f64,
    pub writes_attempted: usize,
    pub write_failures: usize,
    /// Files dated after the moment their directory was indexed; their
    /// directory stays stale until the clock passes them
    pub future_mtimes: usize,
}

impl IndexStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fingerprint with a table
    pub fn record_noise(&mut self, noise: f64) {
        self.fingerprinted += 1;
        self.noise_total += noise;
    }

    /// Mean noise over the fingerprints built in this run
    pub fn average_noise(&self) -> Option<f64> {
        if self.fingerprinted == 0 {
            None
        } else {
            Some(self.noise_total / self.fingerprinted as f64)
        }
    }

    /// Every index checked was fresh and nothing went wrong
    pub fn is_clean(&self) -> bool {
        self.dirs_stale == 0 && self.warnings == 0
    }

    /// Fails when index writes were attempted and none succeeded
    pub fn ensure_written(&self) -> Result<()> {
        if self.writes_attempted > 0 && self.write_failures == self.writes_attempted {
            return Err(IndexerError::NoIndexWritten {
                attempted: self.writes_attempted,
            });
        }
        Ok(())
    }
}
