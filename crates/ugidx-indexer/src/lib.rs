//! # ugidx-indexer
//!
//! Incremental content indexing of a directory tree.
//!
//! The [`Indexer`] walks a tree depth first, honouring gitignore-style rule
//! files, and reconciles each directory's index file against the current
//! listing:
//!
//! - **Fresh**: the index is newer than the directory and every candidate
//!   file; nothing is read or written.
//! - **Stale**: old entries of unchanged files are kept as they are, entries
//!   of modified or deleted files are dropped, and new or modified files get
//!   fresh fingerprints appended.
//! - **Absent**: like stale, starting from an empty index.
//!
//! Change detection relies on modification times alone. Per-file and
//! per-directory failures are logged and counted in [`IndexStats`]; they never
//! abort the walk.

pub mod delete;
pub mod listing;
pub mod merge;
pub mod rules;
pub mod stats;
pub mod walk;

pub use delete::{delete_indexes, DeleteStats};
pub use listing::{list_dir, mtime_micros, DirEntry, DirListing, EntryKind, ListOptions};
pub use merge::{index_state, plan_merge, Fingerprinter, IndexState, MergePlan};
pub use rules::IgnoreStack;
pub use stats::IndexStats;
pub use walk::{Indexer, RunMode};

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use ugidx_config::ConfigError;
use ugidx_fingerprint::FingerprintError;
use ugidx_format::FormatError;

/// Errors that end an indexing run before or instead of producing a report
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Index format error: {0}")]
    Format(#[from] FormatError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("No index file could be written ({attempted} attempted)")]
    NoIndexWritten { attempted: usize },
}

pub type Result<T> = std::result::Result<T, IndexerError>;
