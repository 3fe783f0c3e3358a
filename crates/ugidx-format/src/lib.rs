//! # ugidx-format
//!
//! Per-directory index file format for ugidx.
//!
//! Every indexed directory holds one hidden index file listing a fingerprint
//! per file (or per archive member). There is no offset table; entries are
//! scanned sequentially. The file's own modification time is the moment the
//! directory was last indexed.
//!
//! ## Index File Format
//!
//! ```text
//! +----------------------+
//! | Magic (5B)           |  "UG#\x03\0"
//! +----------------------+
//! | Entry Header (4B)    |  accuracy digit, logsize|flags, name_len (u16 LE)
//! | Name                 |  basename bytes
//! | Fingerprint          |  2^logsize bytes, absent when logsize = 0
//! +----------------------+
//! | ... more entries     |
//! +----------------------+
//! ```
//!
//! `logsize|flags` keeps log2 of the table size in bits 0-4 and the
//! compressed (bit 5), archive member (bit 6) and binary (bit 7) flags.

mod entry;
mod file;

pub use entry::{EntryFlags, IndexEntry, ENTRY_HEADER_SIZE, LOGSIZE_MASK, MAX_NAME_LEN};
pub use file::{
    index_path, read_index, remove_index, write_index, EntryMark, IndexFileWriter, IndexReader,
    IndexWriter, WriteOutcome,
};

use std::io;

use thiserror::Error;

/// Hidden file name of the per-directory index
pub const INDEX_FILENAME: &str = "._UG#_Store";

/// Magic bytes opening every index file
pub const INDEX_MAGIC: &[u8; 5] = b"UG#\x03\0";

/// Errors that can occur during index file operations
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Bad magic bytes")]
    BadMagic,

    #[error("Corrupt index entry: {0}")]
    Corrupt(String),

    #[error("File name too long for an index entry: {0} bytes")]
    NameTooLong(usize),

    #[error("Fingerprint table of {0} bytes is not a valid table size")]
    InvalidTable(usize),
}

impl FormatError {
    /// Damage to the file contents, as opposed to an I/O failure
    pub fn is_corruption(&self) -> bool {
        !matches!(self, FormatError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
