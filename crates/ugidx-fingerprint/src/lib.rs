//! # ugidx-fingerprint
//!
//! Content fingerprints for the ugidx indexer.
//!
//! A fingerprint is a small Bloom-filter style bitmap over every byte n-gram
//! of length 1 to 8 in a file. Each table byte holds eight independent bit
//! planes; plane `k` records n-grams of length `k + 1`. A cleared bit is a
//! "hit". A search tool can test the n-grams of a pattern against the table
//! and skip the file when any of them misses.
//!
//! ## Table Layout
//!
//! ```text
//! slot = h(ngram) mod table_size       h' = h * 61 + byte (mod 65536)
//!
//!  bit:   7    6    5    4    3    2    1    0
//!       +----+----+----+----+----+----+----+----+
//!       | 8g | 7g | 6g | 5g | 4g | 3g | 2g | 1g |   (0 = seen)
//!       +----+----+----+----+----+----+----+----+
//! ```
//!
//! Tables start at 65536 bytes and are folded in half (twin slots AND-ed)
//! for as long as the fraction of hit bits stays within the noise ceiling
//! chosen by the [`Accuracy`] level. Folding never loses a hit.

mod builder;
mod classify;
mod source;

pub use builder::{
    contains_ngram, BuildOptions, Fingerprint, FingerprintBuilder, HASH_TABLE_SIZE,
    MAX_LOGSIZE, MIN_LOGSIZE, MIN_TABLE_SIZE, NGRAM_WINDOW, READ_BUFFER_SIZE,
};
pub use classify::looks_binary;
pub use source::{ContentSource, DecompressOptions, Member};

use std::fmt;
use std::io;

use thiserror::Error;

/// Errors that can occur while fingerprinting
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid accuracy level {0}, expected 0-9")]
    InvalidAccuracy(u8),
}

pub type Result<T> = std::result::Result<T, FingerprintError>;

/// Accuracy level 0-9 trading table size against false positives.
///
/// Level 9 targets roughly 10% hit bits (largest tables), level 0 tolerates
/// roughly 80% (smallest tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Accuracy(u8);

impl Accuracy {
    pub const MAX: Accuracy = Accuracy(9);
    pub const DEFAULT: Accuracy = Accuracy(4);

    /// Validate and wrap an accuracy level
    pub fn new(level: u8) -> Result<Self> {
        if level > Self::MAX.0 {
            return Err(FingerprintError::InvalidAccuracy(level));
        }
        Ok(Self(level))
    }

    /// Raw level 0-9
    pub fn level(self) -> u8 {
        self.0
    }

    /// Noise ceiling in whole percent: `10 + 70 * (9 - level) / 9`.
    ///
    /// Integer division is kept so tables stay compatible with existing
    /// index files, even though the steps are slightly uneven.
    pub fn max_noise_percent(self) -> u32 {
        10 + 70 * (9 - self.0 as u32) / 9
    }

    /// Noise ceiling as a fraction of all table bits
    pub fn max_noise(self) -> f64 {
        self.max_noise_percent() as f64 / 100.0
    }

    /// ASCII digit stored in index entry headers
    pub fn to_digit(self) -> u8 {
        b'0' + self.0
    }

    /// Parse an ASCII digit from an index entry header
    pub fn from_digit(digit: u8) -> Option<Self> {
        digit
            .checked_sub(b'0')
            .filter(|level| *level <= Self::MAX.0)
            .map(Self)
    }
}

impl Default for Accuracy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Accuracy {
    type Error = FingerprintError;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
