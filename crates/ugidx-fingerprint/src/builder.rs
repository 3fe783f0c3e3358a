//! Sliding-window fingerprint construction and table folding.

use std::io::{self, Read};

use tracing::trace;

use crate::classify::looks_binary;
use crate::{Accuracy, Result};

/// Size of the unfolded hash table (one slot per 16-bit hash value)
pub const HASH_TABLE_SIZE: usize = 1 << MAX_LOGSIZE;
/// Smallest table a fingerprint is folded down to
pub const MIN_TABLE_SIZE: usize = 1 << MIN_LOGSIZE;
/// log2 of [`HASH_TABLE_SIZE`]
pub const MAX_LOGSIZE: u8 = 16;
/// log2 of [`MIN_TABLE_SIZE`]
pub const MIN_LOGSIZE: u8 = 7;
/// Longest n-gram recorded; one bit plane per length
pub const NGRAM_WINDOW: usize = 8;
/// Bytes requested from the stream per read
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Builder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildOptions {
    pub accuracy: Accuracy,
    /// Stop after the first chunk of binary content and record no table
    pub skip_binary: bool,
}

impl BuildOptions {
    pub fn new(accuracy: Accuracy) -> Self {
        Self {
            accuracy,
            skip_binary: false,
        }
    }

    pub fn skip_binary(mut self, skip: bool) -> Self {
        self.skip_binary = skip;
        self
    }
}

/// Finished fingerprint of one byte stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    table: Vec<u8>,
    noise: f64,
    binary: bool,
    size: u64,
}

impl Fingerprint {
    /// Fingerprint that carries no table (empty or skipped binary content)
    pub fn without_table(binary: bool, size: u64) -> Self {
        Self {
            table: Vec::new(),
            noise: 0.0,
            binary,
            size,
        }
    }

    /// Folded table bytes; empty when no table was recorded
    pub fn table(&self) -> &[u8] {
        &self.table
    }

    pub fn into_table(self) -> Vec<u8> {
        self.table
    }

    /// log2 of the table size, or 0 when there is no table
    pub fn logsize(&self) -> u8 {
        if self.table.is_empty() {
            0
        } else {
            self.table.len().trailing_zeros() as u8
        }
    }

    /// Fraction of hit bits in the final table
    pub fn noise(&self) -> f64 {
        self.noise
    }

    /// First chunk of the stream looked binary
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Bytes consumed from the stream
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn has_table(&self) -> bool {
        !self.table.is_empty()
    }
}

/// Reusable fingerprint builder.
///
/// The 64 KiB hash table and the read buffer are allocated once and reused
/// for every stream handed to [`FingerprintBuilder::build`].
pub struct FingerprintBuilder {
    options: BuildOptions,
    hashes: Box<[u8]>,
    buf: Box<[u8]>,
}

impl FingerprintBuilder {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            hashes: vec![0xFF; HASH_TABLE_SIZE].into_boxed_slice(),
            buf: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
        }
    }

    pub fn options(&self) -> BuildOptions {
        self.options
    }

    /// Consume `reader` to the end and fingerprint its bytes.
    pub fn build<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<Fingerprint> {
        self.hashes.fill(0xFF);

        let mut carry = 0;
        let mut size = 0u64;
        let mut binary = false;
        let mut first = true;

        loop {
            let n = fill(reader, &mut self.buf[carry..])?;

            if first {
                first = false;
                binary = looks_binary(&self.buf[..n]);
                if binary && self.options.skip_binary {
                    trace!(bytes = n, "Binary content skipped");
                    return Ok(Fingerprint::without_table(true, n as u64));
                }
            }

            size += n as u64;
            let len = carry + n;

            if n == 0 {
                // Closing pass: windows shorter than NGRAM_WINDOW at the tail
                for start in 0..len {
                    record(&mut self.hashes, &self.buf[start..len]);
                }
                break;
            }

            if len < NGRAM_WINDOW {
                carry = len;
                continue;
            }

            let full = len - NGRAM_WINDOW + 1;
            for start in 0..full {
                record(&mut self.hashes, &self.buf[start..start + NGRAM_WINDOW]);
            }
            self.buf.copy_within(full..len, 0);
            carry = len - full;
        }

        if size == 0 {
            return Ok(Fingerprint::without_table(false, 0));
        }

        let (table_size, noise) = fold(&mut self.hashes, self.options.accuracy.max_noise());
        trace!(size, table_size, noise, "Fingerprint built");

        Ok(Fingerprint {
            table: self.hashes[..table_size].to_vec(),
            noise,
            binary,
            size,
        })
    }
}

#[inline]
fn hash_step(h: u16, byte: u8) -> u16 {
    h.wrapping_mul(61).wrapping_add(byte as u16)
}

/// Clear one bit per prefix of `window`: plane k for the (k+1)-byte prefix.
#[inline]
fn record(hashes: &mut [u8], window: &[u8]) {
    let mut h = 0u16;
    for (k, &byte) in window.iter().enumerate() {
        h = if k == 0 { byte as u16 } else { hash_step(h, byte) };
        hashes[h as usize] &= !(1u8 << k);
    }
}

/// Fraction of cleared (hit) bits in `table`
fn noise(table: &[u8]) -> f64 {
    let hits: u64 = table.iter().map(|b| b.count_zeros() as u64).sum();
    hits as f64 / (table.len() * 8) as f64
}

/// Halve the table while the folded noise stays within `max_noise`.
///
/// Returns the final table size and its noise.
fn fold(hashes: &mut [u8], max_noise: f64) -> (usize, f64) {
    let mut size = hashes.len();
    let mut current = noise(hashes);

    while size > MIN_TABLE_SIZE {
        let half = size / 2;
        let hits: u64 = (0..half)
            .map(|i| (hashes[i] & hashes[i + half]).count_zeros() as u64)
            .sum();
        let folded = hits as f64 / (half * 8) as f64;
        if folded > max_noise {
            break;
        }

        for i in 0..half {
            hashes[i] &= hashes[i + half];
        }
        size = half;
        current = folded;
    }

    (size, current)
}

/// Check an n-gram of 1 to 8 bytes against a (possibly folded) table.
///
/// Returns `false` only when the n-gram certainly does not occur in the
/// fingerprinted content. An empty table answers `true`.
pub fn contains_ngram(table: &[u8], ngram: &[u8]) -> bool {
    if table.is_empty() || ngram.is_empty() {
        return true;
    }
    debug_assert!(table.len().is_power_of_two());
    let mask = table.len() - 1;

    let mut h = 0u16;
    for (k, &byte) in ngram.iter().take(NGRAM_WINDOW).enumerate() {
        h = if k == 0 { byte as u16 } else { hash_step(h, byte) };
        if table[h as usize & mask] & (1u8 << k) != 0 {
            return false;
        }
    }
    true
}

/// Read until `buf` is full or the stream ends.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `step` bytes per call
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(out.len()).min(self.data.len());
            out[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn text(len: usize) -> Vec<u8> {
        let mut state = 0x2545F491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                b"etaoin shrdlu cmfwyp\n"[(state % 21) as usize]
            })
            .collect()
    }

    fn build(data: &[u8], level: u8) -> Fingerprint {
        let options = BuildOptions::new(Accuracy::new(level).unwrap());
        FingerprintBuilder::new(options)
            .build(&mut &data[..])
            .unwrap()
    }

    #[test]
    fn test_empty_stream_has_no_table() {
        let fp = build(b"", 4);
        assert_eq!(fp.logsize(), 0);
        assert!(!fp.has_table());
        assert_eq!(fp.size(), 0);
    }

    #[test]
    fn test_short_stream_records_every_ngram() {
        let fp = build(b"abc", 9);
        assert!(fp.has_table());
        for ngram in [&b"a"[..], b"b", b"c", b"ab", b"bc", b"abc"] {
            assert!(contains_ngram(fp.table(), ngram), "{:?}", ngram);
        }
    }

    #[test]
    fn test_every_ngram_of_content_is_a_hit() {
        let data = text(10_000);
        for level in [0u8, 4, 9] {
            let fp = build(&data, level);
            for start in (0..data.len()).step_by(37) {
                for len in 1..=NGRAM_WINDOW.min(data.len() - start) {
                    assert!(contains_ngram(fp.table(), &data[start..start + len]));
                }
            }
        }
    }

    #[test]
    fn test_absent_ngram_usually_misses() {
        let fp = build(b"the quick brown fox jumps over the lazy dog", 9);
        assert!(!contains_ngram(fp.table(), b"ZQXJ#@!%"));
    }

    #[test]
    fn test_deterministic() {
        let data = text(50_000);
        assert_eq!(build(&data, 5), build(&data, 5));
    }

    #[test]
    fn test_builder_reuse_matches_fresh_builder() {
        let a = text(20_000);
        let b = b"short other content".to_vec();
        let mut builder = FingerprintBuilder::new(BuildOptions::new(Accuracy::new(6).unwrap()));
        builder.build(&mut &a[..]).unwrap();
        let reused = builder.build(&mut &b[..]).unwrap();
        assert_eq!(reused, build(&b, 6));
    }

    #[test]
    fn test_chunking_does_not_change_result() {
        let data = text(200_000);
        let whole = build(&data, 4);
        let mut builder = FingerprintBuilder::new(BuildOptions::new(Accuracy::new(4).unwrap()));
        let mut trickle = Trickle {
            data: &data,
            step: 3,
        };
        assert_eq!(builder.build(&mut trickle).unwrap(), whole);
    }

    #[test]
    fn test_table_size_is_power_of_two_within_bounds() {
        for level in 0..=9u8 {
            let fp = build(&text(30_000), level);
            let len = fp.table().len();
            assert!(len.is_power_of_two());
            assert!((MIN_TABLE_SIZE..=HASH_TABLE_SIZE).contains(&len));
            assert_eq!(1usize << fp.logsize(), len);
        }
    }

    #[test]
    fn test_higher_accuracy_never_shrinks_table() {
        let data = text(3_000);
        let mut previous = 0;
        for level in 0..=9u8 {
            let fp = build(&data, level);
            assert!(fp.table().len() >= previous);
            assert!(fp.noise() <= Accuracy::new(level).unwrap().max_noise());
            previous = fp.table().len();
        }
    }

    #[test]
    fn test_fold_never_loses_hits() {
        let mut hashes = vec![0xFF; HASH_TABLE_SIZE];
        let data = text(5_000);
        for start in 0..data.len() {
            let end = (start + NGRAM_WINDOW).min(data.len());
            record(&mut hashes, &data[start..end]);
        }
        let before = hashes.clone();

        let (size, _) = fold(&mut hashes, 1.0);
        assert_eq!(size, MIN_TABLE_SIZE);

        for (slot, byte) in before.iter().enumerate() {
            let folded = hashes[slot & (size - 1)];
            // every cleared bit before folding is still cleared
            assert_eq!(folded & !byte, 0);
        }
    }

    #[test]
    fn test_fold_stops_at_ceiling() {
        let mut hashes = vec![0xFF; HASH_TABLE_SIZE];
        for start in 0..4096usize {
            let bytes = (start as u32).wrapping_mul(2654435761).to_le_bytes();
            record(&mut hashes, &bytes);
        }
        let (size, current) = fold(&mut hashes, 0.25);
        assert!(current <= 0.25);
        if size > MIN_TABLE_SIZE {
            let half = size / 2;
            let hits: u64 = (0..half)
                .map(|i| (hashes[i] & hashes[i + half]).count_zeros() as u64)
                .sum();
            assert!(hits as f64 / (half * 8) as f64 > 0.25);
        }
    }

    #[test]
    fn test_skip_binary_records_no_table() {
        let data = [b'a', 0, b'b', 1, 2, 3];
        let options = BuildOptions::new(Accuracy::DEFAULT).skip_binary(true);
        let fp = FingerprintBuilder::new(options)
            .build(&mut &data[..])
            .unwrap();
        assert!(fp.is_binary());
        assert_eq!(fp.logsize(), 0);
    }

    #[test]
    fn test_binary_indexed_when_not_skipped() {
        let data = [b'a', 0, b'b', 1, 2, 3];
        let fp = build(&data, 4);
        assert!(fp.is_binary());
        assert!(fp.has_table());
        assert!(contains_ngram(fp.table(), &[0, b'b', 1]));
    }

    #[test]
    fn test_example_ten_thousand_byte_file() {
        let data = text(10_000);
        let fp = build(&data, 4);
        assert!(fp.table().len() < HASH_TABLE_SIZE);
        assert!(fp.noise() <= 0.48);
    }
}
