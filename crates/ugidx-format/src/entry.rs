//! Encoding of a single index entry.

use std::io::{self, Read, Write};

use bitflags::bitflags;
use ugidx_fingerprint::{Accuracy, MAX_LOGSIZE, MIN_LOGSIZE};

use crate::{FormatError, Result};

/// Fixed size of the header preceding each entry
pub const ENTRY_HEADER_SIZE: usize = 4;

/// Bits of the second header byte holding log2 of the table size
pub const LOGSIZE_MASK: u8 = 0x1F;

/// Longest basename an entry can carry
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

bitflags! {
    /// Flags stored in the upper bits of the logsize byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u8 {
        /// Content was decompressed before fingerprinting
        const COMPRESSED = 0x20;
        /// Entry is one member of a multi-file archive
        const ARCHIVED = 0x40;
        /// Content looked binary
        const BINARY = 0x80;
    }
}

/// Fingerprint entry of one file or archive member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub accuracy: Accuracy,
    pub flags: EntryFlags,
    /// Basename within the indexed directory
    pub name: Vec<u8>,
    /// Table of `2^logsize` bytes, empty for "no fingerprint"
    pub fingerprint: Vec<u8>,
}

impl IndexEntry {
    pub fn new(accuracy: Accuracy, flags: EntryFlags, name: Vec<u8>, fingerprint: Vec<u8>) -> Self {
        Self {
            accuracy,
            flags,
            name,
            fingerprint,
        }
    }

    /// log2 of the table size, 0 when the entry carries no fingerprint
    pub fn logsize(&self) -> u8 {
        if self.fingerprint.is_empty() {
            0
        } else {
            self.fingerprint.len().trailing_zeros() as u8
        }
    }

    pub fn has_fingerprint(&self) -> bool {
        !self.fingerprint.is_empty()
    }

    pub fn is_binary(&self) -> bool {
        self.flags.contains(EntryFlags::BINARY)
    }

    pub fn is_archived(&self) -> bool {
        self.flags.contains(EntryFlags::ARCHIVED)
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.contains(EntryFlags::COMPRESSED)
    }

    /// Bytes this entry occupies on disk
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_SIZE + self.name.len() + self.fingerprint.len()
    }

    fn header(&self) -> Result<[u8; ENTRY_HEADER_SIZE]> {
        let table = self.fingerprint.len();
        if table != 0 && !valid_table_size(table) {
            return Err(FormatError::InvalidTable(table));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(FormatError::NameTooLong(self.name.len()));
        }

        let name_len = (self.name.len() as u16).to_le_bytes();
        Ok([
            self.accuracy.to_digit(),
            self.logsize() | self.flags.bits(),
            name_len[0],
            name_len[1],
        ])
    }

    /// Write header, name and table
    pub fn encode<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.header()?)?;
        writer.write_all(&self.name)?;
        writer.write_all(&self.fingerprint)?;
        Ok(())
    }

    /// Read the next entry; `Ok(None)` at a clean end of file
    pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Self>> {
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        match read_header(reader, &mut header)? {
            0 => return Ok(None),
            ENTRY_HEADER_SIZE => {}
            n => return Err(FormatError::Corrupt(format!("truncated header ({} bytes)", n))),
        }

        let accuracy = Accuracy::from_digit(header[0])
            .ok_or_else(|| FormatError::Corrupt(format!("bad accuracy byte {:#04x}", header[0])))?;
        let logsize = header[1] & LOGSIZE_MASK;
        if logsize != 0 && !(MIN_LOGSIZE..=MAX_LOGSIZE).contains(&logsize) {
            return Err(FormatError::Corrupt(format!("table logsize {} out of range", logsize)));
        }
        let flags = EntryFlags::from_bits_truncate(header[1] & !LOGSIZE_MASK);
        let name_len = u16::from_le_bytes([header[2], header[3]]) as usize;
        let table_len = if logsize == 0 { 0 } else { 1usize << logsize };

        let mut name = vec![0u8; name_len];
        read_body(reader, &mut name)?;
        let mut fingerprint = vec![0u8; table_len];
        read_body(reader, &mut fingerprint)?;

        Ok(Some(Self {
            accuracy,
            flags,
            name,
            fingerprint,
        }))
    }
}

fn valid_table_size(len: usize) -> bool {
    len.is_power_of_two() && (MIN_LOGSIZE..=MAX_LOGSIZE).contains(&(len.trailing_zeros() as u8))
}

fn read_header<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
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

fn read_body<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::Corrupt("truncated entry body".to_string())
        } else {
            FormatError::Io(e)
        }
    })
}
