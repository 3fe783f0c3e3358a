//! Index file reader, writer and atomic replacement.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::entry::IndexEntry;
use crate::{FormatError, Result, INDEX_FILENAME, INDEX_MAGIC};

/// Path of the index file inside `dir`
pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILENAME)
}

/// Sequential reader over index entries
pub struct IndexReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> IndexReader<R> {
    /// Validate the magic bytes and position at the first entry
    pub fn new(mut inner: R) -> Result<Self> {
        let mut magic = [0u8; INDEX_MAGIC.len()];
        inner.read_exact(&mut magic).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                FormatError::BadMagic
            } else {
                FormatError::Io(e)
            }
        })?;
        if &magic != INDEX_MAGIC {
            return Err(FormatError::BadMagic);
        }
        Ok(Self { inner, done: false })
    }

    /// Next entry, `Ok(None)` once the file is exhausted
    pub fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        if self.done {
            return Ok(None);
        }
        let entry = IndexEntry::decode(&mut self.inner);
        if !matches!(entry, Ok(Some(_))) {
            self.done = true;
        }
        entry
    }
}

impl<R: Read> Iterator for IndexReader<R> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Streaming writer producing a complete index file
pub struct IndexWriter<W: Write> {
    inner: W,
    entries: usize,
    bytes: u64,
}

impl<W: Write> IndexWriter<W> {
    /// Start a new index by writing the magic bytes
    pub fn new(mut inner: W) -> Result<Self> {
        inner.write_all(INDEX_MAGIC)?;
        Ok(Self {
            inner,
            entries: 0,
            bytes: INDEX_MAGIC.len() as u64,
        })
    }

    pub fn write_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        entry.encode(&mut self.inner)?;
        self.entries += 1;
        self.bytes += entry.encoded_len() as u64;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Flush and hand back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Read every entry of an index file
pub fn read_index(path: &Path) -> Result<Vec<IndexEntry>> {
    let file = File::open(path)?;
    IndexReader::new(BufReader::new(file))?.collect()
}

/// Result of a successful index write
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

/// Index file under construction in its directory.
///
/// Entries are streamed to a temporary file next to the final index, so only
/// the entry being written has to be held in memory. [`commit`] renames the
/// file over the old index; dropping the writer without committing discards
/// it and leaves the old index untouched.
///
/// [`commit`]: IndexFileWriter::commit
pub struct IndexFileWriter {
    dir: PathBuf,
    path: PathBuf,
    writer: IndexWriter<BufWriter<NamedTempFile>>,
}

/// Position in an [`IndexFileWriter`] that later entries can be rolled back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMark {
    entries: usize,
    bytes: u64,
}

impl IndexFileWriter {
    /// Start a new index for `dir`
    pub fn create(dir: &Path) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix(".ugidx-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            path: index_path(dir),
            writer: IndexWriter::new(BufWriter::new(temp))?,
        })
    }

    pub fn write_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        self.writer.write_entry(entry)
    }

    pub fn entries(&self) -> usize {
        self.writer.entries()
    }

    pub fn bytes(&self) -> u64 {
        self.writer.bytes()
    }

    /// Remember the current end of the index
    pub fn mark(&self) -> EntryMark {
        EntryMark {
            entries: self.writer.entries,
            bytes: self.writer.bytes,
        }
    }

    /// Drop every entry written after `mark`
    pub fn rollback(&mut self, mark: EntryMark) -> Result<()> {
        let inner = &mut self.writer.inner;
        inner.flush()?;
        inner.get_ref().as_file().set_len(mark.bytes)?;
        inner.get_mut().seek(SeekFrom::Start(mark.bytes))?;
        self.writer.entries = mark.entries;
        self.writer.bytes = mark.bytes;
        Ok(())
    }

    /// Replace the old index with the entries written so far.
    ///
    /// Afterwards the index modification time is raised to at least the
    /// directory's own, which the rename just bumped.
    pub fn commit(self) -> Result<WriteOutcome> {
        let Self { dir, path, writer } = self;
        let (count, bytes) = (writer.entries(), writer.bytes());
        let temp = writer
            .finish()?
            .into_inner()
            .map_err(|e| FormatError::Io(e.into_error()))?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| FormatError::Io(e.error))?;

        let dir_mtime = fs::metadata(&dir)?.modified()?;
        let stamp = SystemTime::now().max(dir_mtime);
        filetime::set_file_mtime(&path, FileTime::from_system_time(stamp))?;

        debug!(path = %path.display(), entries = count, bytes, "Index written");
        Ok(WriteOutcome {
            path,
            entries: count,
            bytes,
        })
    }
}

/// Replace the index of `dir` with `entries`.
///
/// The new file is written next to the old one and renamed over it, so a
/// reader never sees a partial index.
pub fn write_index(dir: &Path, entries: &[IndexEntry]) -> Result<WriteOutcome> {
    let mut writer = IndexFileWriter::create(dir)?;
    for entry in entries {
        writer.write_entry(entry)?;
    }
    writer.commit()
}

/// Delete the index of `dir`; `Ok(false)` when there was none
pub fn remove_index(dir: &Path) -> Result<bool> {
    match fs::remove_file(index_path(dir)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
