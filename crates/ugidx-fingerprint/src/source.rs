//! Readable byte streams for indexing, one member at a time.
//!
//! Plain files are a single member. With decompression enabled, gzip files
//! are a single compressed member and zip files yield one member per stored
//! file. Every level of decompression counts against the nesting depth: with
//! depth 2 a gzip stream inside a zip member or inside another gzip stream is
//! unpacked too, and each further level unpacks one more gzip layer. Gzip
//! layers are recognised by their magic bytes, never by name. Zip archives
//! nested inside other containers are indexed as raw bytes.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::{debug, warn};
use zip::{CompressionMethod, ZipArchive};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Decompression settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompressOptions {
    pub enabled: bool,
    /// 1 = outer container only
    pub max_depth: u8,
}

impl Default for DecompressOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            max_depth: 1,
        }
    }
}

/// One readable part of a content source.
pub struct Member<'a> {
    /// Member name inside the container, or the file name for single streams
    pub name: String,
    /// Bytes are produced by a decompressor
    pub compressed: bool,
    /// Member of a multi-file archive
    pub archived: bool,
    /// Member could not be opened (encrypted or unsupported method)
    pub unreadable: bool,
    pub reader: Box<dyn Read + 'a>,
}

impl std::fmt::Debug for Member<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("compressed", &self.compressed)
            .field("archived", &self.archived)
            .field("unreadable", &self.unreadable)
            .finish_non_exhaustive()
    }
}

enum SourceKind {
    Single(Option<Member<'static>>),
    Zip(ZipMembers),
}

/// Sequence of members read from one file.
pub struct ContentSource {
    kind: SourceKind,
}

impl ContentSource {
    /// Open `path`, sniffing for gzip or zip content when decompression is on.
    pub fn open(path: &Path, options: &DecompressOptions) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !options.enabled {
            return Ok(Self::single(name, false, Box::new(file)));
        }

        let mut magic = [0u8; 4];
        let n = read_prefix(&mut file, &mut magic)?;
        file.seek(SeekFrom::Start(0))?;

        if n >= 2 && magic[..2] == GZIP_MAGIC {
            debug!(path = %path.display(), "Opening gzip stream");
            let decoder = MultiGzDecoder::new(BufReader::new(file));
            let (reader, _) = peel_gzip(Box::new(decoder), options.max_depth.saturating_sub(1))?;
            return Ok(Self::single(name, true, reader));
        }

        if n == 4 && magic == ZIP_MAGIC {
            match ZipArchive::new(file) {
                Ok(archive) => {
                    debug!(path = %path.display(), members = archive.len(), "Opening zip archive");
                    return Ok(Self {
                        kind: SourceKind::Zip(ZipMembers {
                            archive,
                            next: 0,
                            gzip_levels: options.max_depth.saturating_sub(1),
                        }),
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable zip archive, indexing raw bytes");
                    let file = File::open(path)?;
                    return Ok(Self::single(name, false, Box::new(file)));
                }
            }
        }

        Ok(Self::single(name, false, Box::new(file)))
    }

    fn single(name: String, compressed: bool, reader: Box<dyn Read + 'static>) -> Self {
        Self {
            kind: SourceKind::Single(Some(Member {
                name,
                compressed,
                archived: false,
                unreadable: false,
                reader,
            })),
        }
    }

    /// Next member, or `None` when the source is exhausted
    pub fn next_member(&mut self) -> io::Result<Option<Member<'_>>> {
        match &mut self.kind {
            SourceKind::Single(member) => Ok(member.take()),
            SourceKind::Zip(zip) => zip.next_member(),
        }
    }

    /// Source holds more than one member
    pub fn is_archive(&self) -> bool {
        matches!(self.kind, SourceKind::Zip(_))
    }
}

struct ZipMembers {
    archive: ZipArchive<File>,
    next: usize,
    /// Gzip layers still allowed inside a member
    gzip_levels: u8,
}

impl ZipMembers {
    fn next_member(&mut self) -> io::Result<Option<Member<'_>>> {
        let index = loop {
            if self.next >= self.archive.len() {
                return Ok(None);
            }
            let index = self.next;
            self.next += 1;

            let is_dir = match self.archive.by_index(index) {
                Ok(entry) => entry.is_dir(),
                Err(_) => false,
            };
            if !is_dir {
                break index;
            }
        };

        let gzip_levels = self.gzip_levels;
        match self.archive.by_index(index) {
            Ok(entry) => {
                let name = entry.name().to_string();
                let stored = entry.compression() == CompressionMethod::Stored;
                let (reader, peeled) = peel_gzip(Box::new(entry), gzip_levels)?;

                Ok(Some(Member {
                    name,
                    compressed: !stored || peeled,
                    archived: true,
                    unreadable: false,
                    reader,
                }))
            }
            Err(e) => {
                warn!(index, error = %e, "Skipping unreadable archive member");
                Ok(Some(Member {
                    name: format!("#{}", index),
                    compressed: true,
                    archived: true,
                    unreadable: true,
                    reader: Box::new(io::empty()),
                }))
            }
        }
    }
}

/// Unwrap up to `levels` gzip layers, sniffing the magic bytes of each.
///
/// Returns the innermost reader and whether any layer was removed.
fn peel_gzip<'a>(mut reader: Box<dyn Read + 'a>, levels: u8) -> io::Result<(Box<dyn Read + 'a>, bool)> {
    let mut peeled = false;
    for _ in 0..levels {
        let mut magic = [0u8; 2];
        let n = read_prefix(&mut reader, &mut magic)?;
        let restored: Box<dyn Read + 'a> = Box::new(io::Cursor::new(magic[..n].to_vec()).chain(reader));
        if n < 2 || magic != GZIP_MAGIC {
            return Ok((restored, peeled));
        }
        reader = Box::new(MultiGzDecoder::new(restored));
        peeled = true;
    }
    Ok((reader, peeled))
}

fn read_prefix<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
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
