//! Directory enumeration for the indexer.
//!
//! One call lists one directory: candidate files and subdirectories sorted by
//! name, the directory's own modification time, and the time and size of its
//! index file, which is never listed as content.

use std::ffi::OsStr;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ugidx_config::log_walk_debug;
use ugidx_config::log_walk_warn;
use ugidx_format::INDEX_FILENAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symbolic link to a file, listed as a file when dereferencing
    Symlink,
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    /// Raw basename bytes as stored in index entries
    pub name: Vec<u8>,
    pub kind: EntryKind,
    pub size: u64,
    /// Microseconds since the Unix epoch
    pub mtime: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub hidden: bool,
    pub dereference_files: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DirListing {
    pub files: Vec<DirEntry>,
    pub dirs: Vec<DirEntry>,
    pub dir_mtime: u64,
    /// Modification time of the index file, `None` when there is none
    pub index_time: Option<u64>,
    pub index_size: u64,
    /// Children whose metadata could not be read
    pub errors: usize,
}

/// Convert a timestamp to microseconds since the epoch, clamping pre-epoch times to 0
pub fn mtime_micros(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

fn modified_micros(metadata: &Metadata) -> u64 {
    metadata.modified().map(mtime_micros).unwrap_or(0)
}

#[cfg(unix)]
fn name_bytes(name: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn name_bytes(name: &OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

/// List `dir` according to `options`.
pub fn list_dir(dir: &Path, options: &ListOptions) -> io::Result<DirListing> {
    let dir_meta = fs::metadata(dir)?;
    let mut listing = DirListing {
        dir_mtime: modified_micros(&dir_meta),
        ..Default::default()
    };

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log_walk_warn!("Failed to read directory entry", path = %dir.display(), error = %e);
                listing.errors += 1;
                continue;
            }
        };

        let file_name = entry.file_name();
        let name = name_bytes(&file_name);
        let path = entry.path();

        if file_name == INDEX_FILENAME {
            if let Ok(meta) = entry.metadata() {
                listing.index_time = Some(modified_micros(&meta));
                listing.index_size = meta.len();
            }
            continue;
        }

        if !options.hidden && name.first() == Some(&b'.') {
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(e) => {
                log_walk_warn!("Failed to stat entry", path = %path.display(), error = %e);
                listing.errors += 1;
                continue;
            }
        };

        let (kind, meta) = if file_type.is_symlink() {
            if !options.dereference_files {
                continue;
            }
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => (EntryKind::Symlink, meta),
                Ok(_) => continue,
                Err(e) => {
                    log_walk_debug!("Skipping dangling symlink", path = %path.display(), error = %e);
                    continue;
                }
            }
        } else if file_type.is_file() || file_type.is_dir() {
            match entry.metadata() {
                Ok(meta) => {
                    let kind = if meta.is_dir() {
                        EntryKind::Dir
                    } else {
                        EntryKind::File
                    };
                    (kind, meta)
                }
                Err(e) => {
                    log_walk_warn!("Failed to stat entry", path = %path.display(), error = %e);
                    listing.errors += 1;
                    continue;
                }
            }
        } else {
            continue;
        };

        let child = DirEntry {
            path,
            name,
            kind,
            size: meta.len(),
            mtime: modified_micros(&meta),
        };
        if kind == EntryKind::Dir {
            listing.dirs.push(child);
        } else {
            listing.files.push(child);
        }
    }

    listing.files.sort_by(|a, b| a.name.cmp(&b.name));
    listing.dirs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}
