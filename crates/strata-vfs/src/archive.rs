//! Archive backend contract.
//!
//! A format plugin implements [`ArchiveBackend`]: it recognizes a source by
//! its header bytes and opens it into an [`Archive`]. An archive answers
//! stat/list/open queries for paths relative to its own root and hands out
//! independent [`EntryStream`]s, so several handles can read one archive
//! concurrently.
//!
//! Relative paths passed to an archive are already normalized: no leading
//! slash, no `.`/`..`, `""` for the archive root.

use std::io::{self, Read};
use std::path::Path;

use super::error::VfsResult;
use super::types::{ArchiveInfo, DirEntry, Metadata};

/// A format plugin: probes and opens containers of one format.
pub trait ArchiveBackend: Send + Sync {
    /// Format identifier, name, extension and description.
    fn info(&self) -> ArchiveInfo;

    /// Returns true if `header` (the first bytes of the source) belongs to
    /// this format. Must not rely on the file name.
    fn probe(&self, header: &[u8]) -> bool;

    /// Open the container at `path`.
    fn open(&self, path: &Path) -> VfsResult<Box<dyn Archive>>;
}

/// An opened, read-only source of entries.
pub trait Archive: Send + Sync {
    /// Format identifier used in errors and logs.
    fn format(&self) -> &str;

    /// Metadata for `path`, or `None` if it doesn't exist.
    fn stat(&self, path: &str) -> VfsResult<Option<Metadata>>;

    /// Entries directly inside the directory `path`.
    fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    /// Open the file at `path` for reading.
    fn open_read(&self, path: &str) -> VfsResult<Box<dyn EntryStream>>;

    /// Returns true if `path` is a symbolic link in the source.
    fn is_symlink(&self, _path: &str) -> VfsResult<bool> {
        Ok(false)
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    fn exists(&self, path: &str) -> VfsResult<bool> {
        Ok(self.stat(path)?.is_some())
    }

    /// Read an entire file.
    fn read_all(&self, path: &str) -> VfsResult<Vec<u8>> {
        let mut stream = self.open_read(path)?;
        let mut data = Vec::with_capacity(stream.length() as usize);
        stream.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// A byte stream over one archive entry.
///
/// Positions are absolute offsets into the entry. Streams over compressed
/// data may be unable to move backwards; they report that from
/// [`seek_to`](EntryStream::seek_to) with `io::ErrorKind::Unsupported`.
pub trait EntryStream: Read + Send {
    /// Move to absolute offset `pos` (at most [`length`](EntryStream::length)).
    fn seek_to(&mut self, pos: u64) -> io::Result<()>;

    /// Current offset.
    fn position(&self) -> u64;

    /// Total length of the entry in bytes.
    fn length(&self) -> u64;

    /// Returns true at end of entry.
    fn at_end(&self) -> bool {
        self.position() >= self.length()
    }
}

/// Seekable stream over a byte slice held in memory.
#[derive(Debug, Clone)]
pub struct SliceStream<B> {
    data: B,
    pos: u64,
}

impl<B: AsRef<[u8]>> SliceStream<B> {
    /// Stream over `data` starting at offset 0.
    pub fn new(data: B) -> Self {
        Self { data, pos: 0 }
    }
}

impl<B: AsRef<[u8]>> Read for SliceStream<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.as_ref();
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<B: AsRef<[u8]> + Send> EntryStream for SliceStream<B> {
    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.length() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {pos} past end {}", self.length()),
            ));
        }
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> u64 {
        self.data.as_ref().len() as u64
    }
}
