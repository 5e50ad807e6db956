//! Open handles: buffered file streams and directory views.
//!
//! A [`Handle`] is either a [`FileStream`] (read from the search path, or
//! write/append into the write directory) or a [`DirectoryView`] returned
//! when a directory is opened. Every file stream holds a [`HandleLease`]
//! on its source so the source can't be unmounted underneath it.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{trace, warn};

use crate::archive::EntryStream;
use crate::error::{VfsError, VfsResult};
use crate::mount::SourceId;
use crate::path::VirtualPath;
use crate::types::{DirEntry, OpenMode, Whence};

// ============================================================================
// Lease tracking
// ============================================================================

/// Counts open handles per source.
#[derive(Debug, Default)]
pub struct HandleTracker {
    open: DashMap<SourceId, usize>,
}

impl HandleTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle on `id`; released when the lease drops.
    pub fn acquire(self: &Arc<Self>, id: SourceId) -> HandleLease {
        *self.open.entry(id.clone()).or_insert(0) += 1;
        HandleLease {
            tracker: Arc::clone(self),
            id,
        }
    }

    /// Number of open handles on `id`.
    pub fn open_count(&self, id: &SourceId) -> usize {
        self.open.get(id).map(|count| *count).unwrap_or(0)
    }

    /// Returns true if any handle on `id` is open.
    pub fn is_busy(&self, id: &SourceId) -> bool {
        self.open_count(id) > 0
    }

    fn release(&self, id: &SourceId) {
        if let Some(mut count) = self.open.get_mut(id) {
            *count = count.saturating_sub(1);
        }
        self.open.remove_if(id, |_, count| *count == 0);
    }
}

/// A registered open handle on a source.
#[derive(Debug)]
pub struct HandleLease {
    tracker: Arc<HandleTracker>,
    id: SourceId,
}

impl HandleLease {
    /// The leased source.
    pub fn source(&self) -> &SourceId {
        &self.id
    }
}

impl Drop for HandleLease {
    fn drop(&mut self) {
        self.tracker.release(&self.id);
    }
}

// ============================================================================
// File streams
// ============================================================================

enum Backing {
    /// Archive entry stream. Position runs ahead of the caller's cursor by
    /// the unread part of the buffer.
    Read(Box<dyn EntryStream>),
    /// Host file in the write directory. `pos` is where the pending buffer
    /// will land.
    Write { file: File, pos: u64 },
}

/// A byte stream handle with optional buffering.
pub struct FileStream {
    path: VirtualPath,
    mode: OpenMode,
    backing: Backing,
    buffer: Vec<u8>,
    buf_pos: usize,
    buf_size: usize,
    lease: HandleLease,
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("source", &self.lease.id)
            .field("buf_size", &self.buf_size)
            .finish()
    }
}

impl FileStream {
    pub(crate) fn for_read(
        path: VirtualPath,
        stream: Box<dyn EntryStream>,
        lease: HandleLease,
    ) -> Self {
        Self {
            path,
            mode: OpenMode::Read,
            backing: Backing::Read(stream),
            buffer: Vec::new(),
            buf_pos: 0,
            buf_size: 0,
            lease,
        }
    }

    pub(crate) fn for_write(
        path: VirtualPath,
        mode: OpenMode,
        file: File,
        pos: u64,
        lease: HandleLease,
    ) -> Self {
        Self {
            path,
            mode,
            backing: Backing::Write { file, pos },
            buffer: Vec::new(),
            buf_pos: 0,
            buf_size: 0,
            lease,
        }
    }

    /// Virtual path the handle was opened with.
    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Open mode.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Source backing this handle.
    pub fn source(&self) -> &SourceId {
        self.lease.source()
    }

    /// Current buffer size (0 when unbuffered).
    pub fn buffer_size(&self) -> usize {
        self.buf_size
    }

    /// Read into `buf`, returning the number of bytes read.
    ///
    /// Fills `buf` as far as the entry allows. `Ok(0)` for a non-empty
    /// `buf` means end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let Backing::Read(stream) = &mut self.backing else {
            return Err(VfsError::WriteOnlyHandle);
        };

        let mut total = 0;
        while total < buf.len() {
            if self.buf_pos < self.buffer.len() {
                let n = (buf.len() - total).min(self.buffer.len() - self.buf_pos);
                buf[total..total + n]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + n]);
                self.buf_pos += n;
                total += n;
                continue;
            }

            self.buffer.clear();
            self.buf_pos = 0;
            let wanted = buf.len() - total;
            let n = if self.buf_size == 0 || wanted >= self.buf_size {
                stream.read(&mut buf[total..])?
            } else {
                stream
                    .by_ref()
                    .take(self.buf_size as u64)
                    .read_to_end(&mut self.buffer)?;
                if self.buffer.is_empty() {
                    0
                } else {
                    continue;
                }
            };
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Read everything from the cursor to the end.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> VfsResult<usize> {
        let mut chunk = [0u8; 8192];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }

    /// Write all of `data`, returning its length.
    pub fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        if !self.mode.is_write() {
            return Err(VfsError::ReadOnlyHandle);
        }

        if self.buf_size > 0 && self.buffer.len() + data.len() <= self.buf_size {
            self.buffer.extend_from_slice(data);
            return Ok(data.len());
        }

        self.flush_buffer()?;
        if self.buf_size > 0 && data.len() < self.buf_size {
            self.buffer.extend_from_slice(data);
        } else if let Backing::Write { file, pos } = &mut self.backing {
            file.write_all(data)?;
            *pos += data.len() as u64;
        }
        Ok(data.len())
    }

    /// Current offset.
    pub fn tell(&self) -> u64 {
        match &self.backing {
            Backing::Read(stream) => {
                stream.position() - (self.buffer.len() - self.buf_pos) as u64
            }
            Backing::Write { pos, .. } => pos + self.buffer.len() as u64,
        }
    }

    /// Length of the file in bytes.
    pub fn length(&self) -> VfsResult<u64> {
        match &self.backing {
            Backing::Read(stream) => Ok(stream.length()),
            Backing::Write { file, .. } => Ok(file.metadata()?.len().max(self.tell())),
        }
    }

    /// Returns true when the cursor is at or past the end.
    pub fn eof(&self) -> bool {
        match &self.backing {
            Backing::Read(stream) => self.tell() >= stream.length(),
            Backing::Write { .. } => self.length().map(|len| self.tell() >= len).unwrap_or(true),
        }
    }

    /// Move the cursor, returning the new absolute offset.
    ///
    /// Read handles can't move past the end of the entry. A seek that
    /// stays inside the read buffer doesn't touch the backend.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> VfsResult<u64> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.tell(),
            Whence::End => self.length()?,
        };
        let target = base
            .checked_add_signed(offset)
            .ok_or_else(|| VfsError::invalid_argument(format!("seek to {base} + {offset}")))?;

        match &mut self.backing {
            Backing::Read(stream) => {
                if target > stream.length() {
                    return Err(VfsError::invalid_argument(format!(
                        "seek to {target} past end {}",
                        stream.length()
                    )));
                }
                let window_end = stream.position();
                let window_start = window_end - self.buffer.len() as u64;
                if !self.buffer.is_empty() && (window_start..=window_end).contains(&target) {
                    self.buf_pos = (target - window_start) as usize;
                } else {
                    self.buffer.clear();
                    self.buf_pos = 0;
                    stream.seek_to(target)?;
                }
            }
            Backing::Write { .. } => {
                self.flush_buffer()?;
                if let Backing::Write { file, pos } = &mut self.backing {
                    file.seek(SeekFrom::Start(target))?;
                    *pos = target;
                }
            }
        }
        trace!(path = %self.path, target, "Seek");
        Ok(target)
    }

    /// Resize the I/O buffer; 0 removes it.
    ///
    /// Pending writes are flushed first. On a read handle, unread buffered
    /// bytes are given back by seeking the backend to the cursor, which
    /// fails with [`VfsError::BufferResizeFailed`] if the backend can't
    /// move backwards.
    pub fn set_buffer_size(&mut self, size: usize) -> VfsResult<()> {
        let mut resized = Vec::new();
        resized.try_reserve_exact(size).map_err(|e| {
            VfsError::buffer_resize_failed(format!("{}: {size} bytes: {e}", self.path))
        })?;

        match &mut self.backing {
            Backing::Read(stream) => {
                if self.buf_pos < self.buffer.len() {
                    let cursor = stream.position() - (self.buffer.len() - self.buf_pos) as u64;
                    stream.seek_to(cursor).map_err(|e| {
                        VfsError::buffer_resize_failed(format!("{}: {e}", self.path))
                    })?;
                }
                self.buf_pos = 0;
            }
            Backing::Write { .. } => self.flush_buffer()?,
        }
        self.buffer = resized;
        self.buf_size = size;
        Ok(())
    }

    /// Write out any buffered data. A no-op for read handles.
    pub fn flush(&mut self) -> VfsResult<()> {
        self.flush_buffer()?;
        if let Backing::Write { file, .. } = &mut self.backing {
            file.flush()?;
        }
        Ok(())
    }

    /// Flush and release the handle.
    pub fn close(mut self) -> VfsResult<()> {
        self.flush()
    }

    fn flush_buffer(&mut self) -> VfsResult<()> {
        if let Backing::Write { file, pos } = &mut self.backing
            && !self.buffer.is_empty()
        {
            file.write_all(&self.buffer)?;
            *pos += self.buffer.len() as u64;
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path, error = %e, "Flush on drop failed");
        }
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FileStream::read(self, buf).map_err(io::Error::from)
    }
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FileStream::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        FileStream::flush(self).map_err(io::Error::from)
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset too large")
                })?,
                Whence::Start,
            ),
            SeekFrom::Current(n) => (n, Whence::Current),
            SeekFrom::End(n) => (n, Whence::End),
        };
        FileStream::seek(self, offset, whence).map_err(io::Error::from)
    }
}

// ============================================================================
// Directory views
// ============================================================================

/// A directory opened as a handle.
///
/// Holds the merged listing taken when the directory was opened and a
/// cursor for paged reads.
#[derive(Debug, Clone)]
pub struct DirectoryView {
    path: VirtualPath,
    entries: Vec<DirEntry>,
    cursor: usize,
}

impl DirectoryView {
    pub(crate) fn new(path: VirtualPath, entries: Vec<DirEntry>) -> Self {
        Self {
            path,
            entries,
            cursor: 0,
        }
    }

    /// Virtual path of the directory.
    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Every entry, sorted by name.
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Next entries from the cursor: at most `limit`, or all remaining.
    pub fn next_entries(&mut self, limit: Option<usize>) -> Vec<DirEntry> {
        let remaining = self.entries.len() - self.cursor;
        let n = limit.map_or(remaining, |limit| limit.min(remaining));
        let page = self.entries[self.cursor..self.cursor + n].to_vec();
        self.cursor += n;
        page
    }

    /// Move the cursor back to the first entry.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Result of opening a virtual path.
#[derive(Debug)]
pub enum Handle {
    /// A readable or writable byte stream.
    File(FileStream),
    /// A directory; stream operations fail with `IsADirectory`.
    Directory(DirectoryView),
}

impl Handle {
    /// Virtual path the handle was opened with.
    pub fn path(&self) -> &VirtualPath {
        match self {
            Handle::File(file) => file.path(),
            Handle::Directory(dir) => dir.path(),
        }
    }

    /// Returns true for directory handles.
    pub fn is_dir(&self) -> bool {
        matches!(self, Handle::Directory(_))
    }

    /// The file stream, or `IsADirectory`.
    pub fn into_file(self) -> VfsResult<FileStream> {
        match self {
            Handle::File(file) => Ok(file),
            Handle::Directory(dir) => Err(VfsError::is_a_directory(dir.path.as_str())),
        }
    }

    /// The directory view, if this is one.
    pub fn as_directory(&mut self) -> Option<&mut DirectoryView> {
        match self {
            Handle::Directory(dir) => Some(dir),
            Handle::File(_) => None,
        }
    }

    fn file(&self) -> VfsResult<&FileStream> {
        match self {
            Handle::File(file) => Ok(file),
            Handle::Directory(dir) => Err(VfsError::is_a_directory(dir.path.as_str())),
        }
    }

    fn file_mut(&mut self) -> VfsResult<&mut FileStream> {
        match self {
            Handle::File(file) => Ok(file),
            Handle::Directory(dir) => Err(VfsError::is_a_directory(dir.path.as_str())),
        }
    }

    /// See [`FileStream::read`].
    pub fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        self.file_mut()?.read(buf)
    }

    /// See [`FileStream::write`].
    pub fn write(&mut self, data: &[u8]) -> VfsResult<usize> {
        self.file_mut()?.write(data)
    }

    /// See [`FileStream::seek`].
    pub fn seek(&mut self, offset: i64, whence: Whence) -> VfsResult<u64> {
        self.file_mut()?.seek(offset, whence)
    }

    /// See [`FileStream::tell`].
    pub fn tell(&self) -> VfsResult<u64> {
        Ok(self.file()?.tell())
    }

    /// See [`FileStream::length`].
    pub fn length(&self) -> VfsResult<u64> {
        self.file()?.length()
    }

    /// End of file. Always true for directories.
    pub fn eof(&self) -> bool {
        match self {
            Handle::File(file) => file.eof(),
            Handle::Directory(_) => true,
        }
    }

    /// See [`FileStream::set_buffer_size`].
    pub fn set_buffer_size(&mut self, size: usize) -> VfsResult<()> {
        self.file_mut()?.set_buffer_size(size)
    }

    /// See [`FileStream::flush`]. A no-op for directories.
    pub fn flush(&mut self) -> VfsResult<()> {
        match self {
            Handle::File(file) => file.flush(),
            Handle::Directory(_) => Ok(()),
        }
    }

    /// Flush and release.
    pub fn close(self) -> VfsResult<()> {
        match self {
            Handle::File(file) => file.close(),
            Handle::Directory(_) => Ok(()),
        }
    }
}
