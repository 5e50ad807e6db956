//! Read-only view for static file serving.
//!
//! [`ReadOnlyView`] exposes just open, stat and paged directory listing,
//! with files implementing `std::io::Read + Seek`. Errors convert to
//! `std::io::Error` with the usual kinds (`NotFound`, `IsADirectory`).

use std::io::{self, Read, Seek, SeekFrom};
use std::time::SystemTime;

use serde::Serialize;

use crate::error::{VfsError, VfsResult};
use crate::handle::Handle;
use crate::path::VirtualPath;
use crate::types::{DirEntry, Metadata, Whence};
use crate::vfs::Vfs;

/// File information as reported to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// Base name (`/` for the root).
    pub name: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether this is a directory.
    pub is_dir: bool,
    /// Last modification time, if known.
    pub mod_time: Option<SystemTime>,
}

impl FileInfo {
    fn from_metadata(path: &VirtualPath, meta: &Metadata) -> Self {
        Self {
            name: path.file_name().unwrap_or("/").to_string(),
            size: meta.size,
            is_dir: meta.is_dir(),
            mod_time: meta.modified,
        }
    }
}

impl From<DirEntry> for FileInfo {
    fn from(entry: DirEntry) -> Self {
        Self {
            name: entry.name,
            size: entry.size.unwrap_or(0),
            is_dir: entry.kind.is_dir(),
            mod_time: entry.modified,
        }
    }
}

/// Read-only filesystem view over a [`Vfs`].
#[derive(Debug, Clone)]
pub struct ReadOnlyView {
    vfs: Vfs,
}

impl ReadOnlyView {
    /// Wrap a filesystem.
    pub fn new(vfs: Vfs) -> Self {
        Self { vfs }
    }

    /// Open a file or directory.
    pub fn open(&self, name: &str) -> VfsResult<ViewFile> {
        let path = VirtualPath::new(name)?;
        let meta = self.vfs.stat(path.as_str())?;
        let handle = self.vfs.open(path.as_str())?;
        Ok(ViewFile {
            info: FileInfo::from_metadata(&path, &meta),
            handle,
        })
    }

    /// Information about `name` without opening it.
    pub fn stat(&self, name: &str) -> VfsResult<FileInfo> {
        let path = VirtualPath::new(name)?;
        let meta = self.vfs.stat(path.as_str())?;
        Ok(FileInfo::from_metadata(&path, &meta))
    }
}

/// A file or directory opened through a [`ReadOnlyView`].
#[derive(Debug)]
pub struct ViewFile {
    info: FileInfo,
    handle: Handle,
}

impl ViewFile {
    /// Information captured when the file was opened.
    pub fn stat(&self) -> &FileInfo {
        &self.info
    }

    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        self.handle.is_dir()
    }

    /// Next directory entries.
    ///
    /// `count <= 0` returns every remaining entry. Otherwise at most
    /// `count` entries come back, and an empty list once the listing is
    /// exhausted. Fails with `NotADirectory` on files.
    pub fn readdir(&mut self, count: i32) -> VfsResult<Vec<FileInfo>> {
        let path = self.handle.path().clone();
        let dir = self
            .handle
            .as_directory()
            .ok_or_else(|| VfsError::not_a_directory(path.as_str()))?;
        let limit = usize::try_from(count).ok().filter(|&n| n > 0);
        Ok(dir
            .next_entries(limit)
            .into_iter()
            .map(FileInfo::from)
            .collect())
    }

    /// Release the file.
    pub fn close(self) -> VfsResult<()> {
        self.handle.close()
    }
}

impl Read for ViewFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle.read(buf).map_err(io::Error::from)
    }
}

impl Seek for ViewFile {
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
        self.handle.seek(offset, whence).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryArchive;

    fn view() -> ReadOnlyView {
        let vfs = Vfs::new();
        let site = MemoryArchive::new()
            .with_file("index.html", "<h1>hi</h1>")
            .unwrap()
            .with_file("css/a.css", "a")
            .unwrap()
            .with_file("css/b.css", "bb")
            .unwrap()
            .with_file("css/c.css", "ccc")
            .unwrap();
        vfs.mount_archive("site", site, "/", true).unwrap();
        ReadOnlyView::new(vfs)
    }

    #[test]
    fn test_stat() {
        let view = view();
        let info = view.stat("/index.html").unwrap();
        assert_eq!(info.name, "index.html");
        assert_eq!(info.size, 11);
        assert!(!info.is_dir);

        let root = view.stat("/").unwrap();
        assert_eq!(root.name, "/");
        assert!(root.is_dir);
    }

    #[test]
    fn test_open_and_read() {
        let view = view();
        let mut file = view.open("index.html").unwrap();
        let mut body = String::new();
        file.read_to_string(&mut body).unwrap();
        assert_eq!(body, "<h1>hi</h1>");

        file.seek(SeekFrom::Start(1)).unwrap();
        let mut tag = [0u8; 2];
        file.read_exact(&mut tag).unwrap();
        assert_eq!(&tag, b"h1");
    }

    #[test]
    fn test_missing_maps_to_io_not_found() {
        let view = view();
        let err = view.open("/nope.html").unwrap_err();
        assert_eq!(io::Error::from(err).kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_readdir_paging() {
        let view = view();
        let mut dir = view.open("/css").unwrap();
        assert!(dir.is_dir());

        let first = dir.readdir(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, "a.css");
        let rest = dir.readdir(2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].size, 3);
        assert!(dir.readdir(2).unwrap().is_empty());

        let mut dir = view.open("/css").unwrap();
        assert_eq!(dir.readdir(0).unwrap().len(), 3);
        assert!(dir.readdir(-1).unwrap().is_empty());
    }

    #[test]
    fn test_readdir_on_file() {
        let view = view();
        let mut file = view.open("/index.html").unwrap();
        assert!(matches!(file.readdir(-1), Err(VfsError::NotADirectory(_))));
    }

    #[test]
    fn test_read_directory_fails() {
        let view = view();
        let mut dir = view.open("/css").unwrap();
        let mut buf = [0u8; 1];
        let err = dir.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::IsADirectory);
        dir.close().unwrap();
    }
}
