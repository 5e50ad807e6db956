//! Directory pass-through archive.
//!
//! Exposes a real directory as a read-only archive. Paths are resolved
//! relative to `root`; symbolic links are only followed when permitted.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::archive::{Archive, EntryStream};
use crate::error::{VfsError, VfsResult};
use crate::types::{DirEntry, FileType, Metadata};

/// Format identifier reported by [`DirArchive`].
pub const DIR_FORMAT: &str = "dir";

/// A directory mounted as a source.
///
/// All lookups are relative to `root`. For example, if `root` is
/// `/home/amy/game`, then `stat("maps/a.map")` inspects
/// `/home/amy/game/maps/a.map`.
#[derive(Debug, Clone)]
pub struct DirArchive {
    root: PathBuf,
    permit_symlinks: Arc<AtomicBool>,
}

impl DirArchive {
    /// Wrap a directory. Symbolic links are hidden unless permitted.
    pub fn new(root: impl Into<PathBuf>, permit_symlinks: bool) -> Self {
        Self::with_policy(root, Arc::new(AtomicBool::new(permit_symlinks)))
    }

    /// Wrap a directory whose symlink policy is shared and may change.
    pub fn with_policy(root: impl Into<PathBuf>, permit_symlinks: Arc<AtomicBool>) -> Self {
        Self {
            root: root.into(),
            permit_symlinks,
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn symlinks_permitted(&self) -> bool {
        self.permit_symlinks.load(Ordering::Relaxed)
    }

    /// Host path for creating or modifying `path` under the root.
    ///
    /// Unlike lookups, missing components are fine here. An existing
    /// symlink component is rejected unless symlinks are permitted.
    pub fn host_path_for_write(&self, path: &str) -> VfsResult<PathBuf> {
        let mut full = self.root.clone();
        let mut checking = !self.symlinks_permitted();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
            if !checking {
                continue;
            }
            match fs::symlink_metadata(&full) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(VfsError::invalid_path(format!(
                        "{path}: symbolic links are not permitted"
                    )));
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => checking = false,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(full)
    }

    /// Resolve a relative path to a host path under the root.
    ///
    /// When symlinks are not permitted, every component is checked and a
    /// link anywhere along the way makes the path invisible (`Ok(None)`).
    fn resolve(&self, path: &str) -> VfsResult<Option<PathBuf>> {
        let mut full = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
            if !self.symlinks_permitted() {
                match fs::symlink_metadata(&full) {
                    Ok(meta) if meta.file_type().is_symlink() => return Ok(None),
                    Ok(_) => {}
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                        ) =>
                    {
                        return Ok(None);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(Some(full))
    }

    /// Convert std::fs::Metadata to Metadata.
    fn metadata_to_meta(meta: &fs::Metadata) -> Metadata {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };

        Metadata {
            size: if meta.is_dir() { 0 } else { meta.len() },
            kind,
            modified: meta.modified().ok(),
            read_only: meta.permissions().readonly(),
        }
    }
}

impl Archive for DirArchive {
    fn format(&self) -> &str {
        DIR_FORMAT
    }

    fn stat(&self, path: &str) -> VfsResult<Option<Metadata>> {
        let Some(full) = self.resolve(path)? else {
            return Ok(None);
        };
        match fs::metadata(&full) {
            Ok(meta) => Ok(Some(Self::metadata_to_meta(&meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            // A path through a regular file ("file.txt/child") doesn't exist.
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let full = self
            .resolve(path)?
            .ok_or_else(|| VfsError::not_found(path))?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&full)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_symlink() && !self.symlinks_permitted() {
                continue;
            }

            // Follow links when permitted; dangling ones are skipped.
            let meta = match entry.path().metadata() {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            entries.push(DirEntry::from_metadata(
                entry.file_name().to_string_lossy(),
                &Self::metadata_to_meta(&meta),
            ));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn open_read(&self, path: &str) -> VfsResult<Box<dyn EntryStream>> {
        let full = self
            .resolve(path)?
            .ok_or_else(|| VfsError::not_found(path))?;
        let meta = fs::metadata(&full)?;
        if meta.is_dir() {
            return Err(VfsError::is_a_directory(path));
        }
        let file = File::open(&full)?;
        Ok(Box::new(FileEntryStream::new(file, meta.len())))
    }

    fn is_symlink(&self, path: &str) -> VfsResult<bool> {
        let full = self.root.join(path);
        match fs::symlink_metadata(&full) {
            Ok(meta) => Ok(meta.file_type().is_symlink()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Seekable stream over a host file.
#[derive(Debug)]
pub struct FileEntryStream {
    file: File,
    pos: u64,
    len: u64,
}

impl FileEntryStream {
    /// Wrap an open file of length `len`, positioned at 0.
    pub fn new(file: File, len: u64) -> Self {
        Self { file, pos: 0, len }
    }
}

impl Read for FileEntryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl EntryStream for FileEntryStream {
    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> u64 {
        self.len
    }
}
