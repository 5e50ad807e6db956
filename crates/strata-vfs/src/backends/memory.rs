//! In-memory archive.
//!
//! Used for embedded assets and testing. Contents are fixed once the
//! archive is mounted; cloning shares the underlying bytes.

use std::sync::Arc;
use std::time::SystemTime;

use crate::archive::{Archive, EntryStream, SliceStream};
use crate::error::{VfsError, VfsResult};
use crate::index::EntryIndex;
use crate::types::{DirEntry, Metadata};

/// Format identifier reported by [`MemoryArchive`].
pub const MEMORY_FORMAT: &str = "memory";

/// Read-only archive assembled in code.
///
/// ```
/// use strata_vfs::backends::MemoryArchive;
/// use strata_vfs::Archive;
///
/// let archive = MemoryArchive::new()
///     .with_file("maps/level1.map", b"tiles".to_vec())
///     .unwrap();
/// assert!(archive.stat("maps").unwrap().unwrap().is_dir());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    index: EntryIndex<Arc<[u8]>>,
}

impl MemoryArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating parent directories.
    pub fn with_file(mut self, path: &str, data: impl Into<Vec<u8>>) -> VfsResult<Self> {
        self.add_file(path, data, None)?;
        Ok(self)
    }

    /// Add an empty directory.
    pub fn with_dir(mut self, path: &str) -> VfsResult<Self> {
        self.index.insert(path, Metadata::directory(), None)?;
        Ok(self)
    }

    /// Add a file with an explicit modification time.
    pub fn add_file(
        &mut self,
        path: &str,
        data: impl Into<Vec<u8>>,
        modified: Option<SystemTime>,
    ) -> VfsResult<()> {
        let data: Vec<u8> = data.into();
        let data: Arc<[u8]> = data.into();
        let mut meta = Metadata::file(data.len() as u64);
        meta.modified = modified;
        self.index.insert(path, meta, Some(data))
    }
}

impl Archive for MemoryArchive {
    fn format(&self) -> &str {
        MEMORY_FORMAT
    }

    fn stat(&self, path: &str) -> VfsResult<Option<Metadata>> {
        Ok(self.index.stat(path))
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        self.index.read_dir(path)
    }

    fn open_read(&self, path: &str) -> VfsResult<Box<dyn EntryStream>> {
        let entry = self
            .index
            .get(path)
            .ok_or_else(|| VfsError::not_found(path))?;
        if entry.meta.is_dir() {
            return Err(VfsError::is_a_directory(path));
        }
        let data = entry.data.clone().unwrap_or_else(|| Arc::from(Vec::new()));
        Ok(Box::new(SliceStream::new(data)))
    }
}
