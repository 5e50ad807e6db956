//! Core VFS types.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use strum::{Display, FromRepr};

use crate::error::{VfsError, VfsResult};

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Entry metadata as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Entry type.
    pub kind: FileType,
    /// Last modification time, if the source records one.
    pub modified: Option<SystemTime>,
    /// Whether the backing source can be written through this entry.
    pub read_only: bool,
}

impl Metadata {
    /// Metadata for a file.
    pub fn file(size: u64) -> Self {
        Self {
            size,
            kind: FileType::File,
            modified: None,
            read_only: true,
        }
    }

    /// Metadata for a directory.
    pub fn directory() -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            modified: None,
            read_only: true,
        }
    }

    /// Set the modification time.
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry produced during enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
    /// Size in bytes, when the backend reports it.
    pub size: Option<u64>,
    /// Last modification time, when the backend reports it.
    pub modified: Option<SystemTime>,
}

impl DirEntry {
    /// Create a new directory entry without size or time.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
            size: None,
            modified: None,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }

    /// Create an entry carrying full metadata.
    pub fn from_metadata(name: impl Into<String>, meta: &Metadata) -> Self {
        Self {
            name: name.into(),
            kind: meta.kind,
            size: meta.is_file().then_some(meta.size),
            modified: meta.modified,
        }
    }
}

/// How a handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OpenMode {
    /// Read from the search path.
    Read,
    /// Create or truncate in the write directory.
    Write,
    /// Append in the write directory.
    Append,
}

impl OpenMode {
    /// Returns true for `Write` and `Append`.
    pub fn is_write(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// Reference point for a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum Whence {
    /// From the start of the file.
    Start = 0,
    /// From the current position.
    Current = 1,
    /// From the end of the file.
    End = 2,
}

impl Whence {
    /// Convert a numeric whence (0, 1, 2).
    pub fn from_raw(raw: i32) -> VfsResult<Self> {
        u8::try_from(raw)
            .ok()
            .and_then(Whence::from_repr)
            .ok_or_else(|| VfsError::invalid_argument(format!("unsupported whence {raw}")))
    }
}

/// Description of a registered archive format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Format identifier the backend registered under.
    pub name: String,
    /// Conventional file extension, without the dot.
    pub extension: String,
    /// Human readable description.
    pub description: String,
}
