//! VFS error types.

use std::io;
use thiserror::Error;

/// Boxed error surfaced verbatim from an archive backend.
pub type BackendSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path contains an embedded NUL or cannot be normalized.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No registered backend claims the source.
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// Source is not on the search path.
    #[error("not mounted: {0}")]
    NotMounted(String),

    /// Source still has open handles.
    #[error("source is busy: {0}")]
    SourceBusy(String),

    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Write attempted on a handle opened for reading.
    #[error("handle is open for reading only")]
    ReadOnlyHandle,

    /// Read attempted on a handle opened for writing.
    #[error("handle is open for writing only")]
    WriteOnlyHandle,

    /// Write operation with no write directory configured.
    #[error("no write directory is set")]
    NoWriteDirectory,

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Bad argument (whence, negative offset, seek past end).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Resizing or removing a buffer needed a seek the stream can't do.
    #[error("cannot resize buffer: {0}")]
    BufferResizeFailed(String),

    /// Failure reported by an archive backend.
    #[error("{backend} backend error: {source}")]
    Backend {
        backend: String,
        #[source]
        source: BackendSource,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(source: impl Into<String>) -> Self {
        Self::UnsupportedFormat(source.into())
    }

    /// Create a NotMounted error.
    pub fn not_mounted(source: impl Into<String>) -> Self {
        Self::NotMounted(source.into())
    }

    /// Create a SourceBusy error.
    pub fn source_busy(source: impl Into<String>) -> Self {
        Self::SourceBusy(source.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a BufferResizeFailed error.
    pub fn buffer_resize_failed(msg: impl Into<String>) -> Self {
        Self::BufferResizeFailed(msg.into())
    }

    /// Wrap a backend failure without altering it.
    pub fn backend(
        backend: impl Into<String>,
        source: impl Into<BackendSource>,
    ) -> Self {
        Self::Backend {
            backend: backend.into(),
            source: source.into(),
        }
    }

    /// Returns true for NotFound (including an io NotFound).
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::UnsupportedFormat(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::NotMounted(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::SourceBusy(msg) => io::Error::new(io::ErrorKind::ResourceBusy, msg),
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::ReadOnlyHandle => {
                io::Error::new(io::ErrorKind::PermissionDenied, "handle is open for reading only")
            }
            VfsError::WriteOnlyHandle => {
                io::Error::new(io::ErrorKind::PermissionDenied, "handle is open for writing only")
            }
            VfsError::NoWriteDirectory => {
                io::Error::new(io::ErrorKind::PermissionDenied, "no write directory is set")
            }
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::BufferResizeFailed(msg) => io::Error::other(msg),
            e @ VfsError::Backend { .. } => io::Error::other(e),
            VfsError::Io(e) => e,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
