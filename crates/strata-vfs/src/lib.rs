//! # strata-vfs
//!
//! A layered virtual filesystem assembled at runtime from directories and
//! archives.
//!
//! Key components:
//!
//! - [`Vfs`] - The filesystem context: search path, write directory, registry
//! - [`VirtualPath`] - Normalized, `/`-separated virtual paths
//! - [`ArchiveBackend`] / [`Archive`] - Plugin contract for container formats
//! - [`ArchiveRegistry`] - Probes sources against registered backends
//! - [`Handle`] - An open [`FileStream`] or [`DirectoryView`]
//! - [`ReadOnlyView`] - Open/stat/readdir surface for file serving
//!
//! ## Design Decisions
//!
//! - **Search-path order is precedence**: the first mounted source that
//!   has a path answers for it, whatever the mount points involved.
//! - **Listings merge**: enumerating a directory combines every source
//!   that has it; earlier sources win name collisions.
//! - **Writes are isolated**: create, append, mkdir and delete only touch
//!   the write directory, never the search path.
//! - **No globals**: every operation goes through an explicit [`Vfs`], so
//!   independent filesystems can coexist.

mod archive;
pub mod backends;
mod config;
mod enumerate;
mod error;
mod handle;
mod index;
mod mount;
mod path;
mod registry;
mod resolve;
mod sane;
mod types;
mod vfs;
mod view;

pub use archive::{Archive, ArchiveBackend, EntryStream, SliceStream};
pub use config::VfsConfig;
pub use error::{BackendSource, VfsError, VfsResult};
pub use handle::{DirectoryView, FileStream, Handle, HandleLease, HandleTracker};
pub use index::{EntryIndex, IndexedEntry};
pub use mount::{MountEntry, MountInfo, MountStatus, Priority, SearchPath, SourceId};
pub use path::{VirtualPath, normalize};
pub use registry::{ArchiveRegistry, PROBE_HEADER_LEN};
pub use resolve::Resolution;
pub use sane::HostDirs;
pub use types::{ArchiveInfo, DirEntry, FileType, Metadata, OpenMode, Whence};
pub use vfs::Vfs;
pub use view::{FileInfo, ReadOnlyView, ViewFile};
