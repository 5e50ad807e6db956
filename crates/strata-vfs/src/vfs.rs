//! The filesystem context.
//!
//! [`Vfs`] owns the search path, the write directory and the archive
//! registry. It is cheap to clone; clones share state. Mount table changes
//! take an exclusive lock, while resolution, enumeration and opening share
//! a read lock, so lookups never observe a half-applied mount.

use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::archive::{Archive, ArchiveBackend};
use crate::backends::DirArchive;
use crate::config::VfsConfig;
use crate::error::{VfsError, VfsResult};
use crate::handle::{DirectoryView, FileStream, Handle, HandleTracker};
use crate::mount::{MountInfo, MountStatus, Priority, SearchPath, SourceId};
use crate::path::VirtualPath;
use crate::registry::ArchiveRegistry;
use crate::types::{ArchiveInfo, DirEntry, Metadata, OpenMode};

/// The designated write directory.
#[derive(Debug)]
struct WriteDir {
    id: SourceId,
    archive: DirArchive,
}

#[derive(Debug, Default)]
struct MountState {
    search_path: SearchPath,
    write_dir: Option<WriteDir>,
}

#[derive(Debug)]
struct Shared {
    state: RwLock<MountState>,
    registry: RwLock<ArchiveRegistry>,
    read_handles: Arc<HandleTracker>,
    write_handles: Arc<HandleTracker>,
    permit_symlinks: Arc<AtomicBool>,
    config: VfsConfig,
}

/// A layered virtual filesystem.
///
/// ```
/// use strata_vfs::{Vfs, backends::MemoryArchive};
///
/// let vfs = Vfs::new();
/// let base = MemoryArchive::new().with_file("readme.txt", "base").unwrap();
/// vfs.mount_archive("base", base, "/", true).unwrap();
/// assert_eq!(vfs.read("/readme.txt").unwrap(), b"base");
/// ```
#[derive(Debug, Clone)]
pub struct Vfs {
    shared: Arc<Shared>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// Create a filesystem with the default configuration.
    pub fn new() -> Self {
        Self::with_config(VfsConfig::default())
    }

    /// Create a filesystem with `config`.
    pub fn with_config(config: VfsConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(MountState::default()),
                registry: RwLock::new(ArchiveRegistry::new()),
                read_handles: Arc::new(HandleTracker::new()),
                write_handles: Arc::new(HandleTracker::new()),
                permit_symlinks: Arc::new(AtomicBool::new(config.permit_symlinks)),
                config,
            }),
        }
    }

    /// The configuration this filesystem was created with.
    pub fn config(&self) -> &VfsConfig {
        &self.shared.config
    }

    // ========================================================================
    // Backends
    // ========================================================================

    /// Register an archive backend. Earlier registrations win probes.
    pub fn register_backend(&self, backend: impl ArchiveBackend + 'static) {
        self.shared.registry.write().register(backend);
    }

    /// Register an archive backend (already wrapped in Arc).
    pub fn register_backend_arc(&self, backend: Arc<dyn ArchiveBackend>) {
        self.shared.registry.write().register_arc(backend);
    }

    /// Formats of the registered backends, in probe order.
    pub fn supported_archive_types(&self) -> Vec<ArchiveInfo> {
        self.shared.registry.read().supported_types()
    }

    /// Allow or forbid following symbolic links in mounted directories.
    ///
    /// Applies to directories already mounted.
    pub fn permit_symbolic_links(&self, allow: bool) {
        self.shared.permit_symlinks.store(allow, Ordering::Relaxed);
        debug!(allow, "Symbolic link policy changed");
    }

    /// Returns true if symbolic links are followed.
    pub fn symbolic_links_permitted(&self) -> bool {
        self.shared.permit_symlinks.load(Ordering::Relaxed)
    }

    // ========================================================================
    // Search path
    // ========================================================================

    /// Mount a directory or archive at `mount_point`.
    ///
    /// Directories are passed through; anything else goes to the archive
    /// registry. `append` puts the source last on the search path, otherwise
    /// first. Mounting a source that is already mounted changes nothing and
    /// returns [`MountStatus::AlreadyMounted`].
    pub fn mount(
        &self,
        source: impl AsRef<Path>,
        mount_point: &str,
        append: bool,
    ) -> VfsResult<MountStatus> {
        let source = source.as_ref();
        let mount_point = VirtualPath::new(mount_point)?;
        let id = SourceId::from_path(source);

        if self.shared.state.read().search_path.contains(&id) {
            debug!(source = %id, "Already mounted");
            return Ok(MountStatus::AlreadyMounted);
        }

        let meta = fs::metadata(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VfsError::not_found(source.display().to_string()),
            _ => e.into(),
        })?;
        let archive: Arc<dyn Archive> = if meta.is_dir() {
            let root = dunce::canonicalize(source)?;
            Arc::new(DirArchive::with_policy(
                root,
                Arc::clone(&self.shared.permit_symlinks),
            ))
        } else {
            Arc::from(self.shared.registry.read().open(source)?)
        };

        self.insert(id, mount_point, append, archive)
    }

    /// Mount `source` at the root.
    pub fn add_to_search_path(
        &self,
        source: impl AsRef<Path>,
        append: bool,
    ) -> VfsResult<MountStatus> {
        self.mount(source, "/", append)
    }

    /// Mount an already opened archive under the identifier `name`.
    pub fn mount_archive(
        &self,
        name: impl Into<String>,
        archive: impl Archive + 'static,
        mount_point: &str,
        append: bool,
    ) -> VfsResult<MountStatus> {
        self.mount_archive_arc(name, Arc::new(archive), mount_point, append)
    }

    /// Mount an already opened archive (already wrapped in Arc).
    pub fn mount_archive_arc(
        &self,
        name: impl Into<String>,
        archive: Arc<dyn Archive>,
        mount_point: &str,
        append: bool,
    ) -> VfsResult<MountStatus> {
        let mount_point = VirtualPath::new(mount_point)?;
        self.insert(SourceId::named(name), mount_point, append, archive)
    }

    fn insert(
        &self,
        id: SourceId,
        mount_point: VirtualPath,
        append: bool,
        archive: Arc<dyn Archive>,
    ) -> VfsResult<MountStatus> {
        let format = archive.format().to_string();
        let mut state = self.shared.state.write();
        let status = state.search_path.insert(
            id.clone(),
            mount_point.clone(),
            Priority::from_append(append),
            archive,
        );
        match status {
            MountStatus::Mounted => {
                info!(source = %id, mount_point = %mount_point, format, append, "Mounted")
            }
            MountStatus::AlreadyMounted => debug!(source = %id, "Already mounted"),
        }
        Ok(status)
    }

    /// Remove a source from the search path.
    ///
    /// Fails with [`VfsError::SourceBusy`] while files opened from it are
    /// still open, including writers when the source is also the write
    /// directory.
    pub fn unmount(&self, source: &SourceId) -> VfsResult<()> {
        let mut state = self.shared.state.write();
        if !state.search_path.contains(source) {
            return Err(VfsError::not_mounted(source.as_str()));
        }
        let open = self.shared.read_handles.open_count(source)
            + self.shared.write_handles.open_count(source);
        if open > 0 {
            debug!(source = %source, open, "Unmount refused");
            return Err(VfsError::source_busy(source.as_str()));
        }
        state.search_path.remove(source);
        info!(source = %source, "Unmounted");
        Ok(())
    }

    /// Mount point of a mounted source.
    pub fn mount_point(&self, source: &SourceId) -> Option<VirtualPath> {
        self.shared.state.read().search_path.mount_point(source)
    }

    /// Mounted sources in resolution order.
    pub fn search_path(&self) -> Vec<SourceId> {
        self.shared.state.read().search_path.ids()
    }

    /// Mounted sources with their mount points and formats.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.shared.state.read().search_path.list()
    }

    // ========================================================================
    // Write directory
    // ========================================================================

    /// Make `dir` the target of create, append, mkdir and delete.
    ///
    /// Fails with [`VfsError::SourceBusy`] while files opened for writing in
    /// the current write directory are still open.
    pub fn set_write_dir(&self, dir: impl AsRef<Path>) -> VfsResult<()> {
        let dir = dir.as_ref();
        let meta = fs::metadata(dir).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VfsError::not_found(dir.display().to_string()),
            _ => e.into(),
        })?;
        if !meta.is_dir() {
            return Err(VfsError::not_a_directory(dir.display().to_string()));
        }
        let root = dunce::canonicalize(dir)?;
        let write_dir = WriteDir {
            id: SourceId::from_path(&root),
            archive: DirArchive::with_policy(root, Arc::clone(&self.shared.permit_symlinks)),
        };

        let mut state = self.shared.state.write();
        self.ensure_write_dir_idle(&state)?;
        info!(write_dir = %write_dir.id, "Write directory set");
        state.write_dir = Some(write_dir);
        Ok(())
    }

    /// Unset the write directory.
    pub fn clear_write_dir(&self) -> VfsResult<()> {
        let mut state = self.shared.state.write();
        self.ensure_write_dir_idle(&state)?;
        if state.write_dir.take().is_some() {
            info!("Write directory cleared");
        }
        Ok(())
    }

    /// The current write directory.
    pub fn write_dir(&self) -> Option<SourceId> {
        self.shared
            .state
            .read()
            .write_dir
            .as_ref()
            .map(|wd| wd.id.clone())
    }

    fn ensure_write_dir_idle(&self, state: &MountState) -> VfsResult<()> {
        if let Some(current) = &state.write_dir
            && self.shared.write_handles.is_busy(&current.id)
        {
            return Err(VfsError::source_busy(current.id.as_str()));
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns true if `path` resolves on the search path.
    pub fn exists(&self, path: &str) -> VfsResult<bool> {
        let path = VirtualPath::new(path)?;
        Ok(self.shared.state.read().search_path.stat(&path)?.is_some())
    }

    /// Returns true if `path` resolves to a directory.
    pub fn is_directory(&self, path: &str) -> VfsResult<bool> {
        let path = VirtualPath::new(path)?;
        self.shared.state.read().search_path.is_directory(&path)
    }

    /// Metadata of the entry that answers for `path`.
    pub fn stat(&self, path: &str) -> VfsResult<Metadata> {
        let path = VirtualPath::new(path)?;
        self.shared
            .state
            .read()
            .search_path
            .stat(&path)?
            .ok_or_else(|| VfsError::not_found(path.as_str()))
    }

    /// Modification time of `path`, if its source records one.
    pub fn last_mod_time(&self, path: &str) -> VfsResult<Option<SystemTime>> {
        Ok(self.stat(path)?.modified)
    }

    /// The source that answers for `path`.
    ///
    /// `None` when nothing does, or when `path` exists only as an ancestor
    /// of a mount point.
    pub fn real_dir(&self, path: &str) -> VfsResult<Option<SourceId>> {
        let path = VirtualPath::new(path)?;
        let state = self.shared.state.read();
        Ok(state
            .search_path
            .resolve(&path)?
            .map(|resolution| resolution.entry.id.clone()))
    }

    /// Returns true if `path` is a symbolic link in the first source that
    /// has it.
    ///
    /// Links are reported even when they are not followed.
    pub fn is_symbolic_link(&self, path: &str) -> VfsResult<bool> {
        let path = VirtualPath::new(path)?;
        let state = self.shared.state.read();
        for (entry, relative) in state.search_path.candidates(&path) {
            if entry.archive.is_symlink(relative)? {
                return Ok(true);
            }
            if entry.archive.stat(relative)?.is_some() {
                return Ok(false);
            }
        }
        Ok(false)
    }

    /// Merged listing of the directory `path`.
    pub fn enumerate(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = VirtualPath::new(path)?;
        self.shared.state.read().search_path.enumerate(&path)
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Open `path` for reading.
    ///
    /// Directories come back as [`Handle::Directory`].
    pub fn open(&self, path: &str) -> VfsResult<Handle> {
        let path = VirtualPath::new(path)?;
        let state = self.shared.state.read();

        let Some(resolution) = state.search_path.resolve(&path)? else {
            if state.search_path.is_mount_ancestor(&path) {
                let entries = state.search_path.enumerate(&path)?;
                return Ok(Handle::Directory(DirectoryView::new(path, entries)));
            }
            return Err(VfsError::not_found(path.as_str()));
        };

        if resolution.meta.is_dir() {
            let entries = state.search_path.enumerate(&path)?;
            debug!(path = %path, entries = entries.len(), "Opened directory");
            return Ok(Handle::Directory(DirectoryView::new(path, entries)));
        }

        let stream = resolution.entry.archive.open_read(&resolution.relative)?;
        let lease = self
            .shared
            .read_handles
            .acquire(resolution.entry.id.clone());
        debug!(path = %path, source = %resolution.entry.id, "Opened for reading");
        drop(state);

        let mut file = FileStream::for_read(path, stream, lease);
        self.apply_default_buffer(&mut file)?;
        Ok(Handle::File(file))
    }

    /// Open `path` for reading, failing with `IsADirectory` on directories.
    pub fn open_file(&self, path: &str) -> VfsResult<FileStream> {
        self.open(path)?.into_file()
    }

    /// Read the whole file at `path`.
    pub fn read(&self, path: &str) -> VfsResult<Vec<u8>> {
        let mut file = self.open_file(path)?;
        let mut data = Vec::with_capacity(file.length()? as usize);
        file.read_to_end(&mut data)?;
        file.close()?;
        Ok(data)
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create or truncate `path` in the write directory.
    ///
    /// Missing parent directories are created.
    pub fn create(&self, path: &str) -> VfsResult<FileStream> {
        self.open_write(path, OpenMode::Write)
    }

    /// Open `path` in the write directory for appending.
    ///
    /// The file is created if missing and the cursor starts at its end.
    pub fn append(&self, path: &str) -> VfsResult<FileStream> {
        self.open_write(path, OpenMode::Append)
    }

    fn open_write(&self, path: &str, mode: OpenMode) -> VfsResult<FileStream> {
        let path = VirtualPath::new(path)?;
        if path.is_root() {
            return Err(VfsError::is_a_directory(path.as_str()));
        }

        let state = self.shared.state.read();
        let write_dir = state.write_dir.as_ref().ok_or(VfsError::NoWriteDirectory)?;
        let host = write_dir.archive.host_path_for_write(path.relative())?;
        if host.is_dir() {
            return Err(VfsError::is_a_directory(path.as_str()));
        }
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(mode == OpenMode::Write)
            .open(&host)?;
        let pos = match mode {
            OpenMode::Append => file.seek(SeekFrom::End(0))?,
            _ => 0,
        };

        let lease = self.shared.write_handles.acquire(write_dir.id.clone());
        debug!(path = %path, %mode, "Opened for writing");
        drop(state);

        let mut stream = FileStream::for_write(path, mode, file, pos, lease);
        self.apply_default_buffer(&mut stream)?;
        Ok(stream)
    }

    fn apply_default_buffer(&self, file: &mut FileStream) -> VfsResult<()> {
        match self.shared.config.default_buffer_size {
            0 => Ok(()),
            size => file.set_buffer_size(size),
        }
    }

    /// Create the directory `path` and any missing parents in the write
    /// directory.
    pub fn mkdir(&self, path: &str) -> VfsResult<()> {
        let path = VirtualPath::new(path)?;
        let state = self.shared.state.read();
        let write_dir = state.write_dir.as_ref().ok_or(VfsError::NoWriteDirectory)?;
        let host = write_dir.archive.host_path_for_write(path.relative())?;
        if host.is_file() {
            return Err(VfsError::not_a_directory(path.as_str()));
        }
        fs::create_dir_all(&host)?;
        debug!(path = %path, "Created directory");
        Ok(())
    }

    /// Delete a file or empty directory from the write directory.
    pub fn delete(&self, path: &str) -> VfsResult<()> {
        let path = VirtualPath::new(path)?;
        let state = self.shared.state.read();
        let write_dir = state.write_dir.as_ref().ok_or(VfsError::NoWriteDirectory)?;
        delete_entry(write_dir, &path)
    }

    /// Delete `path` and everything below it from the write directory.
    ///
    /// Symbolic links are removed, never followed.
    pub fn delete_recursive(&self, path: &str) -> VfsResult<()> {
        let path = VirtualPath::new(path)?;
        let state = self.shared.state.read();
        let write_dir = state.write_dir.as_ref().ok_or(VfsError::NoWriteDirectory)?;
        if path.is_root() {
            return Err(VfsError::invalid_argument(
                "cannot delete the write directory itself",
            ));
        }
        let host = removal_path(write_dir, &path)?;
        fs::symlink_metadata(&host).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VfsError::not_found(path.as_str()),
            _ => e.into(),
        })?;
        remove_tree(&host)?;
        debug!(path = %path, "Deleted tree");
        Ok(())
    }
}

fn delete_entry(write_dir: &WriteDir, path: &VirtualPath) -> VfsResult<()> {
    if path.is_root() {
        return Err(VfsError::invalid_argument(
            "cannot delete the write directory itself",
        ));
    }
    let host = removal_path(write_dir, path)?;
    let meta = fs::symlink_metadata(&host).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => VfsError::not_found(path.as_str()),
        _ => e.into(),
    })?;

    if meta.is_dir() {
        fs::remove_dir(&host).map_err(|e| match e.kind() {
            io::ErrorKind::DirectoryNotEmpty => VfsError::directory_not_empty(path.as_str()),
            _ => e.into(),
        })?;
    } else {
        fs::remove_file(&host)?;
    }
    debug!(path = %path, "Deleted");
    Ok(())
}

/// Host path of `path` for removal.
///
/// Parent components go through the symlink policy; the last component may
/// itself be a link, which is removed rather than followed.
fn removal_path(write_dir: &WriteDir, path: &VirtualPath) -> VfsResult<PathBuf> {
    let relative = path.relative();
    let (parent, name) = relative.rsplit_once('/').unwrap_or(("", relative));
    Ok(write_dir.archive.host_path_for_write(parent)?.join(name))
}

/// Depth-first removal of a host tree. Links are unlinked, never followed.
fn remove_tree(host: &Path) -> io::Result<()> {
    if fs::symlink_metadata(host)?.is_dir() {
        for entry in fs::read_dir(host)? {
            remove_tree(&entry?.path())?;
        }
        fs::remove_dir(host)
    } else {
        fs::remove_file(host)
    }
}
