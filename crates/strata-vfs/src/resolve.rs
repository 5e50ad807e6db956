//! Path resolution against the search path.
//!
//! The first entry (in search-path order) whose mount point prefixes the
//! path and whose archive reports the remaining relative path wins. A hit
//! in an earlier entry fully shadows the same relative path in any later
//! entry, regardless of the two entries' mount points.

use tracing::trace;

use crate::error::VfsResult;
use crate::mount::{MountEntry, SearchPath};
use crate::path::VirtualPath;
use crate::types::Metadata;

/// The entry that answers for a virtual path.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    /// Winning entry.
    pub entry: &'a MountEntry,
    /// Path relative to the entry's mount point.
    pub relative: String,
    /// Metadata reported by the entry's archive.
    pub meta: Metadata,
}

impl SearchPath {
    /// Entries whose mount point prefixes `path`, with relative paths.
    pub fn candidates<'a, 'p>(
        &'a self,
        path: &'p VirtualPath,
    ) -> impl Iterator<Item = (&'a MountEntry, &'p str)> + use<'a, 'p> {
        self.iter()
            .filter_map(move |entry| entry.relative(path).map(|rel| (entry, rel)))
    }

    /// Find the entry that answers for `path`.
    ///
    /// Backend failures are returned, not skipped: a broken higher-priority
    /// source must not silently fall through to a lower one.
    pub fn resolve(&self, path: &VirtualPath) -> VfsResult<Option<Resolution<'_>>> {
        for (entry, relative) in self.candidates(path) {
            if let Some(meta) = entry.archive.stat(relative)? {
                trace!(path = %path, source = %entry.id, relative, "Resolved");
                return Ok(Some(Resolution {
                    entry,
                    relative: relative.to_string(),
                    meta,
                }));
            }
        }
        Ok(None)
    }

    /// Returns true if `path` is a strict ancestor of some mount point.
    ///
    /// Such paths exist as virtual directories even when no source
    /// contains them, so that `/data` exists once something is mounted at
    /// `/data/maps`.
    pub fn is_mount_ancestor(&self, path: &VirtualPath) -> bool {
        self.iter().any(|entry| path.is_ancestor_of(&entry.mount_point))
    }

    /// Metadata for `path`, including virtual mount-point ancestors.
    pub fn stat(&self, path: &VirtualPath) -> VfsResult<Option<Metadata>> {
        if let Some(resolution) = self.resolve(path)? {
            return Ok(Some(resolution.meta));
        }
        if self.is_mount_ancestor(path) {
            return Ok(Some(Metadata::directory()));
        }
        Ok(None)
    }

    /// Returns true if `path` resolves and is a directory.
    ///
    /// A directory present only in a lower-priority source still counts,
    /// since higher sources that lack the path don't answer for it. A file
    /// of the same name in a higher source does shadow it.
    pub fn is_directory(&self, path: &VirtualPath) -> VfsResult<bool> {
        Ok(self.stat(path)?.is_some_and(|meta| meta.is_dir()))
    }
}
