//! Search path: the ordered table of mounted sources.
//!
//! Unlike a longest-prefix router, resolution here walks entries strictly
//! in search-path order. Position in the table is the only precedence;
//! two entries may share a mount point and the earlier one shadows the
//! later for any path both can satisfy.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::archive::Archive;
use crate::path::VirtualPath;

/// Identity of a physical source.
///
/// For host paths this is the canonical path when it exists, otherwise the
/// path as given. In-memory sources use a caller-chosen name. The same
/// source can only appear once on the search path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(String);

impl SourceId {
    /// Identity of a host path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let resolved = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Self(resolved.to_string_lossy().into_owned())
    }

    /// Identity for a source that has no host path.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a new entry goes on the search path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Before every existing entry (highest precedence).
    Prepend,
    /// After every existing entry (lowest precedence).
    Append,
}

impl Priority {
    /// `Append` when `append` is true, else `Prepend`.
    pub fn from_append(append: bool) -> Self {
        if append { Priority::Append } else { Priority::Prepend }
    }
}

/// Outcome of a mount request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    /// The source was added to the search path.
    Mounted,
    /// The source was already mounted; nothing changed.
    AlreadyMounted,
}

/// One mounted source.
#[derive(Clone)]
pub struct MountEntry {
    /// Source identity.
    pub id: SourceId,
    /// Virtual prefix the source's contents appear under.
    pub mount_point: VirtualPath,
    /// How the entry was inserted.
    pub priority: Priority,
    /// Monotonic insertion counter.
    pub sequence: u64,
    /// The opened source.
    pub archive: Arc<dyn Archive>,
}

impl fmt::Debug for MountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountEntry")
            .field("id", &self.id)
            .field("mount_point", &self.mount_point)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("format", &self.archive.format())
            .finish()
    }
}

impl MountEntry {
    /// Path of `virtual_path` relative to this entry, if the mount point
    /// is a segment prefix of it.
    pub fn relative<'a>(&self, virtual_path: &'a VirtualPath) -> Option<&'a str> {
        virtual_path.strip_prefix(&self.mount_point)
    }
}

/// Information about a mounted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Source identity.
    pub id: SourceId,
    /// Mount point.
    pub mount_point: VirtualPath,
    /// Archive format of the source.
    pub format: String,
}

/// Ordered sequence of mount entries.
#[derive(Debug, Default)]
pub struct SearchPath {
    entries: Vec<MountEntry>,
    next_sequence: u64,
}

impl SearchPath {
    /// Create an empty search path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `id` is mounted.
    pub fn contains(&self, id: &SourceId) -> bool {
        self.get(id).is_some()
    }

    /// Look up an entry by source.
    pub fn get(&self, id: &SourceId) -> Option<&MountEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Insert a source. A source already present is left where it is.
    pub fn insert(
        &mut self,
        id: SourceId,
        mount_point: VirtualPath,
        priority: Priority,
        archive: Arc<dyn Archive>,
    ) -> MountStatus {
        if self.contains(&id) {
            return MountStatus::AlreadyMounted;
        }

        let entry = MountEntry {
            id,
            mount_point,
            priority,
            sequence: self.next_sequence,
            archive,
        };
        self.next_sequence += 1;

        match priority {
            Priority::Prepend => self.entries.insert(0, entry),
            Priority::Append => self.entries.push(entry),
        }
        MountStatus::Mounted
    }

    /// Remove a source, returning its entry.
    pub fn remove(&mut self, id: &SourceId) -> Option<MountEntry> {
        let idx = self.entries.iter().position(|e| &e.id == id)?;
        Some(self.entries.remove(idx))
    }

    /// Mount point of a source.
    pub fn mount_point(&self, id: &SourceId) -> Option<VirtualPath> {
        self.get(id).map(|e| e.mount_point.clone())
    }

    /// Entries in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &MountEntry> {
        self.entries.iter()
    }

    /// Source ids in resolution order.
    pub fn ids(&self) -> Vec<SourceId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Describe every entry in resolution order.
    pub fn list(&self) -> Vec<MountInfo> {
        self.entries
            .iter()
            .map(|e| MountInfo {
                id: e.id.clone(),
                mount_point: e.mount_point.clone(),
                format: e.archive.format().to_string(),
            })
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
