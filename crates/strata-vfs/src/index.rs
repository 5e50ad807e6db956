//! Directory tree over a flat list of archive members.
//!
//! Archive formats usually store members as full paths (`maps/a/x.map`)
//! with parent directories left implicit. [`EntryIndex`] builds the tree
//! once at open time so backends can answer stat and listing queries
//! without rescanning the container.

use std::collections::{BTreeSet, HashMap};

use crate::error::{VfsError, VfsResult};
use crate::path::VirtualPath;
use crate::types::{DirEntry, Metadata};

/// One indexed member.
#[derive(Debug, Clone)]
pub struct IndexedEntry<T> {
    /// Metadata reported for the member.
    pub meta: Metadata,
    /// Backend data (offsets, contents), `None` for implicit directories.
    pub data: Option<T>,
}

/// Path-keyed index with per-directory child sets.
#[derive(Debug, Clone)]
pub struct EntryIndex<T> {
    entries: HashMap<String, IndexedEntry<T>>,
    children: HashMap<String, BTreeSet<String>>,
}

impl<T> Default for EntryIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EntryIndex<T> {
    /// Create an index holding only the root directory.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            String::new(),
            IndexedEntry {
                meta: Metadata::directory(),
                data: None,
            },
        );
        let mut children = HashMap::new();
        children.insert(String::new(), BTreeSet::new());
        Self { entries, children }
    }

    /// Normalize an archive member name into index form (`a/b`, `""` = root).
    pub fn key(path: &str) -> VfsResult<String> {
        Ok(VirtualPath::new(path)?.relative().to_string())
    }

    /// Insert a member, creating missing parent directories.
    ///
    /// A later insert for the same path replaces the earlier one, matching
    /// how tar readers treat repeated members.
    pub fn insert(&mut self, path: &str, meta: Metadata, data: Option<T>) -> VfsResult<()> {
        let key = Self::key(path)?;
        if key.is_empty() {
            return Ok(());
        }

        self.ensure_parents(&key)?;
        if meta.is_dir() {
            self.children.entry(key.clone()).or_default();
        }
        self.entries.insert(key, IndexedEntry { meta, data });
        Ok(())
    }

    fn ensure_parents(&mut self, key: &str) -> VfsResult<()> {
        let mut parent = String::new();
        for segment in key.split('/') {
            let child = if parent.is_empty() {
                segment.to_string()
            } else {
                format!("{parent}/{segment}")
            };

            match self.entries.get(&parent) {
                Some(entry) if !entry.meta.is_dir() => {
                    return Err(VfsError::not_a_directory(parent));
                }
                Some(_) => {}
                None => {
                    self.entries.insert(
                        parent.clone(),
                        IndexedEntry {
                            meta: Metadata::directory(),
                            data: None,
                        },
                    );
                }
            }
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(segment.to_string());
            parent = child;
        }
        Ok(())
    }

    /// Look up a member.
    pub fn get(&self, path: &str) -> Option<&IndexedEntry<T>> {
        self.entries.get(path)
    }

    /// Metadata for `path`.
    pub fn stat(&self, path: &str) -> Option<Metadata> {
        self.entries.get(path).map(|e| e.meta.clone())
    }

    /// Children of the directory `path`, sorted by name.
    pub fn read_dir(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        match self.entries.get(path) {
            None => return Err(VfsError::not_found(path)),
            Some(entry) if !entry.meta.is_dir() => return Err(VfsError::not_a_directory(path)),
            Some(_) => {}
        }

        let Some(names) = self.children.get(path) else {
            return Ok(Vec::new());
        };

        Ok(names
            .iter()
            .filter_map(|name| {
                let child = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}/{name}")
                };
                self.entries
                    .get(&child)
                    .map(|e| DirEntry::from_metadata(name.as_str(), &e.meta))
            })
            .collect())
    }

    /// Number of indexed members, including implicit directories and root.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if only the root is present.
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }
}
