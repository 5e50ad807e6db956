//! Directory enumeration: a merge across every matching mount.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tracing::debug;

use crate::error::{VfsError, VfsResult};
use crate::mount::SearchPath;
use crate::path::VirtualPath;
use crate::types::DirEntry;

impl SearchPath {
    /// List the virtual directory `path`.
    ///
    /// Every entry that has `path` as a directory contributes its listing;
    /// names are deduplicated and the earliest entry's metadata is kept.
    /// Mount points below `path` contribute their next component as a
    /// directory. Entries come back sorted by name.
    pub fn enumerate(&self, path: &VirtualPath) -> VfsResult<Vec<DirEntry>> {
        let mut merged: BTreeMap<String, DirEntry> = BTreeMap::new();
        let mut matched = false;
        let mut saw_file = false;

        for entry in self.iter() {
            if let Some(relative) = entry.relative(path) {
                match entry.archive.stat(relative)? {
                    Some(meta) if meta.is_dir() => {
                        matched = true;
                        for item in entry.archive.read_dir(relative)? {
                            if let Entry::Vacant(slot) = merged.entry(item.name.clone()) {
                                slot.insert(item);
                            }
                        }
                    }
                    Some(_) => saw_file = true,
                    None => {}
                }
            } else if let Some(rest) = entry.mount_point.strip_prefix(path) {
                // Mount point strictly below `path`.
                if let Some(child) = rest.split('/').next().filter(|s| !s.is_empty()) {
                    matched = true;
                    merged
                        .entry(child.to_string())
                        .or_insert_with(|| DirEntry::directory(child));
                }
            }
        }

        if !matched {
            return Err(if saw_file {
                VfsError::not_a_directory(path.as_str())
            } else {
                VfsError::not_found(path.as_str())
            });
        }

        debug!(path = %path, entries = merged.len(), "Enumerated");
        Ok(merged.into_values().collect())
    }
}
