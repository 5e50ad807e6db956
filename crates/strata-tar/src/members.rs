//! Scanning tar members into an [`EntryIndex`].

use std::io::Read;
use std::time::{Duration, UNIX_EPOCH};

use strata_vfs::{EntryIndex, Metadata, VfsError, VfsResult};
use tracing::{debug, trace};

/// Location of a member's data in the (decompressed) tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Member {
    pub offset: u64,
    pub size: u64,
}

/// Read every header in `reader` and index regular files and directories.
///
/// Links, devices and extension headers are not exposed. A later member
/// with the same path replaces an earlier one.
pub(crate) fn index_members<R: Read>(reader: R, format: &str) -> VfsResult<EntryIndex<Member>> {
    let mut archive = tar::Archive::new(reader);
    let mut index = EntryIndex::new();

    let entries = archive
        .entries()
        .map_err(|e| VfsError::backend(format, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VfsError::backend(format, e))?;
        let kind = entry.header().entry_type();
        let path = entry
            .path()
            .map_err(|e| VfsError::backend(format, e))?
            .to_string_lossy()
            .into_owned();

        let meta = if kind.is_dir() {
            Metadata::directory()
        } else if kind.is_file() {
            Metadata::file(entry.size())
        } else {
            trace!(path = %path, ?kind, "Skipping tar member");
            continue;
        };
        let meta = match entry.header().mtime() {
            Ok(secs) => meta.with_modified(UNIX_EPOCH + Duration::from_secs(secs)),
            Err(_) => meta,
        };

        let member = meta.is_file().then(|| Member {
            offset: entry.raw_file_position(),
            size: entry.size(),
        });
        index.insert(&path, meta, member)?;
    }

    debug!(format, members = index.len(), "Indexed tar members");
    Ok(index)
}
