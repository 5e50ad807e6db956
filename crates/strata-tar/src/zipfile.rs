//! Zip archives.
//!
//! The central directory is indexed at open time. Opening a member
//! inflates it fully into memory, so member streams seek freely in both
//! directions.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use strata_vfs::{
    Archive, ArchiveBackend, ArchiveInfo, DirEntry, EntryIndex, EntryStream, Metadata, SliceStream,
    VfsError, VfsResult,
};
use tracing::{debug, trace};

/// Format identifier of [`ZipBackend`].
pub const ZIP_FORMAT: &str = "zip";

const LOCAL_HEADER_MAGIC: &[u8] = b"PK\x03\x04";
const EMPTY_ARCHIVE_MAGIC: &[u8] = b"PK\x05\x06";

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Backend for zip archives, whatever their file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipBackend;

impl ArchiveBackend for ZipBackend {
    fn info(&self) -> ArchiveInfo {
        ArchiveInfo {
            name: ZIP_FORMAT.to_string(),
            extension: "zip".to_string(),
            description: "PKZIP-compatible archive".to_string(),
        }
    }

    fn probe(&self, header: &[u8]) -> bool {
        header.starts_with(LOCAL_HEADER_MAGIC) || header.starts_with(EMPTY_ARCHIVE_MAGIC)
    }

    fn open(&self, path: &Path) -> VfsResult<Box<dyn Archive>> {
        Ok(Box::new(ZipArchive::open(path)?))
    }
}

/// An opened zip archive. Members are addressed by central directory index.
#[derive(Debug, Clone)]
pub struct ZipArchive {
    path: PathBuf,
    index: EntryIndex<usize>,
}

impl ZipArchive {
    /// Read the central directory of the archive at `path`.
    pub fn open(path: impl Into<PathBuf>) -> VfsResult<Self> {
        let path = path.into();
        let mut archive = Self::reader(&path)?;
        let mut index = EntryIndex::new();

        for i in 0..archive.len() {
            let member = archive
                .by_index_raw(i)
                .map_err(|e| VfsError::backend(ZIP_FORMAT, e))?;
            let name = member.name().to_string();
            if member
                .unix_mode()
                .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
            {
                trace!(path = %name, "Skipping zip symlink");
                continue;
            }

            let meta = if member.is_dir() {
                Metadata::directory()
            } else {
                Metadata::file(member.size())
            };
            let meta = match member.last_modified().and_then(to_system_time) {
                Some(modified) => meta.with_modified(modified),
                None => meta,
            };
            let data = meta.is_file().then_some(i);
            index.insert(&name, meta, data)?;
        }

        debug!(path = %path.display(), members = index.len(), "Indexed zip members");
        Ok(Self { path, index })
    }

    fn reader(path: &Path) -> VfsResult<zip::ZipArchive<BufReader<File>>> {
        let file = File::open(path)?;
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| VfsError::backend(ZIP_FORMAT, e))
    }
}

/// DOS timestamps carry no zone; they are read as UTC.
fn to_system_time(stamp: zip::DateTime) -> Option<SystemTime> {
    let secs = chrono::NaiveDate::from_ymd_opt(
        i32::from(stamp.year()),
        u32::from(stamp.month()),
        u32::from(stamp.day()),
    )?
    .and_hms_opt(
        u32::from(stamp.hour()),
        u32::from(stamp.minute()),
        u32::from(stamp.second()),
    )?
    .and_utc()
    .timestamp();
    Some(UNIX_EPOCH + Duration::from_secs(u64::try_from(secs).ok()?))
}

impl Archive for ZipArchive {
    fn format(&self) -> &str {
        ZIP_FORMAT
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
        let i = entry.data.ok_or_else(|| VfsError::is_a_directory(path))?;

        let mut archive = Self::reader(&self.path)?;
        let mut member = archive
            .by_index(i)
            .map_err(|e| VfsError::backend(ZIP_FORMAT, e))?;
        let mut data = Vec::with_capacity(usize::try_from(member.size()).unwrap_or(0));
        member
            .read_to_end(&mut data)
            .map_err(|e| VfsError::backend(ZIP_FORMAT, e))?;
        Ok(Box::new(SliceStream::new(data)))
    }
}
