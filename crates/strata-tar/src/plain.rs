//! Uncompressed tar archives.
//!
//! Members are indexed once at open time. Each stream opens its own file
//! handle and seeks within the member's byte range, so streams are fully
//! seekable and independent of each other.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use strata_vfs::{
    Archive, ArchiveBackend, ArchiveInfo, DirEntry, EntryIndex, EntryStream, Metadata, VfsError,
    VfsResult,
};

use crate::members::{Member, index_members};

/// Format identifier of [`TarBackend`].
pub const TAR_FORMAT: &str = "tar";

/// `ustar` magic, found at offset 257 of every POSIX and GNU header.
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_OFFSET: usize = 257;

/// Returns true if `header` starts with a ustar (POSIX or GNU) header.
pub(crate) fn is_ustar(header: &[u8]) -> bool {
    header
        .get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len())
        .is_some_and(|magic| magic == USTAR_MAGIC)
}

/// Backend for uncompressed tar archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarBackend;

impl ArchiveBackend for TarBackend {
    fn info(&self) -> ArchiveInfo {
        ArchiveInfo {
            name: TAR_FORMAT.to_string(),
            extension: "tar".to_string(),
            description: "POSIX tar archive".to_string(),
        }
    }

    fn probe(&self, header: &[u8]) -> bool {
        is_ustar(header)
    }

    fn open(&self, path: &Path) -> VfsResult<Box<dyn Archive>> {
        Ok(Box::new(TarArchive::open(path)?))
    }
}

/// An opened tar archive.
#[derive(Debug, Clone)]
pub struct TarArchive {
    path: PathBuf,
    index: EntryIndex<Member>,
}

impl TarArchive {
    /// Index the archive at `path`.
    pub fn open(path: impl Into<PathBuf>) -> VfsResult<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let index = index_members(BufReader::new(file), TAR_FORMAT)?;
        Ok(Self { path, index })
    }
}

impl Archive for TarArchive {
    fn format(&self) -> &str {
        TAR_FORMAT
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
        let member = entry.data.ok_or_else(|| VfsError::is_a_directory(path))?;
        let file = File::open(&self.path)?;
        Ok(Box::new(MemberStream::new(file, member)?))
    }
}

/// Seekable stream over one member's byte range.
#[derive(Debug)]
struct MemberStream {
    file: File,
    member: Member,
    pos: u64,
}

impl MemberStream {
    fn new(mut file: File, member: Member) -> io::Result<Self> {
        file.seek(SeekFrom::Start(member.offset))?;
        Ok(Self {
            file,
            member,
            pos: 0,
        })
    }
}

impl Read for MemberStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.member.size - self.pos;
        let max = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if max == 0 {
            return Ok(0);
        }
        let n = self.file.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl EntryStream for MemberStream {
    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.member.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {pos} past end {}", self.member.size),
            ));
        }
        self.file.seek(SeekFrom::Start(self.member.offset + pos))?;
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn length(&self) -> u64 {
        self.member.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TarFixture;
    use tempfile::TempDir;

    fn write_tar(dir: &TempDir, fixture: TarFixture) -> PathBuf {
        let path = dir.path().join("assets.tar");
        std::fs::write(&path, fixture.build()).unwrap();
        path
    }

    #[test]
    fn test_probe() {
        let tar = TarFixture::new().file("a", b"1").build();
        assert!(TarBackend.probe(&tar[..512]));
        assert!(!TarBackend.probe(b"PK\x03\x04"));
        assert!(!TarBackend.probe(&[0u8; 512]));
    }

    #[test]
    fn test_read_and_seek() {
        let dir = TempDir::new().unwrap();
        let path = write_tar(
            &dir,
            TarFixture::new()
                .file("first.txt", b"0123456789")
                .file("second.txt", b"abc"),
        );
        let archive = TarArchive::open(&path).unwrap();

        assert_eq!(archive.read_all("second.txt").unwrap(), b"abc");

        let mut stream = archive.open_read("first.txt").unwrap();
        stream.seek_to(7).unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"789");

        stream.seek_to(2).unwrap();
        let mut two = [0u8; 2];
        stream.read_exact(&mut two).unwrap();
        assert_eq!(&two, b"23");
        assert!(stream.seek_to(11).is_err());
    }

    #[test]
    fn test_independent_streams() {
        let dir = TempDir::new().unwrap();
        let path = write_tar(&dir, TarFixture::new().file("f", b"abcdef"));
        let archive = TarArchive::open(&path).unwrap();

        let mut a = archive.open_read("f").unwrap();
        let mut b = archive.open_read("f").unwrap();
        a.seek_to(3).unwrap();

        let mut buf = [0u8; 3];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"def");
    }

    #[test]
    fn test_directories_and_links() {
        let dir = TempDir::new().unwrap();
        let path = write_tar(
            &dir,
            TarFixture::new()
                .dir("maps/")
                .file("maps/a.map", b"a")
                .symlink("maps/latest.map", "a.map"),
        );
        let archive = TarArchive::open(&path).unwrap();

        let names: Vec<_> = archive
            .read_dir("maps")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.map"]);
        assert!(matches!(archive.open_read("maps"), Err(VfsError::IsADirectory(_))));
        assert!(matches!(archive.open_read("nope"), Err(VfsError::NotFound(_))));
    }
}
