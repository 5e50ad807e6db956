//! Gzip-compressed tar archives.
//!
//! Offsets are positions in the decompressed stream. A member stream
//! decodes forward from the start of the file; seeking backwards restarts
//! the decoder and skips ahead again, which is slow but always works.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use strata_vfs::{
    Archive, ArchiveBackend, ArchiveInfo, DirEntry, EntryIndex, EntryStream, Metadata, VfsError,
    VfsResult,
};
use tracing::trace;

use crate::members::{Member, index_members};
use crate::plain::is_ustar;

/// Format identifier of [`TarGzBackend`].
pub const TAR_GZ_FORMAT: &str = "tar.gz";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompressed bytes needed to see the ustar magic.
const PROBE_DECODED_LEN: usize = 262;

/// Backend for gzip-compressed tar archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzBackend;

impl ArchiveBackend for TarGzBackend {
    fn info(&self) -> ArchiveInfo {
        ArchiveInfo {
            name: TAR_GZ_FORMAT.to_string(),
            extension: "tgz".to_string(),
            description: "gzip-compressed tar archive".to_string(),
        }
    }

    /// Gzip magic, followed by a ustar header once decompressed.
    fn probe(&self, header: &[u8]) -> bool {
        if !header.starts_with(&GZIP_MAGIC) {
            return false;
        }

        let mut decoder = GzDecoder::new(header);
        let mut decoded = Vec::with_capacity(PROBE_DECODED_LEN);
        let mut chunk = [0u8; 512];
        while decoded.len() < PROBE_DECODED_LEN {
            match decoder.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => decoded.extend_from_slice(&chunk[..n]),
            }
        }
        is_ustar(&decoded)
    }

    fn open(&self, path: &Path) -> VfsResult<Box<dyn Archive>> {
        Ok(Box::new(TarGzArchive::open(path)?))
    }
}

/// An opened gzip-compressed tar archive.
#[derive(Debug, Clone)]
pub struct TarGzArchive {
    path: PathBuf,
    index: EntryIndex<Member>,
}

impl TarGzArchive {
    /// Decompress and index the archive at `path`.
    pub fn open(path: impl Into<PathBuf>) -> VfsResult<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let index = index_members(GzDecoder::new(BufReader::new(file)), TAR_GZ_FORMAT)?;
        Ok(Self { path, index })
    }
}

impl Archive for TarGzArchive {
    fn format(&self) -> &str {
        TAR_GZ_FORMAT
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
        let stream = GzMemberStream::new(self.path.clone(), member)
            .map_err(|e| VfsError::backend(TAR_GZ_FORMAT, e))?;
        Ok(Box::new(stream))
    }
}

/// Forward-decoding stream over one member.
struct GzMemberStream {
    path: PathBuf,
    decoder: GzDecoder<BufReader<File>>,
    member: Member,
    pos: u64,
}

impl GzMemberStream {
    fn new(path: PathBuf, member: Member) -> io::Result<Self> {
        let decoder = Self::decoder_at(&path, member.offset)?;
        Ok(Self {
            path,
            decoder,
            member,
            pos: 0,
        })
    }

    /// A fresh decoder positioned `offset` bytes into the decompressed stream.
    fn decoder_at(path: &Path, offset: u64) -> io::Result<GzDecoder<BufReader<File>>> {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
        skip(&mut decoder, offset)?;
        Ok(decoder)
    }
}

fn skip(reader: &mut impl Read, count: u64) -> io::Result<()> {
    let skipped = io::copy(&mut reader.take(count), &mut io::sink())?;
    if skipped < count {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("archive ended after {skipped} of {count} bytes"),
        ));
    }
    Ok(())
}

impl Read for GzMemberStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.member.size - self.pos;
        let max = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if max == 0 {
            return Ok(0);
        }
        let n = self.decoder.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl EntryStream for GzMemberStream {
    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        if pos > self.member.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {pos} past end {}", self.member.size),
            ));
        }

        if pos >= self.pos {
            skip(&mut self.decoder, pos - self.pos)?;
        } else {
            trace!(path = %self.path.display(), from = self.pos, to = pos, "Restarting decoder");
            self.decoder = Self::decoder_at(&self.path, self.member.offset + pos)?;
        }
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

    fn write_tgz(dir: &TempDir, fixture: TarFixture) -> PathBuf {
        let path = dir.path().join("assets.tgz");
        std::fs::write(&path, fixture.build_gz()).unwrap();
        path
    }

    #[test]
    fn test_probe() {
        let tgz = TarFixture::new().file("a", b"1").build_gz();
        let header = &tgz[..tgz.len().min(512)];
        assert!(TarGzBackend.probe(header));

        let tar = TarFixture::new().file("a", b"1").build();
        assert!(!TarGzBackend.probe(&tar));

        let mut not_tar = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        std::io::Write::write_all(&mut not_tar, &[7u8; 600]).unwrap();
        assert!(!TarGzBackend.probe(&not_tar.finish().unwrap()));
    }

    #[test]
    fn test_read_members() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(
            &dir,
            TarFixture::new()
                .file("docs/one.txt", b"first member")
                .file("docs/two.txt", b"second member"),
        );
        let archive = TarGzArchive::open(&path).unwrap();

        assert_eq!(archive.read_all("docs/two.txt").unwrap(), b"second member");
        assert_eq!(archive.read_all("docs/one.txt").unwrap(), b"first member");
        assert_eq!(archive.read_dir("docs").unwrap().len(), 2);
    }

    #[test]
    fn test_backward_seek_restarts() {
        let dir = TempDir::new().unwrap();
        let path = write_tgz(&dir, TarFixture::new().file("f", b"0123456789"));
        let archive = TarGzArchive::open(&path).unwrap();

        let mut stream = archive.open_read("f").unwrap();
        let mut buf = [0u8; 8];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(stream.position(), 8);

        stream.seek_to(1).unwrap();
        let mut two = [0u8; 2];
        stream.read_exact(&mut two).unwrap();
        assert_eq!(&two, b"12");

        stream.seek_to(9).unwrap();
        let mut last = Vec::new();
        stream.read_to_end(&mut last).unwrap();
        assert_eq!(last, b"9");
        assert!(stream.at_end());
    }
}
