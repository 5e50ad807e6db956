//! Mounting tar and tar.gz archives through the registry.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use strata_vfs::{SourceId, Vfs, VfsError, Whence};
use tempfile::TempDir;

fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(data.len() as u64);
        header.set_mtime(1_600_000_000);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

fn write_archive(dir: &Path, name: &str, files: &[(&str, &[u8])], gzip: bool) -> PathBuf {
    let mut bytes = tar_bytes(files);
    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).unwrap();
        bytes = encoder.finish().unwrap();
    }
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn write_zip(dir: &Path, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (path, data) in files {
        writer.start_file(*path, options).unwrap();
        writer.write_all(data).unwrap();
    }
    let path = dir.join(name);
    std::fs::write(&path, writer.finish().unwrap().into_inner()).unwrap();
    path
}

fn vfs() -> Vfs {
    let vfs = Vfs::new();
    strata_tar::register_defaults(&vfs);
    vfs
}

#[test]
fn supported_types_listed_in_order() {
    let names: Vec<_> = vfs()
        .supported_archive_types()
        .into_iter()
        .map(|info| info.name)
        .collect();
    assert_eq!(names, vec!["tar", "tar.gz", "zip"]);
}

#[test]
fn tar_detected_by_content() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), "data.bin", &[("hello.txt", b"hello")], false);

    let vfs = vfs();
    vfs.mount(&path, "/pak", true).unwrap();
    assert_eq!(vfs.read("/pak/hello.txt").unwrap(), b"hello");
    assert_eq!(vfs.mounts()[0].format, "tar");
}

#[test]
fn gzip_archive_patches_directory() {
    let base = TempDir::new().unwrap();
    std::fs::write(base.path().join("game.cfg"), "fov=90").unwrap();
    std::fs::write(base.path().join("keys.cfg"), "w=up").unwrap();
    let archives = TempDir::new().unwrap();
    let patch = write_archive(
        archives.path(),
        "patch.tgz",
        &[("game.cfg", b"fov=110"), ("new.cfg", b"x")],
        true,
    );

    let vfs = vfs();
    vfs.mount(base.path(), "/", true).unwrap();
    vfs.mount(&patch, "/", false).unwrap();

    assert_eq!(vfs.read("/game.cfg").unwrap(), b"fov=110");
    assert_eq!(vfs.real_dir("/keys.cfg").unwrap(), Some(SourceId::from_path(base.path())));
    let names: Vec<_> = vfs.enumerate("/").unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["game.cfg", "keys.cfg", "new.cfg"]);
}

#[test]
fn buffered_reads_from_compressed_member() {
    let dir = TempDir::new().unwrap();
    let data: Vec<u8> = (0..=255u8).cycle().take(4000).collect();
    let path = write_archive(dir.path(), "big.tar.gz", &[("blob", &data)], true);

    let vfs = vfs();
    vfs.mount(&path, "/", true).unwrap();
    let mut file = vfs.open_file("/blob").unwrap();
    file.set_buffer_size(256).unwrap();

    let mut head = [0u8; 10];
    file.read(&mut head).unwrap();
    assert_eq!(&head[..], &data[..10]);

    assert_eq!(file.seek(3000, Whence::Start).unwrap(), 3000);
    let mut mid = [0u8; 4];
    file.read(&mut mid).unwrap();
    assert_eq!(&mid[..], &data[3000..3004]);

    assert_eq!(file.seek(-4000, Whence::End).unwrap(), 0);
    let mut all = Vec::new();
    file.read_to_end(&mut all).unwrap();
    assert_eq!(all, data);
}

#[test]
fn archives_are_read_only() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), "a.tar", &[("f", b"1")], false);
    let vfs = vfs();
    vfs.mount(&path, "/", true).unwrap();

    let mut file = vfs.open_file("/f").unwrap();
    assert!(matches!(file.write(b"x"), Err(VfsError::ReadOnlyHandle)));
    assert!(matches!(vfs.create("/f"), Err(VfsError::NoWriteDirectory)));
}

#[test]
fn modification_times_come_from_headers() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), "a.tar", &[("f", b"1")], false);
    let vfs = vfs();
    vfs.mount(&path, "/", true).unwrap();

    let modified = vfs.last_mod_time("/f").unwrap().unwrap();
    let secs = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    assert_eq!(secs, 1_600_000_000);
}

#[test]
fn corrupt_gzip_is_a_backend_error() {
    let dir = TempDir::new().unwrap();
    // Pseudo-random payload so the compressed stream stays large.
    let mut seed = 0x2545_f491_u32;
    let noise: Vec<u8> = (0..4096)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed as u8
        })
        .collect();
    let good = write_archive(dir.path(), "good.tgz", &[("f", &noise)], true);
    let mut bytes = std::fs::read(&good).unwrap();
    bytes.truncate(bytes.len() / 2);
    let broken = dir.path().join("broken.tgz");
    std::fs::write(&broken, bytes).unwrap();

    let err = vfs().mount(&broken, "/", true).unwrap_err();
    assert!(matches!(err, VfsError::Backend { .. }), "got {err:?}");
}

#[test]
fn unmount_blocked_by_open_member() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(dir.path(), "a.tar", &[("f", b"1")], false);
    let vfs = vfs();
    vfs.mount(&path, "/", true).unwrap();
    let id = SourceId::from_path(&path);

    let file = vfs.open_file("/f").unwrap();
    assert!(matches!(vfs.unmount(&id), Err(VfsError::SourceBusy(_))));
    drop(file);
    vfs.unmount(&id).unwrap();
}

#[test]
fn zip_detected_whatever_its_extension() {
    let dir = TempDir::new().unwrap();
    let path = write_zip(
        dir.path(),
        "zip1.aoi",
        &[("test/hello.txt", b"hello from zip"), ("readme", b"r")],
    );

    let vfs = vfs();
    vfs.mount(&path, "/", true).unwrap();
    assert_eq!(vfs.mounts()[0].format, "zip");
    assert_eq!(vfs.read("/test/hello.txt").unwrap(), b"hello from zip");
    assert!(vfs.is_directory("/test").unwrap());

    let names: Vec<_> = vfs.enumerate("/").unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["readme", "test"]);
}

#[test]
fn zip_layers_over_tar() {
    let dir = TempDir::new().unwrap();
    let base = write_archive(dir.path(), "base.tar", &[("cfg", b"old"), ("only-tar", b"t")], false);
    let patch = write_zip(dir.path(), "patch.pak", &[("cfg", b"new")]);

    let vfs = vfs();
    vfs.mount(&base, "/", true).unwrap();
    vfs.mount(&patch, "/", false).unwrap();

    assert_eq!(vfs.read("/cfg").unwrap(), b"new");
    assert_eq!(vfs.read("/only-tar").unwrap(), b"t");
    assert_eq!(vfs.real_dir("/cfg").unwrap(), Some(SourceId::from_path(&patch)));
}
