//! End-to-end behaviour of mounted host directories.

use std::fs;

use pretty_assertions::assert_eq;
use strata_vfs::backends::MemoryArchive;
use strata_vfs::{FileType, SourceId, Vfs, VfsError, Whence, normalize};
use tempfile::TempDir;

fn dir_with(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn read_string(vfs: &Vfs, path: &str) -> String {
    String::from_utf8(vfs.read(path).unwrap()).unwrap()
}

#[test]
fn normalize_is_idempotent() {
    for raw in ["", "/", "a//b/./c/", "../../x", "\\win\\style\\..\\path", "/a/b/../../.."] {
        let once = normalize(raw).unwrap();
        let twice = normalize(once.as_str()).unwrap();
        assert_eq!(once, twice, "normalizing {raw:?}");
    }
}

#[test]
fn mounting_twice_is_a_noop() {
    let a = dir_with(&[("f", "a")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/m", true).unwrap();
    vfs.mount(a.path(), "/m", true).unwrap();
    assert_eq!(vfs.search_path().len(), 1);
}

#[test]
fn prepended_mount_shadows_appended() {
    let a = dir_with(&[("f.txt", "A")]);
    let b = dir_with(&[("f.txt", "B")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();
    vfs.mount(b.path(), "/", false).unwrap();

    let mut file = vfs.open_file("f.txt").unwrap();
    let mut buf = [0u8; 8];
    let n = file.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"B");
    assert_eq!(vfs.real_dir("/f.txt").unwrap(), Some(SourceId::from_path(b.path())));
}

#[test]
fn enumeration_merges_with_priority_metadata() {
    let a = dir_with(&[("x", "x"), ("y", "from a")]);
    let b = dir_with(&[("y", "from b, longer"), ("z", "z")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();
    vfs.mount(b.path(), "/", false).unwrap();

    let entries = vfs.enumerate("/").unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y", "z"]);
    assert_eq!(entries[1].size, Some("from b, longer".len() as u64));
}

#[test]
fn enumeration_of_unknown_directory_fails() {
    let a = dir_with(&[("x", "x")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();
    assert!(matches!(vfs.enumerate("/nothing"), Err(VfsError::NotFound(_))));
}

#[test]
fn writes_only_land_in_write_dir() {
    let archive_like = dir_with(&[("existing.txt", "read only")]);
    let out = TempDir::new().unwrap();
    let vfs = Vfs::new();
    vfs.mount(archive_like.path(), "/", true).unwrap();

    assert!(matches!(vfs.create("out.txt"), Err(VfsError::NoWriteDirectory)));

    vfs.set_write_dir(out.path()).unwrap();
    let mut file = vfs.create("out.txt").unwrap();
    file.write(b"written").unwrap();
    file.close().unwrap();

    assert_eq!(fs::read_to_string(out.path().join("out.txt")).unwrap(), "written");
    assert!(!archive_like.path().join("out.txt").exists());
    assert!(!vfs.exists("/out.txt").unwrap());

    vfs.mount(out.path(), "/", true).unwrap();
    assert_eq!(read_string(&vfs, "/out.txt"), "written");
}

#[test]
fn seek_whence_round_trip() {
    let out = TempDir::new().unwrap();
    let vfs = Vfs::new();
    vfs.set_write_dir(out.path()).unwrap();

    let data: Vec<u8> = (0u8..100).collect();
    let mut file = vfs.create("/bytes.bin").unwrap();
    file.write(&data).unwrap();
    file.close().unwrap();

    vfs.mount(out.path(), "/", true).unwrap();
    let mut file = vfs.open_file("/bytes.bin").unwrap();
    assert_eq!(file.seek(0, Whence::End).unwrap(), 100);
    assert_eq!(file.seek(-10, Whence::Current).unwrap(), 90);
    let mut tail = [0u8; 10];
    assert_eq!(file.read(&mut tail).unwrap(), 10);
    assert_eq!(&tail[..], &data[90..]);
    assert!(file.eof());
}

#[test]
fn seek_with_numeric_whence() {
    let a = dir_with(&[("f", "abcdef")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();

    let mut file = vfs.open_file("/f").unwrap();
    assert_eq!(file.seek(-2, Whence::from_raw(2).unwrap()).unwrap(), 4);
    assert!(matches!(Whence::from_raw(7), Err(VfsError::InvalidArgument(_))));
}

#[test]
fn unmount_waits_for_handles() {
    let a = dir_with(&[("f", "data")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();
    let id = SourceId::from_path(a.path());

    let handle = vfs.open("/f").unwrap();
    assert!(matches!(vfs.unmount(&id), Err(VfsError::SourceBusy(_))));
    handle.close().unwrap();
    vfs.unmount(&id).unwrap();
    assert!(!vfs.exists("/f").unwrap());
}

#[test]
fn unmount_waits_for_writers_into_mounted_write_dir() {
    let save = TempDir::new().unwrap();
    let vfs = Vfs::new();
    vfs.set_write_dir(save.path()).unwrap();
    vfs.mount(save.path(), "/", true).unwrap();
    let id = SourceId::from_path(save.path());

    let mut file = vfs.create("/slot1.sav").unwrap();
    file.write(b"level 3").unwrap();
    assert!(matches!(vfs.unmount(&id), Err(VfsError::SourceBusy(_))));

    drop(file);
    vfs.unmount(&id).unwrap();
    assert_eq!(fs::read(save.path().join("slot1.sav")).unwrap(), b"level 3");
}

#[test]
fn recursive_delete_of_root_touches_nothing() {
    let save = dir_with(&[("keep.txt", "k"), ("slots/1.sav", "s")]);
    let vfs = Vfs::new();
    vfs.set_write_dir(save.path()).unwrap();

    assert!(matches!(vfs.delete_recursive("/"), Err(VfsError::InvalidArgument(_))));
    assert!(save.path().join("keep.txt").exists());
    assert!(save.path().join("slots/1.sav").exists());
}

#[cfg(unix)]
#[test]
fn recursive_delete_unlinks_symlinks_under_default_policy() {
    let outside = dir_with(&[("precious.txt", "keep me")]);
    let save = dir_with(&[("tree/a.txt", "a")]);
    std::os::unix::fs::symlink(outside.path(), save.path().join("tree/link")).unwrap();

    let vfs = Vfs::new();
    assert!(!vfs.symbolic_links_permitted());
    vfs.set_write_dir(save.path()).unwrap();
    vfs.delete_recursive("/tree").unwrap();

    assert!(!save.path().join("tree").exists());
    assert_eq!(fs::read_to_string(outside.path().join("precious.txt")).unwrap(), "keep me");
}

#[test]
fn oversized_buffer_is_an_error() {
    let a = dir_with(&[("f", "data")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();

    let mut file = vfs.open_file("/f").unwrap();
    assert!(matches!(
        file.set_buffer_size(usize::MAX),
        Err(VfsError::BufferResizeFailed(_))
    ));
    let mut all = Vec::new();
    file.read_to_end(&mut all).unwrap();
    assert_eq!(all, b"data");
}

#[test]
fn directory_handles_reject_stream_ops() {
    let a = dir_with(&[("maps/one.map", "1")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();

    let mut handle = vfs.open("/maps").unwrap();
    assert!(handle.is_dir());
    assert!(handle.eof());
    let mut buf = [0u8; 1];
    assert!(matches!(handle.read(&mut buf), Err(VfsError::IsADirectory(_))));
    assert!(matches!(handle.write(b"x"), Err(VfsError::IsADirectory(_))));
    assert!(matches!(vfs.open_file("/maps"), Err(VfsError::IsADirectory(_))));
}

#[test]
fn read_handles_reject_writes() {
    let a = dir_with(&[("f", "data")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();

    let mut file = vfs.open_file("/f").unwrap();
    assert!(matches!(file.write(b"x"), Err(VfsError::ReadOnlyHandle)));
    file.flush().unwrap();
}

#[test]
fn memory_archive_overlays_directory() {
    let base = dir_with(&[("config/game.cfg", "fov=90"), ("config/keys.cfg", "w=up")]);
    let patch = MemoryArchive::new()
        .with_file("config/game.cfg", "fov=110")
        .unwrap();

    let vfs = Vfs::new();
    vfs.mount(base.path(), "/", true).unwrap();
    vfs.mount_archive("patch-1", patch, "/", false).unwrap();

    assert_eq!(read_string(&vfs, "/config/game.cfg"), "fov=110");
    assert_eq!(read_string(&vfs, "/config/keys.cfg"), "w=up");
    let names: Vec<_> = vfs
        .enumerate("/config")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["game.cfg", "keys.cfg"]);
}

#[test]
fn nested_mount_points_appear_as_directories() {
    let music = dir_with(&[("theme.ogg", "♪")]);
    let vfs = Vfs::new();
    vfs.mount(music.path(), "/assets/audio/music", true).unwrap();

    assert!(vfs.is_directory("/assets").unwrap());
    assert!(vfs.is_directory("/assets/audio").unwrap());
    let listing = vfs.enumerate("/assets").unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "audio");
    assert_eq!(listing[0].kind, FileType::Directory);
    assert_eq!(read_string(&vfs, "/assets/audio/music/theme.ogg"), "♪");
}

#[test]
fn handles_into_one_source_are_independent() {
    let a = dir_with(&[("f", "0123456789")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();

    let mut first = vfs.open_file("/f").unwrap();
    let mut second = vfs.open_file("/f").unwrap();
    first.seek(5, Whence::Start).unwrap();

    let mut buf = [0u8; 2];
    second.read(&mut buf).unwrap();
    assert_eq!(&buf, b"01");
    first.read(&mut buf).unwrap();
    assert_eq!(&buf, b"56");
}

#[test]
fn threads_share_a_filesystem() {
    let a = dir_with(&[("shared.txt", "hello")]);
    let vfs = Vfs::new();
    vfs.mount(a.path(), "/", true).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let vfs = vfs.clone();
            std::thread::spawn(move || vfs.read("/shared.txt").unwrap())
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap(), b"hello");
    }
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn vfs_is_send_and_sync() {
    assert_send_sync::<Vfs>();
    assert_send_sync::<strata_vfs::ReadOnlyView>();
}
