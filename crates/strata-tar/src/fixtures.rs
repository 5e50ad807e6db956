//! Archive builders for unit tests.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};

/// Modification time stamped on every fixture member.
pub const MTIME: u64 = 1_700_000_000;

enum Item {
    File(String, Vec<u8>),
    Dir(String),
    Symlink(String, String),
}

/// Builds tar archives in memory.
#[derive(Default)]
pub struct TarFixture {
    items: Vec<Item>,
}

impl TarFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.items.push(Item::File(path.to_string(), data.to_vec()));
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.items.push(Item::Dir(path.to_string()));
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.items
            .push(Item::Symlink(path.to_string(), target.to_string()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for item in self.items {
            let mut header = Header::new_gnu();
            header.set_mtime(MTIME);
            match item {
                Item::File(path, data) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_mode(0o644);
                    header.set_size(data.len() as u64);
                    builder.append_data(&mut header, path, data.as_slice()).unwrap();
                }
                Item::Dir(path) => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    builder.append_data(&mut header, path, io::empty()).unwrap();
                }
                Item::Symlink(path, target) => {
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    builder.append_link(&mut header, path, target).unwrap();
                }
            }
        }
        builder.into_inner().unwrap()
    }

    pub fn build_gz(self) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.build()).unwrap();
        encoder.finish().unwrap()
    }
}

/// Timestamp stamped on every zip fixture member.
pub fn zip_mtime() -> zip::DateTime {
    zip::DateTime::from_date_and_time(2020, 6, 15, 12, 30, 0).unwrap()
}

/// Builds zip archives in memory.
#[derive(Default)]
pub struct ZipFixture {
    items: Vec<Item>,
}

impl ZipFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.items.push(Item::File(path.to_string(), data.to_vec()));
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.items.push(Item::Dir(path.to_string()));
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.items
            .push(Item::Symlink(path.to_string(), target.to_string()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip_mtime());
        let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
        for item in self.items {
            match item {
                Item::File(path, data) => {
                    writer.start_file(path, options).unwrap();
                    writer.write_all(&data).unwrap();
                }
                Item::Dir(path) => writer.add_directory(path, options).unwrap(),
                Item::Symlink(path, target) => writer.add_symlink(path, target, options).unwrap(),
            }
        }
        writer.finish().unwrap().into_inner()
    }
}
