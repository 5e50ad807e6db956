//! # strata-tar
//!
//! Archive backends for strata-vfs:
//!
//! - [`TarBackend`] - Uncompressed tar, detected by the `ustar` magic
//! - [`TarGzBackend`] - Gzip-compressed tar, detected by the gzip magic
//!   and a ustar header inside
//! - [`ZipBackend`] - Zip archives, detected by the `PK` signature whatever
//!   the file is called
//!
//! ```no_run
//! let vfs = strata_vfs::Vfs::new();
//! strata_tar::register_defaults(&vfs);
//! vfs.mount("assets.tar.gz", "/assets", true)?;
//! # Ok::<(), strata_vfs::VfsError>(())
//! ```

mod gzip;
mod members;
mod plain;
mod zipfile;

#[cfg(test)]
mod fixtures;

pub use gzip::{TAR_GZ_FORMAT, TarGzArchive, TarGzBackend};
pub use plain::{TAR_FORMAT, TarArchive, TarBackend};
pub use zipfile::{ZIP_FORMAT, ZipArchive, ZipBackend};

use strata_vfs::Vfs;

/// Register the tar, tar.gz and zip backends with `vfs`.
pub fn register_defaults(vfs: &Vfs) {
    vfs.register_backend(TarBackend);
    vfs.register_backend(TarGzBackend);
    vfs.register_backend(ZipBackend);
}
