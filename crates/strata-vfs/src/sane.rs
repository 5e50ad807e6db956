//! Conventional setup for applications: a per-user write directory in
//! front of the install directory, plus any archives found in either.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{VfsError, VfsResult};
use crate::vfs::Vfs;

/// Host directories used as defaults for mounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDirs {
    /// Directory containing the running executable.
    pub base_dir: PathBuf,
    /// The user's home directory.
    pub user_dir: PathBuf,
}

impl HostDirs {
    /// Look up the executable's directory and the user's home.
    pub fn discover() -> VfsResult<Self> {
        let exe = std::env::current_exe()?;
        let base_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| VfsError::not_found("executable directory"))?;
        let user_dir = dirs::home_dir().ok_or_else(|| VfsError::not_found("home directory"))?;
        Ok(Self { base_dir, user_dir })
    }

    /// Per-user write directory for `org`/`app`: `<user>/.<org>/<app>`.
    pub fn app_dir(&self, org: &str, app: &str) -> PathBuf {
        self.user_dir.join(format!(".{org}")).join(app)
    }
}

impl Vfs {
    /// Set up a typical application layout.
    ///
    /// The write directory becomes `<user>/.<org>/<app>` (created if
    /// missing) and is mounted at the root, followed by the base directory.
    /// When `archive_ext` is given, files with that extension
    /// (case-insensitive) directly inside either directory are mounted at
    /// the root too, in name order, in front of everything when
    /// `prepend_archives` is set and behind it otherwise. Files the
    /// registry can't open are skipped.
    pub fn set_sane_config(
        &self,
        dirs: &HostDirs,
        org: &str,
        app: &str,
        archive_ext: Option<&str>,
        prepend_archives: bool,
    ) -> VfsResult<()> {
        if org.is_empty() || app.is_empty() {
            return Err(VfsError::invalid_argument("organization and app names are required"));
        }

        let write_dir = dirs.app_dir(org, app);
        fs::create_dir_all(&write_dir)?;
        self.set_write_dir(&write_dir)?;
        self.add_to_search_path(&write_dir, true)?;
        self.add_to_search_path(&dirs.base_dir, true)?;
        info!(write_dir = %write_dir.display(), base_dir = %dirs.base_dir.display(), "Sane config applied");

        let Some(ext) = archive_ext else {
            return Ok(());
        };
        let ext = ext.trim_start_matches('.');
        for root in [&write_dir, &dirs.base_dir] {
            for archive in find_archives(root, ext)? {
                if let Err(e) = self.add_to_search_path(&archive, !prepend_archives) {
                    warn!(archive = %archive.display(), error = %e, "Skipping archive");
                }
            }
        }
        Ok(())
    }
}

/// Files directly inside `dir` with extension `ext`, sorted by name.
fn find_archives(dir: &Path, ext: &str) -> VfsResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
