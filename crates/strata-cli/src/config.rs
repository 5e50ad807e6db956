//! RON startup configuration.
//!
//! ```ron
//! (
//!     mounts: [
//!         (source: "assets"),
//!         (source: "patch.tar.gz", mount_point: "/", append: false),
//!     ],
//!     write_dir: Some("save"),
//!     vfs: (permit_symlinks: false, default_buffer_size: 4096),
//! )
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_vfs::{MountStatus, Vfs, VfsConfig, VfsError};
use tracing::{debug, info};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub mounts: Vec<MountSpec>,
    pub write_dir: Option<PathBuf>,
    pub sane: Option<SaneSpec>,
    pub vfs: VfsConfig,
}

/// One entry of the search path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub source: PathBuf,
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    #[serde(default = "default_append")]
    pub append: bool,
}

fn default_mount_point() -> String {
    "/".to_string()
}

fn default_append() -> bool {
    true
}

/// Conventional layout for an application's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaneSpec {
    pub org: String,
    pub app: String,
    #[serde(default)]
    pub archive_ext: Option<String>,
    #[serde(default)]
    pub prepend_archives: bool,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("filesystem error: {0}")]
    Vfs(#[from] VfsError),
}

impl StrataConfig {
    /// Read a configuration file. Relative sources resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Self = ron::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        debug!(path = %path.display(), mounts = config.mounts.len(), "Loaded config");
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        for mount in &mut self.mounts {
            if mount.source.is_relative() {
                mount.source = base.join(&mount.source);
            }
        }
        if let Some(dir) = &mut self.write_dir
            && dir.is_relative()
        {
            *dir = base.join(&*dir);
        }
    }

    /// Apply sane defaults, mounts and the write directory, in that order.
    pub fn apply(&self, vfs: &Vfs) -> Result<(), ConfigError> {
        if let Some(sane) = &self.sane {
            let dirs = strata_vfs::HostDirs::discover()?;
            vfs.set_sane_config(
                &dirs,
                &sane.org,
                &sane.app,
                sane.archive_ext.as_deref(),
                sane.prepend_archives,
            )?;
        }
        for mount in &self.mounts {
            mount.apply(vfs)?;
        }
        if let Some(dir) = &self.write_dir {
            vfs.set_write_dir(dir)?;
        }
        Ok(())
    }
}

impl MountSpec {
    /// Parse `SOURCE[=MOUNT_POINT]` as given on the command line.
    pub fn parse(spec: &str, append: bool) -> Self {
        let (source, mount_point) = match spec.split_once('=') {
            Some((source, mount_point)) if !mount_point.is_empty() => (source, mount_point),
            Some((source, _)) => (source, "/"),
            None => (spec, "/"),
        };
        Self {
            source: PathBuf::from(source),
            mount_point: mount_point.to_string(),
            append,
        }
    }

    pub fn apply(&self, vfs: &Vfs) -> Result<MountStatus, VfsError> {
        let status = vfs.mount(&self.source, &self.mount_point, self.append)?;
        if status == MountStatus::AlreadyMounted {
            info!(source = %self.source.display(), "Skipping duplicate mount");
        }
        Ok(status)
    }
}
