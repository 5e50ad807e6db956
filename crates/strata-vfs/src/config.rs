//! Filesystem configuration.

use serde::{Deserialize, Serialize};

/// Settings applied when a [`Vfs`](crate::Vfs) is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Follow symbolic links in mounted directories.
    pub permit_symlinks: bool,
    /// Buffer size given to new file handles (0 = unbuffered).
    pub default_buffer_size: usize,
}
