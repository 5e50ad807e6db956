//! Archive backend registry.
//!
//! Backends are probed in registration order against the first
//! [`PROBE_HEADER_LEN`] bytes of a source. The first backend whose probe
//! succeeds claims the source; later registrations never override an
//! earlier one that also matches.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::archive::{Archive, ArchiveBackend};
use crate::error::{VfsError, VfsResult};
use crate::types::ArchiveInfo;

/// Number of leading bytes handed to [`ArchiveBackend::probe`].
pub const PROBE_HEADER_LEN: usize = 512;

/// Ordered table of archive backends.
#[derive(Default, Clone)]
pub struct ArchiveRegistry {
    backends: Vec<Arc<dyn ArchiveBackend>>,
}

impl std::fmt::Debug for ArchiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveRegistry")
            .field(
                "backends",
                &self.backends.iter().map(|b| b.info().name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ArchiveRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend after all existing ones.
    ///
    /// Registering a second backend under an existing format name is
    /// allowed; the first one keeps priority when both match a source.
    pub fn register(&mut self, backend: impl ArchiveBackend + 'static) {
        self.register_arc(Arc::new(backend));
    }

    /// Register a backend (already wrapped in Arc).
    pub fn register_arc(&mut self, backend: Arc<dyn ArchiveBackend>) {
        debug!(format = %backend.info().name, "Registered archive backend");
        self.backends.push(backend);
    }

    /// Find the first backend claiming `header`.
    pub fn probe(&self, header: &[u8]) -> Option<Arc<dyn ArchiveBackend>> {
        self.backends
            .iter()
            .find(|backend| backend.probe(header))
            .cloned()
    }

    /// Read the header of the file at `path`, probe, and open it.
    pub fn open(&self, path: &Path) -> VfsResult<Box<dyn Archive>> {
        let header = read_header(path)?;
        let backend = self
            .probe(&header)
            .ok_or_else(|| VfsError::unsupported_format(path.display().to_string()))?;
        debug!(
            source = %path.display(),
            format = %backend.info().name,
            "Archive claimed by backend"
        );
        backend.open(path)
    }

    /// Info for every registered backend, in probe order.
    pub fn supported_types(&self) -> Vec<ArchiveInfo> {
        self.backends.iter().map(|b| b.info()).collect()
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Returns true if no backends are registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Read up to [`PROBE_HEADER_LEN`] bytes from the start of `path`.
fn read_header(path: &Path) -> VfsResult<Vec<u8>> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(PROBE_HEADER_LEN);
    file.take(PROBE_HEADER_LEN as u64).read_to_end(&mut header)?;
    Ok(header)
}
