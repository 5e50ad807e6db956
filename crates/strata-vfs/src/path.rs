//! Virtual path normalization.
//!
//! A [`VirtualPath`] is always absolute, `/`-separated, free of `.` and `..`
//! segments, and has no trailing slash except for the root itself. Two paths
//! are equal iff their normalized strings are byte-equal. Case is never
//! folded; case-insensitive backends report that through existence checks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{VfsError, VfsResult};

/// A normalized virtual path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VirtualPath(String);

impl VirtualPath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Normalize `path` into a virtual path.
    ///
    /// Backslashes are treated as separators, repeated separators collapse,
    /// `.` segments are dropped and `..` pops a segment, clamping at the
    /// root. The empty string is the root. Fails only on an embedded NUL.
    pub fn new(path: &str) -> VfsResult<Self> {
        if path.contains('\0') {
            return Err(VfsError::invalid_path(path.replace('\0', "\\0")));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            Ok(Self::root())
        } else {
            Ok(Self(format!("/{}", segments.join("/"))))
        }
    }

    /// The normalized string, always starting with `/`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `/`.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments, empty for the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Final segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// The parent path, `None` for the root.
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Append a single name or relative path.
    pub fn join(&self, name: &str) -> VfsResult<VirtualPath> {
        Self::new(&format!("{}/{}", self.0, name))
    }

    /// Path relative to the root, without the leading `/`.
    pub fn relative(&self) -> &str {
        self.0.trim_start_matches('/')
    }

    /// Strip `prefix` on segment boundaries.
    ///
    /// Returns the remainder as a relative path (`""` when equal). The root
    /// is a prefix of everything. `/data` is a prefix of `/data/x` but not of
    /// `/database`.
    pub fn strip_prefix(&self, prefix: &VirtualPath) -> Option<&str> {
        if prefix.is_root() {
            return Some(self.relative());
        }
        let rest = self.0.strip_prefix(prefix.as_str())?;
        if rest.is_empty() {
            Some("")
        } else {
            rest.strip_prefix('/')
        }
    }

    /// Returns true if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &VirtualPath) -> bool {
        self != other && other.strip_prefix(self).is_some()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for VirtualPath {
    type Error = VfsError;

    fn try_from(value: &str) -> VfsResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<String> for VirtualPath {
    type Error = VfsError;

    fn try_from(value: String) -> VfsResult<Self> {
        Self::new(&value)
    }
}

impl From<VirtualPath> for String {
    fn from(path: VirtualPath) -> Self {
        path.0
    }
}

/// Normalize `path`; see [`VirtualPath::new`].
pub fn normalize(path: &str) -> VfsResult<VirtualPath> {
    VirtualPath::new(path)
}
