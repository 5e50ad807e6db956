//! Built-in archive implementations.
//!
//! Format plugins live outside this crate; these two cover real
//! directories and archives assembled in memory.

mod dir;
mod memory;

pub use dir::{DIR_FORMAT, DirArchive, FileEntryStream};
pub use memory::{MEMORY_FORMAT, MemoryArchive};
