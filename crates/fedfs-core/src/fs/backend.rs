//! Filesystem backend trait: the storage abstraction behind a mount.
//!
//! Backends are intentionally simple: stat, list, stream, and the handful
//! of write primitives a gated copy needs. Caching, TTLs and path policy all
//! live above this trait.
//!
//! # Dyn-compatibility
//!
//! Methods return `BoxFuture` instead of `impl Future` so that
//! `Arc<dyn FileSystem>` works and tests can wrap a backend to count or
//! delay calls. All input references share a single lifetime `'a` so the
//! returned future can borrow from both `&self` and the path arguments.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::types::{BoxFuture, ByteSource, ResourceKind};

/// Result of a single stat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStat {
    pub kind: ResourceKind,
    pub modified: DateTime<Utc>,
    pub len: u64,
}

/// Storage backend for a federated tree.
///
/// Each method wraps a single underlying system call (or a short fixed
/// sequence for the write primitives) so callers can reason about how long
/// they wait on I/O.
pub trait FileSystem: Send + Sync {
    /// Stat a path, following symlinks.
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FsStat>>;

    /// Entry names of a directory, in the order the OS returns them.
    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<String>>>;

    /// Open a file for streaming reads.
    fn open<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<ByteSource>>;

    /// Stream `data` into `path`, replacing it atomically: the bytes land in
    /// a hidden sibling which is renamed over `path` only once complete.
    /// Returns the number of bytes written. The parent must already exist.
    fn write_atomic<'a>(
        &'a self,
        path: &'a Path,
        data: ByteSource,
    ) -> BoxFuture<'a, io::Result<u64>>;

    /// Create a single directory. Missing parents are an error.
    fn create_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>>;

    /// Rename within the backend.
    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, io::Result<()>>;

    /// Remove a file, or a directory with everything below it.
    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>>;
}
