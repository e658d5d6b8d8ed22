//! Filesystem collaborator: the only code that touches the federated tree.
//!
//! ```text
//! cache / linker / copy  ->  FileSystem (dumb storage)  ->  tokio::fs
//! ```
//!
//! Backends know nothing about mounts, TTLs or repository paths. They receive
//! absolute paths already produced by the namespace mapper.

pub mod backend;
pub mod local;

use std::fs;
use std::path::PathBuf;

pub use backend::{FileSystem, FsStat};
pub use local::LocalFileSystem;

/// Name prefix of in-flight copy targets. Entries carrying it are never
/// projected.
pub const STAGING_PREFIX: &str = ".fedfs-staging-";

/// Hidden sibling name used while assembling `name`.
pub fn staging_name(name: &str) -> String {
    format!("{}{}-{}", STAGING_PREFIX, uuid::Uuid::new_v4().simple(), name)
}

pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

/// Removes a staged file or directory unless disarmed.
///
/// Dropping the guard (error return or a cancelled future) deletes whatever
/// was staged so a partial copy never becomes visible.
pub(crate) struct StagingGuard {
    path: Option<PathBuf>,
}

impl StagingGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// The staged entry has been published; leave it alone.
    pub(crate) fn disarm(mut self) {
        self.path = None;
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let result = match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(_) => return,
        };
        if let Err(e) = result {
            log::warn!("failed to remove staged copy {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_names_are_recognised() {
        let name = staging_name("ds1");
        assert!(is_staging_name(&name));
        assert!(name.ends_with("-ds1"));
        assert_ne!(staging_name("ds1"), name);
        assert!(!is_staging_name("ds1"));
    }

    #[test]
    fn test_guard_removes_unless_disarmed() {
        let dir = tempfile::TempDir::new().unwrap();
        let staged = dir.path().join(staging_name("f"));
        fs::write(&staged, b"partial").unwrap();
        drop(StagingGuard::new(staged.clone()));
        assert!(!staged.exists());

        let staged_dir = dir.path().join(staging_name("d"));
        fs::create_dir(&staged_dir).unwrap();
        fs::write(staged_dir.join("x"), b"x").unwrap();
        drop(StagingGuard::new(staged_dir.clone()));
        assert!(!staged_dir.exists());

        let kept = dir.path().join("kept");
        fs::write(&kept, b"done").unwrap();
        StagingGuard::new(kept.clone()).disarm();
        assert!(kept.exists());
    }
}
