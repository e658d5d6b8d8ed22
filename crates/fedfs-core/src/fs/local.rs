//! Local filesystem backend.
//!
//! Thin `tokio::fs` wrapper. Paths arrive absolute and already confined to a
//! mount root by the namespace mapper. Writes go through a staged sibling
//! and a rename, so readers see either the old file or the complete new one.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::backend::{FileSystem, FsStat};
use super::{StagingGuard, staging_name};
use crate::types::{BoxFuture, ByteSource, ResourceKind};

/// `FileSystem` over the host's directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for LocalFileSystem {
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FsStat>> {
        Box::pin(async move {
            let meta = fs::metadata(path).await?;
            let kind = if meta.is_dir() {
                ResourceKind::Container
            } else {
                ResourceKind::Binary
            };
            Ok(FsStat {
                kind,
                modified: DateTime::<Utc>::from(meta.modified()?),
                len: if meta.is_dir() { 0 } else { meta.len() },
            })
        })
    }

    fn read_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<String>>> {
        Box::pin(async move {
            let mut names = Vec::new();
            let mut read_dir = fs::read_dir(path).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                match entry.file_name().into_string() {
                    Ok(name) => names.push(name),
                    Err(raw) => {
                        log::debug!("skipping non UTF-8 entry {:?} in {}", raw, path.display())
                    }
                }
            }
            Ok(names)
        })
    }

    fn open<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<ByteSource>> {
        Box::pin(async move {
            let file = fs::File::open(path).await?;
            Ok(Box::pin(file) as ByteSource)
        })
    }

    fn write_atomic<'a>(
        &'a self,
        path: &'a Path,
        mut data: ByteSource,
    ) -> BoxFuture<'a, io::Result<u64>> {
        Box::pin(async move {
            let (parent, name) = match (path.parent(), path.file_name()) {
                (Some(parent), Some(name)) => (parent, name.to_string_lossy()),
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("cannot write to {}", path.display()),
                    ));
                }
            };
            let staged = parent.join(staging_name(&name));
            let guard = StagingGuard::new(staged.clone());
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&staged)
                .await?;
            let written = tokio::io::copy(&mut data, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&staged, path).await?;
            guard.disarm();
            Ok(written)
        })
    }

    fn create_dir<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move { fs::create_dir(path).await })
    }

    fn rename<'a>(&'a self, from: &'a Path, to: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move { fs::rename(from, to).await })
    }

    fn remove<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let meta = fs::symlink_metadata(path).await?; // propagates NotFound cleanly
            if meta.is_dir() {
                fs::remove_dir_all(path).await
            } else {
                fs::remove_file(path).await
            }
        })
    }
}
