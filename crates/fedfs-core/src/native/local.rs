//! Directory-backed native store.
//!
//! Containers are directories and binaries are files under `root`. Each
//! resource's properties live in a JSON sidecar:
//!
//! ```text
//! root/a/                      container /a
//! root/a/.fedfs-props.json     properties of /a
//! root/a/b                     binary /a/b
//! root/a/.fedfs-props-b.json   properties of /a/b
//! ```
//!
//! Names starting with `.fedfs-` are bookkeeping: never listed, and not
//! addressable except for staging entries, which only `rename` may not
//! target.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{NativeMetadata, NativeStore, Property};
use crate::error::{FederationError, Result};
use crate::fs::{StagingGuard, is_staging_name, staging_name};
use crate::path::RepoPath;
use crate::types::{BoxFuture, ByteSource, ResourceKind};

const RESERVED_PREFIX: &str = ".fedfs-";
const CONTAINER_PROPERTIES: &str = ".fedfs-props.json";

#[derive(Debug, Clone)]
pub struct LocalNativeStore {
    root: PathBuf,
}

impl LocalNativeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, id: &RepoPath) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(id.segments());
        path
    }

    fn properties_path(&self, id: &RepoPath, kind: ResourceKind) -> PathBuf {
        let path = self.resolve(id);
        match (kind, id.file_name(), path.parent()) {
            (ResourceKind::Binary, Some(name), Some(parent)) => {
                parent.join(format!("{}props-{}.json", RESERVED_PREFIX, name))
            }
            _ => path.join(CONTAINER_PROPERTIES),
        }
    }

    async fn kind(&self, id: &RepoPath) -> Result<ResourceKind> {
        reject_reserved(id, true)?;
        let meta = fs::metadata(self.resolve(id))
            .await
            .map_err(|e| FederationError::from_io_at(id.as_str(), e))?;
        Ok(if meta.is_dir() {
            ResourceKind::Container
        } else {
            ResourceKind::Binary
        })
    }

    async fn load_properties(&self, id: &RepoPath, kind: ResourceKind) -> Result<Vec<Property>> {
        let path = self.properties_path(id, kind);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| FederationError::IoFailure {
                path: path.display().to_string(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(FederationError::from_io(&path, e)),
        }
    }

    async fn store_properties(
        &self,
        id: &RepoPath,
        kind: ResourceKind,
        properties: &[Property],
    ) -> Result<()> {
        let path = self.properties_path(id, kind);
        let json = serde_json::to_vec_pretty(properties).map_err(|e| FederationError::IoFailure {
            path: path.display().to_string(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        let staged = path.with_file_name(staging_name(CONTAINER_PROPERTIES));
        let guard = StagingGuard::new(staged.clone());
        fs::write(&staged, &json)
            .await
            .map_err(|e| FederationError::from_io(&staged, e))?;
        fs::rename(&staged, &path)
            .await
            .map_err(|e| FederationError::from_io(&path, e))?;
        guard.disarm();
        Ok(())
    }
}

/// Fails for ids with a bookkeeping segment. Staging segments pass when
/// `allow_staging` is set.
fn reject_reserved(id: &RepoPath, allow_staging: bool) -> Result<()> {
    let reserved = id
        .segments()
        .any(|s| s.starts_with(RESERVED_PREFIX) && !(allow_staging && is_staging_name(s)));
    if reserved {
        return Err(FederationError::invalid_path(
            id.as_str(),
            format!("names starting with {} are reserved", RESERVED_PREFIX),
        ));
    }
    Ok(())
}

fn io_at(id: &RepoPath) -> impl FnOnce(io::Error) -> FederationError + '_ {
    move |e| FederationError::from_io_at(id.as_str(), e)
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(FederationError::from_io(path, e)),
        _ => Ok(()),
    }
}

impl NativeStore for LocalNativeStore {
    fn stat<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<NativeMetadata>> {
        Box::pin(async move {
            reject_reserved(id, true)?;
            let meta = fs::metadata(self.resolve(id)).await.map_err(io_at(id))?;
            let modified = meta.modified().map_err(io_at(id))?;
            Ok(NativeMetadata {
                kind: if meta.is_dir() {
                    ResourceKind::Container
                } else {
                    ResourceKind::Binary
                },
                size: if meta.is_dir() { 0 } else { meta.len() },
                last_modified: DateTime::<Utc>::from(modified),
            })
        })
    }

    fn read<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<ByteSource>> {
        Box::pin(async move {
            if self.kind(id).await?.is_container() {
                return Err(FederationError::invalid_path(
                    id.as_str(),
                    "a container has no content",
                ));
            }
            let file = fs::File::open(self.resolve(id)).await.map_err(io_at(id))?;
            Ok(Box::pin(file) as ByteSource)
        })
    }

    fn write<'a>(&'a self, id: &'a RepoPath, mut data: ByteSource) -> BoxFuture<'a, Result<RepoPath>> {
        Box::pin(async move {
            reject_reserved(id, true)?;
            let (Some(parent), Some(name)) = (id.parent(), id.file_name()) else {
                return Err(FederationError::invalid_path(
                    id.as_str(),
                    "the root cannot hold content",
                ));
            };
            if !self.kind(&parent).await?.is_container() {
                return Err(FederationError::invalid_path(
                    id.as_str(),
                    "parent is not a container",
                ));
            }
            let target = self.resolve(id);
            if fs::metadata(&target).await.is_ok_and(|m| m.is_dir()) {
                return Err(FederationError::DestinationConflict(id.to_string()));
            }

            let staged = self.resolve(&parent).join(staging_name(name));
            let guard = StagingGuard::new(staged.clone());
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&staged)
                .await
                .map_err(|e| FederationError::from_io(&staged, e))?;
            tokio::io::copy(&mut data, &mut file)
                .await
                .map_err(io_at(id))?;
            file.flush().await.map_err(io_at(id))?;
            file.sync_all().await.map_err(io_at(id))?;
            drop(file);
            fs::rename(&staged, &target).await.map_err(io_at(id))?;
            guard.disarm();
            log::debug!("native write {}", id);
            Ok(id.clone())
        })
    }

    fn create_container<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<RepoPath>> {
        Box::pin(async move {
            reject_reserved(id, true)?;
            let path = self.resolve(id);
            if fs::metadata(&path).await.is_ok_and(|m| !m.is_dir()) {
                return Err(FederationError::DestinationConflict(id.to_string()));
            }
            fs::create_dir_all(&path).await.map_err(io_at(id))?;
            Ok(id.clone())
        })
    }

    fn children<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            if !self.kind(id).await?.is_container() {
                return Ok(Vec::new());
            }
            let mut names = Vec::new();
            let mut entries = fs::read_dir(self.resolve(id)).await.map_err(io_at(id))?;
            while let Some(entry) = entries.next_entry().await.map_err(io_at(id))? {
                match entry.file_name().into_string() {
                    Ok(name) if !name.starts_with(RESERVED_PREFIX) => names.push(name),
                    Ok(_) => {}
                    Err(raw) => log::debug!("skipping non UTF-8 entry {:?} in {}", raw, id),
                }
            }
            names.sort();
            Ok(names)
        })
    }

    fn properties<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<Vec<Property>>> {
        Box::pin(async move {
            let kind = self.kind(id).await?;
            self.load_properties(id, kind).await
        })
    }

    fn set_property<'a>(
        &'a self,
        id: &'a RepoPath,
        predicate: &'a str,
        object: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let kind = self.kind(id).await?;
            let mut properties = self.load_properties(id, kind).await?;
            properties.retain(|p| p.predicate != predicate);
            properties.push(Property {
                predicate: predicate.to_string(),
                object: object.to_string(),
            });
            self.store_properties(id, kind, &properties).await
        })
    }

    fn rename<'a>(&'a self, from: &'a RepoPath, to: &'a RepoPath) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            reject_reserved(to, false)?;
            let kind = self.kind(from).await?;
            fs::rename(self.resolve(from), self.resolve(to))
                .await
                .map_err(io_at(from))?;
            // container properties travel inside the directory
            if kind == ResourceKind::Binary {
                let old = self.properties_path(from, kind);
                let new = self.properties_path(to, kind);
                match fs::rename(&old, &new).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => remove_if_exists(&new).await?,
                    Err(e) => return Err(FederationError::from_io(&old, e)),
                }
            }
            Ok(())
        })
    }

    fn remove<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if id.is_root() {
                return Err(FederationError::invalid_path(
                    id.as_str(),
                    "the root cannot be removed",
                ));
            }
            let path = self.resolve(id);
            match self.kind(id).await? {
                ResourceKind::Container => fs::remove_dir_all(&path).await.map_err(io_at(id))?,
                ResourceKind::Binary => {
                    fs::remove_file(&path).await.map_err(io_at(id))?;
                    remove_if_exists(&self.properties_path(id, ResourceKind::Binary)).await?;
                }
            }
            log::debug!("native remove {}", id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn id(raw: &str) -> RepoPath {
        RepoPath::new(raw).unwrap()
    }

    fn bytes(data: &'static [u8]) -> ByteSource {
        Box::pin(Cursor::new(data))
    }

    async fn read_string(store: &LocalNativeStore, raw: &str) -> String {
        let mut out = String::new();
        store
            .read(&id(raw))
            .await
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        out
    }

    #[tokio::test]
    async fn test_write_then_read_and_stat() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.create_container(&id("/objects")).await.unwrap();
        store.write(&id("/objects/ds1"), bytes(b"abc123")).await.unwrap();

        assert_eq!(read_string(&store, "/objects/ds1").await, "abc123");
        let meta = store.stat(&id("/objects/ds1")).await.unwrap();
        assert_eq!(meta.kind, ResourceKind::Binary);
        assert_eq!(meta.size, 6);
        assert_eq!(
            store.stat(&id("/objects")).await.unwrap().kind,
            ResourceKind::Container
        );
    }

    #[tokio::test]
    async fn test_write_replaces_existing_binary() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.write(&id("/ds1"), bytes(b"old")).await.unwrap();
        store.write(&id("/ds1"), bytes(b"new content")).await.unwrap();
        assert_eq!(read_string(&store, "/ds1").await, "new content");
        assert_eq!(store.children(&RepoPath::root()).await.unwrap(), vec!["ds1"]);
    }

    #[tokio::test]
    async fn test_write_without_parent_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        let err = store
            .write(&id("/missing/ds1"), bytes(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_write_over_container_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.create_container(&id("/c")).await.unwrap();
        let err = store.write(&id("/c"), bytes(b"x")).await.unwrap_err();
        assert!(matches!(err, FederationError::DestinationConflict(_)));
    }

    #[tokio::test]
    async fn test_create_container_makes_ancestors_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.create_container(&id("/a/b/c")).await.unwrap();
        store.create_container(&id("/a/b/c")).await.unwrap();
        assert_eq!(store.children(&id("/a/b")).await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_read_container_is_invalid() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.create_container(&id("/c")).await.unwrap();
        let err = store.read(&id("/c")).await.err().unwrap();
        assert!(matches!(err, FederationError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_properties_replace_by_predicate_and_stay_hidden() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.create_container(&id("/c")).await.unwrap();
        store.write(&id("/c/ds1"), bytes(b"x")).await.unwrap();

        store.set_property(&id("/c/ds1"), "urn:p", "one").await.unwrap();
        store.set_property(&id("/c/ds1"), "urn:q", "q").await.unwrap();
        store.set_property(&id("/c/ds1"), "urn:p", "two").await.unwrap();
        store.set_property(&id("/c"), "urn:p", "container").await.unwrap();

        let props = store.properties(&id("/c/ds1")).await.unwrap();
        assert_eq!(props.len(), 2);
        assert!(props.contains(&Property {
            predicate: "urn:p".into(),
            object: "two".into()
        }));
        assert_eq!(store.properties(&id("/c")).await.unwrap()[0].object, "container");
        assert_eq!(store.children(&id("/c")).await.unwrap(), vec!["ds1"]);
    }

    #[tokio::test]
    async fn test_link_external_content_records_single_triple() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.write(&id("/obj"), bytes(b"")).await.unwrap();
        store
            .link_external_content(&id("/obj"), "urn:ext", "http://localhost/rest/files/a")
            .await
            .unwrap();
        store
            .link_external_content(&id("/obj"), "urn:ext", "http://localhost/rest/files/b")
            .await
            .unwrap();
        let props = store.properties(&id("/obj")).await.unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].object, "http://localhost/rest/files/b");
    }

    #[tokio::test]
    async fn test_rename_carries_binary_properties() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.write(&id("/a"), bytes(b"x")).await.unwrap();
        store.set_property(&id("/a"), "urn:p", "v").await.unwrap();
        store.rename(&id("/a"), &id("/b")).await.unwrap();

        assert!(matches!(
            store.stat(&id("/a")).await.unwrap_err(),
            FederationError::NotFound(_)
        ));
        assert_eq!(store.properties(&id("/b")).await.unwrap()[0].object, "v");
    }

    #[tokio::test]
    async fn test_remove_tree_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.create_container(&id("/t/sub")).await.unwrap();
        store.write(&id("/t/sub/f"), bytes(b"x")).await.unwrap();
        store.remove(&id("/t")).await.unwrap();
        assert!(store.children(&RepoPath::root()).await.unwrap().is_empty());

        let err = store.remove(&id("/t")).await.unwrap_err();
        assert!(matches!(err, FederationError::NotFound(_)));
        assert!(store.remove(&RepoPath::root()).await.is_err());
    }

    #[tokio::test]
    async fn test_bookkeeping_names_are_not_addressable() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        store.set_property(&RepoPath::root(), "p", "root").await.unwrap();
        store.write(&id("/a"), bytes(b"a")).await.unwrap();

        let sidecar = id("/.fedfs-props.json");
        assert!(matches!(
            store.write(&sidecar, bytes(b"x")).await,
            Err(FederationError::InvalidPath { .. })
        ));
        assert!(store.stat(&sidecar).await.is_err());
        assert!(store.remove(&sidecar).await.is_err());
        assert!(store.create_container(&id("/.fedfs-props-a.json")).await.is_err());
        assert!(store.rename(&id("/a"), &sidecar).await.is_err());
        let staged = id(&format!("/{}", staging_name("a")));
        assert!(store.rename(&id("/a"), &staged).await.is_err());

        assert_eq!(store.properties(&RepoPath::root()).await.unwrap().len(), 1);
        assert_eq!(read_string(&store, "/a").await, "a");
    }

    #[tokio::test]
    async fn test_staging_entries_can_be_built_and_published() {
        let dir = TempDir::new().unwrap();
        let store = LocalNativeStore::new(dir.path());
        let staged = id(&format!("/{}", staging_name("d")));
        store.create_container(&staged).await.unwrap();
        store.write(&staged.join("x").unwrap(), bytes(b"x")).await.unwrap();
        store.rename(&staged, &id("/d")).await.unwrap();
        assert_eq!(read_string(&store, "/d/x").await, "x");
        assert_eq!(store.children(&RepoPath::root()).await.unwrap(), vec!["d"]);
    }
}

