//! External-content linking: native resources whose bytes live in the
//! federation.
//!
//! A native resource carrying exactly one
//! `<id> <external_content_predicate> <federation URI>` triple is served from
//! the federated file that URI names. No bytes are copied.

use std::sync::Arc;

use crate::cache::MetadataCache;
use crate::error::{FederationError, Result};
use crate::fs::FileSystem;
use crate::mount::{FederatedPath, NamespaceMapper};
use crate::native::NativeStore;
use crate::path::RepoPath;
use crate::types::ByteSource;

pub struct ExternalContentLinker {
    mapper: Arc<NamespaceMapper>,
    cache: Arc<MetadataCache>,
    fs: Arc<dyn FileSystem>,
    native: Arc<dyn NativeStore>,
    predicate: String,
}

impl ExternalContentLinker {
    pub fn new(
        mapper: Arc<NamespaceMapper>,
        cache: Arc<MetadataCache>,
        fs: Arc<dyn FileSystem>,
        native: Arc<dyn NativeStore>,
        predicate: impl Into<String>,
    ) -> Self {
        Self {
            mapper,
            cache,
            fs,
            native,
            predicate: predicate.into(),
        }
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// The URI `id` points at through the external-content predicate.
    ///
    /// Other predicates never activate resolution. Several matching triples
    /// are a data error in the native graph; the first one wins.
    pub async fn external_reference(&self, id: &RepoPath) -> Result<Option<String>> {
        let properties = self.native.properties(id).await?;
        let mut refs = properties
            .into_iter()
            .filter(|p| p.predicate == self.predicate);
        let first = refs.next().map(|p| p.object);
        if refs.next().is_some() {
            log::warn!(
                "{} has more than one {} triple; using the first",
                id,
                self.predicate
            );
        }
        Ok(first)
    }

    /// Stream the content served at `id`.
    ///
    /// Federated paths stream straight from disk. Native resources with an
    /// external reference stream from the referenced federated file;
    /// anything else is the native store's own content. A reference whose
    /// target is gone fails with `NotFound`.
    pub async fn resolve_content(&self, id: &RepoPath) -> Result<ByteSource> {
        if self.mapper.is_federated(id) {
            let path = self.mapper.to_filesystem_path(id)?;
            return self.open_federated(&path).await;
        }
        let Some(uri) = self.external_reference(id).await? else {
            return self.native.read(id).await;
        };
        let target = self.mapper.repo_path_from_uri(&uri)?;
        let path = self.mapper.to_filesystem_path(&target)?;
        log::debug!("{} resolves to external content {}", id, path.repo_path());
        self.open_federated(&path).await
    }

    async fn open_federated(&self, path: &FederatedPath) -> Result<ByteSource> {
        if self.cache.stat(path).await?.is_directory() {
            return Err(FederationError::invalid_path(
                path.repo_path().as_str(),
                "a container has no content",
            ));
        }
        match self.fs.open(path.fs_path()).await {
            Ok(source) => Ok(source),
            Err(e) => {
                // cached as present but gone on disk
                self.cache.invalidate(path);
                Err(FederationError::from_io(path.fs_path(), e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DEFAULT_EXTERNAL_CONTENT_PREDICATE;
    use crate::fs::LocalFileSystem;
    use crate::native::LocalNativeStore;
    use crate::test_support::Fixture;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    struct Setup {
        fx: Fixture,
        _native_dir: TempDir,
        native: Arc<LocalNativeStore>,
        clock: Arc<ManualClock>,
        linker: ExternalContentLinker,
    }

    fn setup() -> Setup {
        let fx = Fixture::new();
        let native_dir = TempDir::new().unwrap();
        let native = Arc::new(LocalNativeStore::new(native_dir.path()));
        let clock = ManualClock::shared();
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
        let cache = Arc::new(MetadataCache::new(
            fs.clone(),
            clock.clone(),
            Duration::from_secs(1),
        ));
        let linker = ExternalContentLinker::new(
            Arc::new(fx.mapper().clone()),
            cache,
            fs,
            native.clone(),
            DEFAULT_EXTERNAL_CONTENT_PREDICATE,
        );
        Setup {
            fx,
            _native_dir: native_dir,
            native,
            clock,
            linker,
        }
    }

    fn id(raw: &str) -> RepoPath {
        RepoPath::new(raw).unwrap()
    }

    async fn content(linker: &ExternalContentLinker, raw: &str) -> Result<String> {
        let mut out = String::new();
        linker
            .resolve_content(&id(raw))
            .await?
            .read_to_string(&mut out)
            .await
            .unwrap();
        Ok(out)
    }

    async fn native_object(native: &LocalNativeStore, raw: &str, body: &'static [u8]) {
        native
            .write(&id(raw), Box::pin(Cursor::new(body)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_linked_resource_streams_federated_bytes() {
        let s = setup();
        s.fx.write("ds1", b"abc123");
        native_object(&s.native, "/obj", b"").await;
        s.native
            .link_external_content(
                &id("/obj"),
                DEFAULT_EXTERNAL_CONTENT_PREDICATE,
                &s.fx.mapper().to_uri(&id("/files/ds1")),
            )
            .await
            .unwrap();

        assert_eq!(content(&s.linker, "/obj").await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_federated_path_streams_directly() {
        let s = setup();
        s.fx.write("ds1", b"direct");
        assert_eq!(content(&s.linker, "/files/ds1").await.unwrap(), "direct");
    }

    #[tokio::test]
    async fn test_other_predicates_are_ignored() {
        let s = setup();
        s.fx.write("ds1", b"abc123");
        native_object(&s.native, "/obj", b"native bytes").await;
        s.native
            .set_property(
                &id("/obj"),
                "http://example.org/vocab#seeAlso",
                &s.fx.mapper().to_uri(&id("/files/ds1")),
            )
            .await
            .unwrap();

        assert_eq!(content(&s.linker, "/obj").await.unwrap(), "native bytes");
        assert_eq!(s.linker.external_reference(&id("/obj")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_removed_target_is_not_found_after_ttl() {
        let s = setup();
        s.fx.write("ds1", b"abc123");
        native_object(&s.native, "/obj", b"").await;
        s.native
            .link_external_content(
                &id("/obj"),
                DEFAULT_EXTERNAL_CONTENT_PREDICATE,
                &s.fx.mapper().to_uri(&id("/files/ds1")),
            )
            .await
            .unwrap();
        content(&s.linker, "/obj").await.unwrap();

        std::fs::remove_file(s.fx.fs_path("ds1")).unwrap();
        s.clock.advance(Duration::from_secs(1));
        let err = content(&s.linker, "/obj").await.unwrap_err();
        assert!(matches!(err, FederationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_removed_target_within_ttl_still_fails_cleanly() {
        let s = setup();
        s.fx.write("ds1", b"abc123");
        content(&s.linker, "/files/ds1").await.unwrap();
        std::fs::remove_file(s.fx.fs_path("ds1")).unwrap();
        let err = content(&s.linker, "/files/ds1").await.unwrap_err();
        assert!(matches!(err, FederationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reference_outside_federation_is_not_federated() {
        let s = setup();
        native_object(&s.native, "/obj", b"").await;
        s.native
            .link_external_content(
                &id("/obj"),
                DEFAULT_EXTERNAL_CONTENT_PREDICATE,
                &s.fx.mapper().to_uri(&id("/elsewhere/x")),
            )
            .await
            .unwrap();
        let err = content(&s.linker, "/obj").await.unwrap_err();
        assert!(matches!(err, FederationError::NotFederated(_)));
    }

    #[tokio::test]
    async fn test_container_has_no_content() {
        let s = setup();
        s.fx.mkdir("dir");
        let err = content(&s.linker, "/files/dir").await.unwrap_err();
        assert!(matches!(err, FederationError::InvalidPath { .. }));
    }

    #[test]
    fn test_predicate_is_configurable() {
        let s = setup();
        assert_eq!(s.linker.predicate(), DEFAULT_EXTERNAL_CONTENT_PREDICATE);
    }
}
