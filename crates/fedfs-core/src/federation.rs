//! The connector facade.
//!
//! [`Federation`] wires the mapper, cache, projection engine, linker and
//! copy operator together from one [`FederationConfig`] and exposes the
//! operations a transport needs. Components share the cache and the
//! filesystem handle; nothing lives in global state.

use std::sync::Arc;

use crate::cache::{MetadataCache, Stat};
use crate::clock::{SharedClock, SystemClock};
use crate::config::FederationConfig;
use crate::copy::{CopyOperator, CopyOutcome, CopyRequest};
use crate::error::{FederationError, Result};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::linker::ExternalContentLinker;
use crate::mount::NamespaceMapper;
use crate::native::NativeStore;
use crate::path::RepoPath;
use crate::projection::{ProjectionEngine, ResourceView, http_date};
use crate::request::{Request, Response};
use crate::types::ByteSource;

pub struct Federation {
    config: FederationConfig,
    mapper: Arc<NamespaceMapper>,
    cache: Arc<MetadataCache>,
    native: Arc<dyn NativeStore>,
    projection: ProjectionEngine,
    linker: ExternalContentLinker,
    copier: CopyOperator,
}

impl Federation {
    /// Federation over the local filesystem with the system clock.
    pub fn new(config: FederationConfig, native: Arc<dyn NativeStore>) -> Result<Self> {
        Self::with_parts(
            config,
            native,
            Arc::new(LocalFileSystem::new()),
            SystemClock::shared(),
        )
    }

    /// Federation over explicit collaborators.
    pub fn with_parts(
        config: FederationConfig,
        native: Arc<dyn NativeStore>,
        fs: Arc<dyn FileSystem>,
        clock: SharedClock,
    ) -> Result<Self> {
        let mapper = Arc::new(NamespaceMapper::new(&config)?);
        for mount in mapper.mounts() {
            log::info!("mount {} -> {}", mount.prefix(), mount.root().display());
        }
        let cache = Arc::new(MetadataCache::new(fs.clone(), clock, config.cache_ttl()));
        let projection = ProjectionEngine::new(cache.clone());
        let linker = ExternalContentLinker::new(
            mapper.clone(),
            cache.clone(),
            fs.clone(),
            native.clone(),
            config.external_content_predicate.clone(),
        );
        let copier = CopyOperator::new(
            mapper.clone(),
            cache.clone(),
            fs,
            native.clone(),
            config.allow_federation_writes,
        );
        Ok(Self {
            config,
            mapper,
            cache,
            native,
            projection,
            linker,
            copier,
        })
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn mapper(&self) -> &NamespaceMapper {
        &self.mapper
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn allows_federation_writes(&self) -> bool {
        self.copier.allows_federation_writes()
    }

    pub async fn project(&self, path: &RepoPath) -> Result<ResourceView> {
        let path = self.mapper.to_filesystem_path(path)?;
        self.projection.project(&path).await
    }

    pub async fn stat(&self, path: &RepoPath) -> Result<Stat> {
        let path = self.mapper.to_filesystem_path(path)?;
        self.cache.stat(&path).await
    }

    /// `Last-Modified` value for a federated path.
    pub async fn last_modified_header(&self, path: &RepoPath) -> Result<String> {
        Ok(http_date(self.stat(path).await?.last_modified))
    }

    pub async fn resolve_content(&self, id: &RepoPath) -> Result<ByteSource> {
        self.linker.resolve_content(id).await
    }

    /// URI a native resource's content is served from, if it is linked.
    pub async fn external_reference(&self, id: &RepoPath) -> Result<Option<String>> {
        self.linker.external_reference(id).await
    }

    pub async fn copy(
        &self,
        source: RepoPath,
        destination: RepoPath,
        overwrite: bool,
    ) -> Result<CopyOutcome> {
        let request = CopyRequest::resolve(&self.mapper, source, destination, overwrite)?;
        self.copier.copy(&request).await
    }

    /// Point the native resource `id` at the federated resource named by
    /// `uri`. The target is resolved lazily on each read.
    pub async fn link_external_content(&self, id: &RepoPath, uri: &str) -> Result<()> {
        if self.mapper.is_federated(id) {
            return Err(FederationError::invalid_path(
                id.as_str(),
                "only native resources can link to external content",
            ));
        }
        let target = self.mapper.repo_path_from_uri(uri)?;
        if !self.mapper.is_federated(&target) {
            return Err(FederationError::NotFederated(target.to_string()));
        }
        self.native.stat(id).await?;
        self.native
            .link_external_content(id, &self.config.external_content_predicate, uri)
            .await?;
        log::info!("linked {} to {}", id, target);
        Ok(())
    }

    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        log::debug!("{} {}", request.method(), request.target());
        match request {
            Request::Get { target } => self.project(&target).await.map(Response::Resource),
            Request::Head { target } => {
                let stat = self.stat(&target).await?;
                Ok(Response::Headers {
                    kind: stat.kind,
                    size: stat.size,
                    last_modified: http_date(stat.last_modified),
                })
            }
            Request::GetContent { target } => {
                self.resolve_content(&target).await.map(Response::Content)
            }
            Request::Copy {
                target,
                destination,
                overwrite,
            } => self
                .copy(target, destination, overwrite)
                .await
                .map(Response::Copied),
        }
    }
}
