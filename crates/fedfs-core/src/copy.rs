//! Copies across the federation boundary.
//!
//! Federation to native is always allowed. Native to federation is refused
//! unless `allow_federation_writes` is set, and even then never creates
//! federation-side ancestors. Same-side copies are not this module's job.
//!
//! Both directions assemble the destination under a hidden staging sibling
//! and rename it into place, so the destination is either absent (or still
//! the old resource) or complete. Failed or cancelled copies remove their
//! staging entry.

use std::fmt;
use std::sync::Arc;

use crate::cache::{MetadataCache, Stat};
use crate::error::{FederationError, Result};
use crate::fs::{FileSystem, StagingGuard, staging_name};
use crate::mount::{FederatedPath, NamespaceMapper};
use crate::native::{EBUCORE_FILENAME, NativeMetadata, NativeStore, PREMIS_HAS_SIZE};
use crate::path::RepoPath;
use crate::types::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FederationToNative,
    NativeToFederation,
}

impl Direction {
    /// Direction of a copy given which side each end lives on.
    pub fn between(source_federated: bool, destination_federated: bool) -> Result<Self> {
        match (source_federated, destination_federated) {
            (true, false) => Ok(Self::FederationToNative),
            (false, true) => Ok(Self::NativeToFederation),
            (true, true) => Err(FederationError::UnsupportedDirection(
                "copies within the federation are not supported".to_string(),
            )),
            (false, false) => Err(FederationError::UnsupportedDirection(
                "copies between native resources belong to the native store".to_string(),
            )),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FederationToNative => write!(f, "federation -> native"),
            Self::NativeToFederation => write!(f, "native -> federation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: RepoPath,
    pub destination: RepoPath,
    pub direction: Direction,
    /// Replace an existing destination instead of failing.
    pub overwrite: bool,
}

impl CopyRequest {
    /// Classify a copy between two repository paths.
    pub fn resolve(
        mapper: &NamespaceMapper,
        source: RepoPath,
        destination: RepoPath,
        overwrite: bool,
    ) -> Result<Self> {
        let direction =
            Direction::between(mapper.is_federated(&source), mapper.is_federated(&destination))?;
        Ok(Self {
            source,
            destination,
            direction,
            overwrite,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Created(RepoPath),
    Replaced(RepoPath),
}

impl CopyOutcome {
    fn new(destination: RepoPath, existed: bool) -> Self {
        if existed {
            Self::Replaced(destination)
        } else {
            Self::Created(destination)
        }
    }

    pub fn destination(&self) -> &RepoPath {
        match self {
            Self::Created(p) | Self::Replaced(p) => p,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Created(_) => 201,
            Self::Replaced(_) => 204,
        }
    }
}

/// Staged native resource, removed unless published.
///
/// The native store is async, so a drop outside an explicit `discard` (a
/// cancelled copy) hands the removal to the runtime.
struct NativeStaging {
    native: Arc<dyn NativeStore>,
    id: RepoPath,
    armed: bool,
}

impl NativeStaging {
    fn new(native: Arc<dyn NativeStore>, id: RepoPath) -> Self {
        Self {
            native,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    async fn discard(mut self) {
        self.armed = false;
        remove_staged(self.native.as_ref(), &self.id).await;
    }
}

impl Drop for NativeStaging {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let native = self.native.clone();
                let id = self.id.clone();
                handle.spawn(async move { remove_staged(native.as_ref(), &id).await });
            }
            Err(_) => log::warn!("staged copy {} left behind: no runtime to remove it", self.id),
        }
    }
}

async fn remove_staged(native: &dyn NativeStore, id: &RepoPath) {
    match native.remove(id).await {
        Ok(()) | Err(FederationError::NotFound(_)) => {}
        Err(e) => log::warn!("failed to remove staged copy {}: {}", id, e),
    }
}

fn source_missing(err: FederationError) -> FederationError {
    match err {
        FederationError::NotFound(path) => FederationError::SourceNotFound(path),
        other => other,
    }
}

fn wrong_side(err: FederationError, expected: &str) -> FederationError {
    match err {
        FederationError::NotFederated(path) => {
            FederationError::UnsupportedDirection(format!("{} is not {}", path, expected))
        }
        other => other,
    }
}

pub struct CopyOperator {
    mapper: Arc<NamespaceMapper>,
    cache: Arc<MetadataCache>,
    fs: Arc<dyn FileSystem>,
    native: Arc<dyn NativeStore>,
    allow_federation_writes: bool,
}

impl CopyOperator {
    pub fn new(
        mapper: Arc<NamespaceMapper>,
        cache: Arc<MetadataCache>,
        fs: Arc<dyn FileSystem>,
        native: Arc<dyn NativeStore>,
        allow_federation_writes: bool,
    ) -> Self {
        Self {
            mapper,
            cache,
            fs,
            native,
            allow_federation_writes,
        }
    }

    pub fn allows_federation_writes(&self) -> bool {
        self.allow_federation_writes
    }

    pub async fn copy(&self, request: &CopyRequest) -> Result<CopyOutcome> {
        log::info!(
            "copy {} -> {} ({})",
            request.source,
            request.destination,
            request.direction
        );
        let result = match request.direction {
            Direction::FederationToNative => self.copy_into_native(request).await,
            Direction::NativeToFederation => self.copy_into_federation(request).await,
        };
        match &result {
            Ok(outcome) => log::info!("copy to {} done ({})", outcome.destination(), outcome.status()),
            Err(e) if e.is_policy_refusal() => log::info!("copy refused: {}", e),
            Err(e) => log::warn!("copy {} -> {} failed: {}", request.source, request.destination, e),
        }
        result
    }

    async fn copy_into_native(&self, request: &CopyRequest) -> Result<CopyOutcome> {
        let source = self
            .mapper
            .to_filesystem_path(&request.source)
            .map_err(|e| wrong_side(e, "federated"))?;
        let destination = &request.destination;
        if self.mapper.is_federated(destination) {
            return Err(FederationError::UnsupportedDirection(format!(
                "{} is federated",
                destination
            )));
        }
        let (Some(parent), Some(name)) = (destination.parent(), destination.file_name()) else {
            return Err(FederationError::invalid_path(
                destination.as_str(),
                "cannot copy onto the repository root",
            ));
        };

        let stat = self.cache.stat(&source).await.map_err(source_missing)?;
        let existed = match self.native.stat(destination).await {
            Ok(_) => true,
            Err(FederationError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        if existed && !request.overwrite {
            return Err(FederationError::DestinationConflict(destination.to_string()));
        }

        self.native.create_container(&parent).await?;
        let staging = NativeStaging::new(self.native.clone(), parent.join(&staging_name(name))?);
        let published = async {
            self.build_native(&source, stat, &staging.id).await?;
            if existed {
                self.native.remove(destination).await?;
            }
            self.native.rename(&staging.id, destination).await
        }
        .await;
        match published {
            Ok(()) => staging.disarm(),
            Err(e) => {
                staging.discard().await;
                return Err(e);
            }
        }
        Ok(CopyOutcome::new(destination.clone(), existed))
    }

    /// Mirror the federated tree at `source` into the native store at `target`.
    async fn build_native(&self, source: &FederatedPath, stat: Stat, target: &RepoPath) -> Result<()> {
        let mut pending = vec![(source.clone(), stat, target.clone())];
        while let Some((from, stat, to)) = pending.pop() {
            if stat.is_directory() {
                self.native.create_container(&to).await?;
                let names = self.cache.list_children(&from).await.map_err(source_missing)?;
                for name in names {
                    let child = from.child(&name)?;
                    let child_stat = self.cache.stat(&child).await.map_err(source_missing)?;
                    pending.push((child, child_stat, to.join(&name)?));
                }
                continue;
            }

            let data = self
                .fs
                .open(from.fs_path())
                .await
                .map_err(|e| source_missing(FederationError::from_io(from.fs_path(), e)))?;
            self.native.write(&to, data).await?;
            let written = self.native.stat(&to).await?;
            if let Some(filename) = from.repo_path().file_name() {
                self.native.set_property(&to, EBUCORE_FILENAME, filename).await?;
            }
            self.native
                .set_property(&to, PREMIS_HAS_SIZE, &written.size.to_string())
                .await?;
            log::debug!("copied {} ({} bytes)", from.repo_path(), written.size);
        }
        Ok(())
    }

    async fn copy_into_federation(&self, request: &CopyRequest) -> Result<CopyOutcome> {
        if !self.allow_federation_writes {
            return Err(FederationError::UnsupportedDirection(
                "writes into the federation are disabled".to_string(),
            ));
        }
        let destination = self
            .mapper
            .to_filesystem_path(&request.destination)
            .map_err(|e| wrong_side(e, "federated"))?;
        if self.mapper.is_federated(&request.source) {
            return Err(FederationError::UnsupportedDirection(format!(
                "{} is federated",
                request.source
            )));
        }
        let (Some(parent), Some(name)) = (destination.parent(), destination.name()) else {
            return Err(FederationError::UnsupportedDirection(format!(
                "{} is a mount root",
                destination.repo_path()
            )));
        };

        let meta = self
            .native
            .stat(&request.source)
            .await
            .map_err(source_missing)?;
        match self.cache.stat(&parent).await {
            Ok(stat) if stat.is_directory() => {}
            Ok(_) => {
                return Err(FederationError::invalid_path(
                    parent.repo_path().as_str(),
                    "not a directory",
                ));
            }
            Err(FederationError::NotFound(_)) => {
                return Err(FederationError::UnsupportedDirection(format!(
                    "{} does not exist and federation directories are never created implicitly",
                    parent.repo_path()
                )));
            }
            Err(e) => return Err(e),
        }
        let existed = match self.fs.stat(destination.fs_path()).await {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(FederationError::from_io(destination.fs_path(), e)),
        };
        if existed && !request.overwrite {
            return Err(FederationError::DestinationConflict(
                destination.repo_path().to_string(),
            ));
        }

        let staged = destination.sibling(&staging_name(name))?;
        let guard = StagingGuard::new(staged.fs_path().to_path_buf());
        self.build_federated(&request.source, meta, &staged).await?;
        if existed {
            self.fs
                .remove(destination.fs_path())
                .await
                .map_err(|e| FederationError::from_io(destination.fs_path(), e))?;
        }
        self.fs
            .rename(staged.fs_path(), destination.fs_path())
            .await
            .map_err(|e| FederationError::from_io(destination.fs_path(), e))?;
        guard.disarm();

        self.cache.invalidate(&destination);
        self.cache.invalidate_ancestors(&destination);
        Ok(CopyOutcome::new(destination.repo_path().clone(), existed))
    }

    /// Mirror the native tree at `source` into the federated `target`.
    async fn build_federated(
        &self,
        source: &RepoPath,
        meta: NativeMetadata,
        target: &FederatedPath,
    ) -> Result<()> {
        let mut pending = vec![(source.clone(), meta.kind, target.clone())];
        while let Some((from, kind, to)) = pending.pop() {
            match kind {
                ResourceKind::Binary => {
                    let data = self.native.read(&from).await.map_err(source_missing)?;
                    let written = self
                        .fs
                        .write_atomic(to.fs_path(), data)
                        .await
                        .map_err(|e| FederationError::from_io(to.fs_path(), e))?;
                    log::debug!("copied {} ({} bytes)", from, written);
                }
                ResourceKind::Container => {
                    self.fs
                        .create_dir(to.fs_path())
                        .await
                        .map_err(|e| FederationError::from_io(to.fs_path(), e))?;
                    for name in self.native.children(&from).await.map_err(source_missing)? {
                        let child = from.join(&name)?;
                        let child_meta = self.native.stat(&child).await.map_err(source_missing)?;
                        pending.push((child, child_meta.kind, to.child(&name)?));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fs::LocalFileSystem;
    use crate::native::LocalNativeStore;
    use crate::test_support::{CountingFileSystem, Fixture};
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::sync::Notify;

    struct Setup {
        fx: Fixture,
        native_dir: TempDir,
        native: Arc<LocalNativeStore>,
        cache: Arc<MetadataCache>,
        operator: CopyOperator,
    }

    fn setup_with(fs: Arc<dyn FileSystem>, allow_federation_writes: bool) -> Setup {
        let fx = Fixture::new();
        let native_dir = TempDir::new().unwrap();
        let native = Arc::new(LocalNativeStore::new(native_dir.path()));
        let cache = Arc::new(MetadataCache::new(
            fs.clone(),
            ManualClock::shared(),
            Duration::from_secs(10),
        ));
        let operator = CopyOperator::new(
            Arc::new(fx.mapper().clone()),
            cache.clone(),
            fs,
            native.clone(),
            allow_federation_writes,
        );
        Setup {
            fx,
            native_dir,
            native,
            cache,
            operator,
        }
    }

    fn setup(allow_federation_writes: bool) -> Setup {
        setup_with(Arc::new(LocalFileSystem::new()), allow_federation_writes)
    }

    fn id(raw: &str) -> RepoPath {
        RepoPath::new(raw).unwrap()
    }

    impl Setup {
        fn request(&self, source: &str, destination: &str, overwrite: bool) -> CopyRequest {
            CopyRequest::resolve(self.fx.mapper(), id(source), id(destination), overwrite).unwrap()
        }

        async fn copy(&self, source: &str, destination: &str) -> Result<CopyOutcome> {
            self.operator.copy(&self.request(source, destination, false)).await
        }

        async fn native_text(&self, raw: &str) -> String {
            let mut out = String::new();
            self.native
                .read(&id(raw))
                .await
                .unwrap()
                .read_to_string(&mut out)
                .await
                .unwrap();
            out
        }

        async fn native_object(&self, raw: &str, body: &'static [u8]) {
            self.native
                .write(&id(raw), Box::pin(Cursor::new(body)))
                .await
                .unwrap();
        }

        /// Raw directory entries under the native root, bookkeeping included.
        fn native_entries(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.native_dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect();
            names.sort();
            names
        }
    }

    #[test]
    fn test_direction_between_sides() {
        assert_eq!(
            Direction::between(true, false).unwrap(),
            Direction::FederationToNative
        );
        assert_eq!(
            Direction::between(false, true).unwrap(),
            Direction::NativeToFederation
        );
        assert!(Direction::between(true, true).unwrap_err().is_policy_refusal());
        assert!(Direction::between(false, false).unwrap_err().is_policy_refusal());
    }

    #[tokio::test]
    async fn test_federated_binary_copied_into_native() {
        let s = setup(false);
        s.fx.write("ds1", b"abc123");

        let outcome = s.copy("/files/ds1", "/objects/copy").await.unwrap();
        assert_eq!(outcome, CopyOutcome::Created(id("/objects/copy")));
        assert_eq!(outcome.status(), 201);
        assert_eq!(s.native_text("/objects/copy").await, "abc123");

        let props = s.native.properties(&id("/objects/copy")).await.unwrap();
        let value = |p: &str| props.iter().find(|x| x.predicate == p).map(|x| x.object.as_str());
        assert_eq!(value(EBUCORE_FILENAME), Some("ds1"));
        assert_eq!(value(PREMIS_HAS_SIZE), Some("6"));
        // source untouched
        assert_eq!(std::fs::read(s.fx.fs_path("ds1")).unwrap(), b"abc123");
    }

    #[tokio::test]
    async fn test_federated_directory_copied_recursively() {
        let s = setup(false);
        s.fx.mkdir("FileSystem1");
        s.fx.write("FileSystem1/ds1", b"abc123");
        s.fx.write("FileSystem1/ds2", b"xyz");
        s.fx.mkdir("FileSystem1/TestSubdir");
        s.fx.write("FileSystem1/TestSubdir/nested", b"deep");

        s.copy("/files/FileSystem1", "/fs1").await.unwrap();

        assert_eq!(
            s.native.children(&id("/fs1")).await.unwrap(),
            vec!["TestSubdir", "ds1", "ds2"]
        );
        assert_eq!(s.native_text("/fs1/ds2").await, "xyz");
        assert_eq!(s.native_text("/fs1/TestSubdir/nested").await, "deep");
        assert_eq!(s.native_entries(), vec!["fs1"]);
    }

    #[tokio::test]
    async fn test_existing_destination_conflicts_without_overwrite() {
        let s = setup(false);
        s.fx.write("ds1", b"abc123");
        s.native_object("/taken", b"original").await;

        let err = s.copy("/files/ds1", "/taken").await.unwrap_err();
        assert!(matches!(err, FederationError::DestinationConflict(_)));
        assert_eq!(err.status(), 412);
        assert_eq!(s.native_text("/taken").await, "original");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_destination() {
        let s = setup(false);
        s.fx.write("ds1", b"abc123");
        s.native_object("/taken", b"original").await;

        let outcome = s
            .operator
            .copy(&s.request("/files/ds1", "/taken", true))
            .await
            .unwrap();
        assert_eq!(outcome, CopyOutcome::Replaced(id("/taken")));
        assert_eq!(outcome.status(), 204);
        assert_eq!(s.native_text("/taken").await, "abc123");
    }

    #[tokio::test]
    async fn test_missing_source_is_source_not_found() {
        let s = setup(false);
        let err = s.copy("/files/nope", "/dst").await.unwrap_err();
        assert!(matches!(err, FederationError::SourceNotFound(_)));
        assert_eq!(err.status(), 409);
        assert!(s.native_entries().is_empty());
    }

    #[tokio::test]
    async fn test_write_into_federation_disabled() {
        let s = setup(false);
        s.native_object("/obj", b"native").await;

        let err = s.copy("/obj", "/files/obj").await.unwrap_err();
        assert!(matches!(err, FederationError::UnsupportedDirection(_)));
        assert!(!s.fx.fs_path("obj").exists());
        assert!(std::fs::read_dir(s.fx.fs_path("")).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_write_into_federation_when_enabled() {
        let s = setup(true);
        s.fx.mkdir("in");
        s.native.create_container(&id("/tree/sub")).await.unwrap();
        s.native_object("/tree/a", b"a").await;
        s.native_object("/tree/sub/b", b"b").await;

        // cached listing taken before the copy
        let inbox = s.fx.path("/files/in");
        assert!(s.cache.list_children(&inbox).await.unwrap().is_empty());

        let outcome = s.copy("/tree", "/files/in/tree").await.unwrap();
        assert_eq!(outcome.status(), 201);
        assert_eq!(std::fs::read(s.fx.fs_path("in/tree/sub/b")).unwrap(), b"b");
        assert_eq!(s.cache.list_children(&inbox).await.unwrap(), vec!["tree"]);
    }

    #[tokio::test]
    async fn test_federation_ancestors_are_never_created() {
        let s = setup(true);
        s.native_object("/obj", b"native").await;
        let err = s.copy("/obj", "/files/missing/obj").await.unwrap_err();
        assert!(err.is_policy_refusal());
        assert!(!s.fx.fs_path("missing").exists());
    }

    #[tokio::test]
    async fn test_mount_root_cannot_be_replaced() {
        let s = setup(true);
        s.native_object("/obj", b"native").await;
        let err = s
            .operator
            .copy(&s.request("/obj", "/files", true))
            .await
            .unwrap_err();
        assert!(err.is_policy_refusal());
    }

    #[tokio::test]
    async fn test_mislabelled_direction_is_refused() {
        let s = setup(true);
        s.fx.write("ds1", b"abc");
        let request = CopyRequest {
            source: id("/files/ds1"),
            destination: id("/files/ds2"),
            direction: Direction::FederationToNative,
            overwrite: false,
        };
        let err = s.operator.copy(&request).await.unwrap_err();
        assert!(err.is_policy_refusal());
        assert!(!s.fx.fs_path("ds2").exists());
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_no_partial_destination() {
        let s = setup_with(Arc::new(CountingFileSystem::failing_open("broken")), false);
        s.fx.mkdir("d");
        s.fx.write("d/ok", b"ok");
        s.fx.write("d/broken", b"x");

        let err = s.copy("/files/d", "/dst").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(s.native_entries().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_copy_removes_staging() {
        let gate = Arc::new(Notify::new());
        let s = setup_with(
            Arc::new(CountingFileSystem::gated_open("slow", gate.clone())),
            false,
        );
        s.fx.mkdir("d");
        s.fx.write("d/fast", b"f");
        s.fx.write("d/slow", b"s");

        let copy = s.copy("/files/d", "/dst");
        assert!(tokio::time::timeout(Duration::from_millis(200), copy)
            .await
            .is_err());

        for _ in 0..50 {
            if s.native_entries().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(s.native_entries().is_empty());
        assert!(s.native.stat(&id("/dst")).await.is_err());
    }

    impl Setup {
        /// Native `/tree` holding binaries `a` and `b`, plus an empty
        /// federated `in` directory to copy it into.
        async fn native_tree(&self) {
            self.fx.mkdir("in");
            self.native.create_container(&id("/tree")).await.unwrap();
            self.native_object("/tree/a", b"a").await;
            self.native_object("/tree/b", b"b").await;
        }

        /// Raw entries of the federated `in` directory, staging included.
        fn inbox_entries(&self) -> Vec<String> {
            std::fs::read_dir(self.fx.fs_path("in"))
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect()
        }
    }

    #[tokio::test]
    async fn test_failed_copy_into_federation_removes_staging() {
        let s = setup_with(Arc::new(CountingFileSystem::failing_write("a")), true);
        s.native_tree().await;

        let err = s.copy("/tree", "/files/in/tree").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(s.inbox_entries().is_empty());
        assert!(
            s.cache
                .list_children(&s.fx.path("/files/in"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_cancelled_copy_into_federation_removes_staging() {
        let gate = Arc::new(Notify::new());
        let s = setup_with(Arc::new(CountingFileSystem::gated_write("a", gate)), true);
        s.native_tree().await;

        let copy = s.copy("/tree", "/files/in/tree");
        assert!(tokio::time::timeout(Duration::from_millis(200), copy)
            .await
            .is_err());

        // the federation-side guard cleans up synchronously on drop
        assert!(s.inbox_entries().is_empty());
        assert!(!s.fx.fs_path("in/tree").exists());
    }
}

