//! Namespace mapping between repository paths and mounted filesystem trees.
//!
//! Each [`Mount`] pairs a repository prefix with an absolute filesystem root.
//! The [`NamespaceMapper`] selects a mount by longest-prefix match and
//! produces a [`FederatedPath`] carrying both views of the location. Mapping
//! is pure string/path work: nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::Url;

use crate::config::FederationConfig;
use crate::error::{FederationError, Result};
use crate::path::RepoPath;

/// A repository prefix projected from a filesystem root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    prefix: RepoPath,
    root: PathBuf,
}

impl Mount {
    pub fn new(prefix: RepoPath, root: PathBuf) -> Self {
        Self { prefix, root }
    }

    pub fn prefix(&self) -> &RepoPath {
        &self.prefix
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A location inside a mount, known both as a repository path and as the
/// absolute filesystem path it resolves to.
///
/// Only the mapper builds these; `parent` and `child` keep both halves in
/// step without re-running the mount lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FederatedPath {
    repo: RepoPath,
    fs: PathBuf,
    mount: usize,
    depth: usize,
}

impl FederatedPath {
    pub fn repo_path(&self) -> &RepoPath {
        &self.repo
    }

    pub fn fs_path(&self) -> &Path {
        &self.fs
    }

    /// Index of the owning mount in the mapper's mount table.
    pub fn mount_index(&self) -> usize {
        self.mount
    }

    pub fn is_mount_root(&self) -> bool {
        self.depth == 0
    }

    pub fn name(&self) -> Option<&str> {
        if self.is_mount_root() {
            None
        } else {
            self.repo.file_name()
        }
    }

    /// The enclosing directory, or `None` at the mount root.
    pub fn parent(&self) -> Option<FederatedPath> {
        if self.is_mount_root() {
            return None;
        }
        Some(FederatedPath {
            repo: self.repo.parent()?,
            fs: self.fs.parent()?.to_path_buf(),
            mount: self.mount,
            depth: self.depth - 1,
        })
    }

    /// Ancestors from the parent up to and including the mount root.
    pub fn ancestors(&self) -> impl Iterator<Item = FederatedPath> {
        std::iter::successors(self.parent(), |p| p.parent())
    }

    /// A direct child of this location.
    pub fn child(&self, name: &str) -> Result<FederatedPath> {
        if name.contains('/') {
            return Err(FederationError::invalid_path(
                name,
                "child name cannot contain '/'",
            ));
        }
        let repo = self.repo.join(name)?;
        Ok(FederatedPath {
            repo,
            fs: self.fs.join(name),
            mount: self.mount,
            depth: self.depth + 1,
        })
    }

    /// Sibling location in the same directory.
    pub(crate) fn sibling(&self, name: &str) -> Result<FederatedPath> {
        let parent = self.parent().ok_or_else(|| {
            FederationError::invalid_path(self.repo.as_str(), "mount root has no siblings")
        })?;
        parent.child(name)
    }
}

/// Translates between repository paths and filesystem paths.
#[derive(Debug, Clone)]
pub struct NamespaceMapper {
    base: Url,
    mounts: Vec<Mount>,
}

impl NamespaceMapper {
    /// Build the mapper from a validated configuration.
    pub fn new(config: &FederationConfig) -> Result<Self> {
        config.validate()?;
        let mounts = config
            .mounts
            .iter()
            .map(|m| Mount::new(m.prefix.clone(), m.root.clone()))
            .collect();
        Ok(Self {
            base: config.base_url()?,
            mounts,
        })
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn mount(&self, path: &FederatedPath) -> &Mount {
        &self.mounts[path.mount]
    }

    fn find_mount(&self, path: &RepoPath) -> Option<(usize, &Mount)> {
        self.mounts
            .iter()
            .enumerate()
            .filter(|(_, m)| path.starts_with(&m.prefix))
            .max_by_key(|(_, m)| m.prefix.as_str().len())
    }

    pub fn is_federated(&self, path: &RepoPath) -> bool {
        self.find_mount(path).is_some()
    }

    /// Map a repository path onto the filesystem.
    ///
    /// Fails with `NotFederated` when no mount covers the path.
    pub fn to_filesystem_path(&self, path: &RepoPath) -> Result<FederatedPath> {
        let (index, mount) = self
            .find_mount(path)
            .ok_or_else(|| FederationError::NotFederated(path.to_string()))?;
        let relative = path.strip_prefix(&mount.prefix).unwrap_or_default();
        let mut fs = mount.root.clone();
        let mut depth = 0;
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            fs.push(segment);
            depth += 1;
        }
        // RepoPath validation already rules this out; keep the check cheap
        // and local in case the invariants ever loosen.
        if !fs.starts_with(&mount.root) {
            return Err(FederationError::invalid_path(
                path.as_str(),
                "escapes the mount root",
            ));
        }
        Ok(FederatedPath {
            repo: path.clone(),
            fs,
            mount: index,
            depth,
        })
    }

    /// Parse and map a raw repository path string.
    ///
    /// Malformed input fails with `InvalidPath` before any mount lookup.
    pub fn resolve(&self, raw: &str) -> Result<FederatedPath> {
        self.to_filesystem_path(&RepoPath::new(raw)?)
    }

    /// Inverse of [`to_filesystem_path`](Self::to_filesystem_path) for an
    /// absolute path under `mount`'s root.
    pub fn to_repo_path(&self, absolute: &Path, mount: &Mount) -> Result<RepoPath> {
        let relative = absolute.strip_prefix(&mount.root).map_err(|_| {
            FederationError::invalid_path(
                absolute.display().to_string(),
                format!("not under mount root {}", mount.root.display()),
            )
        })?;
        let mut repo = mount.prefix.clone();
        for component in relative.components() {
            let Component::Normal(name) = component else {
                return Err(FederationError::invalid_path(
                    absolute.display().to_string(),
                    "non-normal path component",
                ));
            };
            let name = name.to_str().ok_or_else(|| {
                FederationError::invalid_path(absolute.display().to_string(), "not valid UTF-8")
            })?;
            repo = repo.join(name)?;
        }
        Ok(repo)
    }

    /// Absolute URI of a repository path under the configured base URI.
    ///
    /// Each segment is percent-encoded, so `?`, `#` and `%` in names stay
    /// part of the path.
    pub fn to_uri(&self, path: &RepoPath) -> String {
        let mut url = self.base.clone();
        // the base is validated to be hierarchical
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path.segments());
        }
        url.to_string()
    }

    /// Repository path named by an absolute URI under the base URI.
    pub fn repo_path_from_uri(&self, uri: &str) -> Result<RepoPath> {
        let url = Url::parse(uri)
            .map_err(|e| FederationError::invalid_path(uri, format!("not a URI: {}", e)))?;
        let same_origin = url.scheme() == self.base.scheme()
            && url.host_str() == self.base.host_str()
            && url.port_or_known_default() == self.base.port_or_known_default();
        let rest = url
            .path()
            .strip_prefix(self.base.path())
            .filter(|_| same_origin)
            .ok_or_else(|| {
                FederationError::invalid_path(uri, format!("not under base URI {}", self.base))
            })?;
        let mut path = RepoPath::root();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            let decoded = percent_decode_str(segment)
                .decode_utf8()
                .map_err(|_| FederationError::invalid_path(uri, "segment is not UTF-8"))?;
            if decoded.contains('/') {
                return Err(FederationError::invalid_path(uri, "encoded '/' in segment"));
            }
            path = path.join(&decoded)?;
        }
        Ok(path)
    }
}
