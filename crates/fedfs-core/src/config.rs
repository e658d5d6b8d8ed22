//! Federation configuration.
//!
//! Loaded once at startup (usually from TOML) and handed to every component
//! at construction. Nothing in the crate reads configuration from ambient
//! global state.
//!
//! ```toml
//! base_uri = "http://localhost:8080/rest"
//! cache_ttl_ms = 1000
//! allow_federation_writes = false
//!
//! [[mounts]]
//! prefix = "/files"
//! root = "/srv/federated"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FederationError, Result};
use crate::path::RepoPath;

/// Predicate that activates external-content resolution.
pub const DEFAULT_EXTERNAL_CONTENT_PREDICATE: &str =
    "http://fedora.info/definitions/v4/repository#hasExternalContent";

fn default_base_uri() -> String {
    "http://localhost:8080/rest".to_string()
}

fn default_cache_ttl_ms() -> u64 {
    1000
}

fn default_external_content_predicate() -> String {
    DEFAULT_EXTERNAL_CONTENT_PREDICATE.to_string()
}

/// A configured association between a repository prefix and a filesystem root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Repository path under which the tree is projected (e.g. `/files`).
    pub prefix: RepoPath,
    /// Absolute filesystem directory backing the mount.
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Absolute URI the repository namespace is served under. External
    /// content URIs are resolved relative to it.
    #[serde(default = "default_base_uri")]
    pub base_uri: String,
    /// How long a cached stat result may be served, in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Whether copies may write into the federated filesystem.
    #[serde(default)]
    pub allow_federation_writes: bool,
    #[serde(default = "default_external_content_predicate")]
    pub external_content_predicate: String,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            base_uri: default_base_uri(),
            cache_ttl_ms: default_cache_ttl_ms(),
            allow_federation_writes: false,
            external_content_predicate: default_external_content_predicate(),
            mounts: Vec::new(),
        }
    }
}

impl FederationConfig {
    /// Single-mount configuration with defaults for everything else.
    pub fn with_mount(prefix: RepoPath, root: impl Into<PathBuf>) -> Self {
        Self {
            mounts: vec![MountConfig {
                prefix,
                root: root.into(),
            }],
            ..Self::default()
        }
    }

    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| FederationError::from_io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FederationConfig = toml::from_str(content).map_err(|e| {
            FederationError::InvalidConfig(format!("failed to parse config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Parsed `base_uri`, always ending in `/` and hierarchical so repository
    /// segments can be appended to its path.
    pub fn base_url(&self) -> Result<Url> {
        let mut base = self.base_uri.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let url = Url::parse(&base).map_err(|e| {
            FederationError::InvalidConfig(format!("invalid base_uri '{}': {}", self.base_uri, e))
        })?;
        if url.cannot_be_a_base() {
            return Err(FederationError::InvalidConfig(format!(
                "base_uri '{}' has no path to extend",
                self.base_uri
            )));
        }
        Ok(url)
    }

    /// Check the invariants the components rely on.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.external_content_predicate.trim().is_empty() {
            return Err(FederationError::InvalidConfig(
                "external_content_predicate cannot be empty".to_string(),
            ));
        }
        if self.mounts.is_empty() {
            return Err(FederationError::InvalidConfig(
                "at least one mount is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for mount in &self.mounts {
            if mount.prefix.is_root() {
                return Err(FederationError::InvalidConfig(
                    "a mount cannot cover the repository root".to_string(),
                ));
            }
            if !mount.root.is_absolute() {
                return Err(FederationError::InvalidConfig(format!(
                    "mount root for {} must be absolute: {}",
                    mount.prefix,
                    mount.root.display()
                )));
            }
            if !seen.insert(mount.prefix.as_str()) {
                return Err(FederationError::InvalidConfig(format!(
                    "duplicate mount prefix: {}",
                    mount.prefix
                )));
            }
        }
        Ok(())
    }
}
