//! CLI configuration: the federation settings plus where the native store
//! lives.
//!
//! ```toml
//! native_root = "/srv/repository"
//! cache_ttl_ms = 1000
//!
//! [[mounts]]
//! prefix = "/files"
//! root = "/srv/federated"
//! ```

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fedfs_core::FederationConfig;
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "FEDFS_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Directory backing the native store.
    pub native_root: PathBuf,
    #[serde(flatten)]
    pub federation: FederationConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> io::Result<Self> {
        let config: CliConfig = toml::from_str(content).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to parse config: {}", e),
            )
        })?;
        if !config.native_root.is_absolute() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "native_root must be absolute: {}",
                    config.native_root.display()
                ),
            ));
        }
        config.federation.validate()?;
        Ok(config)
    }
}

/// `--config` wins over `$FEDFS_CONFIG`.
pub fn config_path(explicit: Option<PathBuf>, env_value: Option<OsString>) -> io::Result<PathBuf> {
    explicit
        .or_else(|| env_value.filter(|v| !v.is_empty()).map(PathBuf::from))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no configuration: pass --config or set {}", CONFIG_ENV),
            )
        })
}
