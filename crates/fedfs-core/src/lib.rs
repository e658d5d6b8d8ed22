//! fedfs-core: projects filesystem trees into a content repository namespace.
//!
//! Directories appear as containers and files as binaries under configured
//! mount prefixes. Native repository resources can point at federated files
//! through an external-content link, and resources can be copied across the
//! boundary.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use fedfs_core::{Federation, FederationConfig, LocalNativeStore, RepoPath};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = FederationConfig::with_mount(RepoPath::new("/files")?, "/srv/federated");
//!     let native = Arc::new(LocalNativeStore::new("/srv/repository"));
//!     let federation = Federation::new(config, native)?;
//!
//!     let view = federation.project(&RepoPath::new("/files/FileSystem1")?).await?;
//!     for child in &view.children {
//!         println!("{} ({})", child.path, child.kind);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod copy;
pub mod error;
mod federation;
pub mod fs;
pub mod linker;
pub mod mount;
pub mod native;
pub mod path;
pub mod projection;
pub mod request;
pub mod types;

pub use federation::Federation;

pub use cache::{MetadataCache, Stat};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{FederationConfig, MountConfig};
pub use copy::{CopyOutcome, CopyRequest, Direction};
pub use error::{FederationError, Result};
pub use fs::{FileSystem, LocalFileSystem};
pub use mount::{FederatedPath, NamespaceMapper};
pub use native::{LocalNativeStore, NativeStore};
pub use path::RepoPath;
pub use projection::{ChildRef, ResourceView, http_date};
pub use request::{Request, Response};
pub use types::{ByteSource, ResourceKind};
