//! Native repository store: the collaborator on the other side of a copy.
//!
//! The connector never looks inside the native store; it only uses the
//! narrow [`NativeStore`] interface below. [`LocalNativeStore`] is a
//! directory-backed implementation used by the CLI and the test suite.

pub mod local;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::RepoPath;
use crate::types::{BoxFuture, ByteSource, ResourceKind};

pub use local::LocalNativeStore;

pub const EBUCORE_FILENAME: &str = "http://www.ebu.ch/metadata/ontologies/ebucore/ebucore#filename";
pub const PREMIS_HAS_SIZE: &str = "http://www.loc.gov/premis/rdf/v1#hasSize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeMetadata {
    pub kind: ResourceKind,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// A single predicate/object pair on a resource's relationship graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub predicate: String,
    pub object: String,
}

/// Storage interface of the native repository.
///
/// Missing resources fail with `FederationError::NotFound`. Methods return
/// boxed futures for dyn-compatibility, like [`crate::fs::FileSystem`].
pub trait NativeStore: Send + Sync {
    fn stat<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<NativeMetadata>>;

    fn read<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<ByteSource>>;

    /// Store a binary, replacing any binary already at `id`. Readers never
    /// observe a partially written binary. The parent container must exist.
    fn write<'a>(&'a self, id: &'a RepoPath, data: ByteSource) -> BoxFuture<'a, Result<RepoPath>>;

    /// Create a container and any missing ancestors. Succeeds if it exists.
    fn create_container<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<RepoPath>>;

    /// Child names of a container; empty for a binary.
    fn children<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<Vec<String>>>;

    fn properties<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<Vec<Property>>>;

    /// Set a single-valued property, replacing earlier values of `predicate`.
    fn set_property<'a>(
        &'a self,
        id: &'a RepoPath,
        predicate: &'a str,
        object: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Record the external-content triple `<id> <predicate> <uri>`.
    fn link_external_content<'a>(
        &'a self,
        id: &'a RepoPath,
        predicate: &'a str,
        uri: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        self.set_property(id, predicate, uri)
    }

    /// Move a resource (with its properties and descendants).
    fn rename<'a>(&'a self, from: &'a RepoPath, to: &'a RepoPath) -> BoxFuture<'a, Result<()>>;

    /// Delete a resource and everything below it.
    fn remove<'a>(&'a self, id: &'a RepoPath) -> BoxFuture<'a, Result<()>>;
}
