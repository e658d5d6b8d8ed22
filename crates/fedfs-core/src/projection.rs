//! Resource views over federated directories and files.
//!
//! A projection is rebuilt from the metadata cache on every call; it is never
//! cached itself, so its freshness is exactly the cache's.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::MetadataCache;
use crate::error::{FederationError, Result};
use crate::mount::FederatedPath;
use crate::path::RepoPath;
use crate::types::ResourceKind;

/// Format used for `Last-Modified` (RFC 7231 IMF-fixdate).
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Render a timestamp as an HTTP date, truncated to whole seconds.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// A direct child as listed in its container's view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildRef {
    pub name: String,
    pub path: RepoPath,
    pub kind: ResourceKind,
}

/// The repository-facing shape of a federated path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceView {
    pub path: RepoPath,
    pub kind: ResourceKind,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    /// Listing order of the underlying directory; empty for binaries.
    pub children: Vec<ChildRef>,
}

impl ResourceView {
    /// Semantic types of this resource. Only container/binary types are ever
    /// reported; connector bookkeeping never leaks into the graph.
    pub fn rdf_types(&self) -> &'static [&'static str] {
        self.kind.type_uris()
    }

    pub fn last_modified_header(&self) -> String {
        http_date(self.last_modified)
    }

    pub fn child(&self, name: &str) -> Option<&ChildRef> {
        self.children.iter().find(|c| c.name == name)
    }
}

pub struct ProjectionEngine {
    cache: Arc<MetadataCache>,
}

impl ProjectionEngine {
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self { cache }
    }

    /// Build the view of `path`: one cached stat for the node and, for a
    /// container, one cached stat per listed child to classify it.
    ///
    /// Children deleted between the listing and their stat are left out.
    pub async fn project(&self, path: &FederatedPath) -> Result<ResourceView> {
        let entry = self.cache.entry(path).await?;
        let stat = entry.stat();
        let mut children = Vec::with_capacity(entry.children().len());
        for name in entry.children() {
            let child = path.child(name)?;
            match self.cache.stat(&child).await {
                Ok(child_stat) => children.push(ChildRef {
                    name: name.clone(),
                    path: child.repo_path().clone(),
                    kind: child_stat.kind,
                }),
                Err(FederationError::NotFound(_)) => {
                    log::warn!("{} vanished while projecting", child.repo_path());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ResourceView {
            path: path.repo_path().clone(),
            kind: stat.kind,
            last_modified: stat.last_modified,
            size: stat.size,
            children,
        })
    }
}
