//! Repository path newtype: the only way to address a resource.
//!
//! `RepoPath` is an opaque string validated on construction. It rejects `..`,
//! `.`, empty segments, backslashes and null bytes, so nothing built from it
//! can climb out of a mount root once it is joined onto a filesystem path.
//! OS `PathBuf` values never appear in the resource API; the namespace mapper
//! translates between the two.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};

/// Opaque path within the repository namespace.
///
/// Invariants (enforced at construction):
/// - Starts with `/`
/// - No `.` or `..` components
/// - No `//` sequences
/// - No null bytes or backslashes
/// - No trailing `/` (except root `/`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Create a new repository path, validating all invariants.
    pub fn new(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(FederationError::invalid_path(path, "path cannot be empty"));
        }
        if !path.starts_with('/') {
            return Err(FederationError::invalid_path(path, "path must start with '/'"));
        }
        if path.contains('\0') {
            return Err(FederationError::invalid_path(
                path.replace('\0', "\\0"),
                "path cannot contain null bytes",
            ));
        }
        if path.contains('\\') {
            return Err(FederationError::invalid_path(path, "path cannot contain '\\'"));
        }
        if path != "/" && path.ends_with('/') {
            return Err(FederationError::invalid_path(path, "trailing slash"));
        }
        if path.contains("//") {
            return Err(FederationError::invalid_path(path, "empty path segment"));
        }
        if path.split('/').any(|c| c == "." || c == "..") {
            return Err(FederationError::invalid_path(
                path,
                "'.' and '..' segments are not allowed",
            ));
        }
        Ok(Self(path.to_string()))
    }

    /// The repository root `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Parent path, or `None` if this is the root.
    pub fn parent(&self) -> Option<RepoPath> {
        if self.is_root() {
            return None;
        }
        // slicing a validated path always yields a valid path
        match self.0.rfind('/') {
            Some(0) => Some(RepoPath::root()),
            Some(pos) => Some(RepoPath(self.0[..pos].to_string())),
            None => None,
        }
    }

    /// Final component of the path, or `None` for root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Path segments, root yields none.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Join a relative path onto this path.
    ///
    /// The segment must not be empty, start with `/`, or contain `.`/`..`.
    pub fn join(&self, segment: &str) -> Result<RepoPath> {
        if segment.is_empty() {
            return Err(FederationError::invalid_path(segment, "empty join segment"));
        }
        if segment.starts_with('/') {
            return Err(FederationError::invalid_path(
                segment,
                "join segment must be relative",
            ));
        }
        let combined = if self.is_root() {
            format!("/{}", segment)
        } else {
            format!("{}/{}", self.0, segment)
        };
        RepoPath::new(&combined)
    }

    /// Segment-aware prefix test: `/files` is a prefix of `/files/a` but not
    /// of `/filesystem`.
    pub fn starts_with(&self, prefix: &RepoPath) -> bool {
        self.strip_prefix(prefix).is_some()
    }

    /// The remainder after `prefix` without a leading slash; empty when the
    /// paths are equal.
    pub fn strip_prefix(&self, prefix: &RepoPath) -> Option<&str> {
        if prefix.is_root() {
            return Some(&self.0[1..]);
        }
        let rest = self.0.strip_prefix(prefix.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RepoPath {
    type Error = FederationError;

    fn try_from(value: String) -> Result<Self> {
        RepoPath::new(&value)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}
