//! Error taxonomy for the federation connector.
//!
//! Every fallible operation in this crate returns [`Result`]. The variants
//! are deliberately coarse: callers branch on them to pick a transport status
//! and to decide whether a retry makes sense. Policy refusals
//! ([`FederationError::UnsupportedDirection`]) must never be retried;
//! [`FederationError::IoFailure`] may be.

use std::io;
use std::path::Path;

use thiserror::Error;

/// Errors surfaced by the mapper, cache, projection, linker and copy operator.
#[derive(Debug, Error)]
pub enum FederationError {
    /// The repository path lies outside every configured mount.
    #[error("path is not federated: {0}")]
    NotFederated(String),

    /// Traversal sequences or otherwise malformed paths.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A stat or read target no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("copy source not found: {0}")]
    SourceNotFound(String),

    #[error("copy destination already exists: {0}")]
    DestinationConflict(String),

    /// Writing into the federation (or creating federation-side ancestors)
    /// while that capability is disabled.
    #[error("unsupported copy direction: {0}")]
    UnsupportedDirection(String),

    /// Underlying filesystem failure not otherwise classified.
    #[error("I/O failure on {path}: {source}")]
    IoFailure {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FederationError>;

impl FederationError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify an `io::Error` raised while touching `path`.
    ///
    /// `NotFound` keeps its own variant so the cache can evict and callers can
    /// answer 404; everything else is an `IoFailure`.
    pub(crate) fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.display().to_string())
        } else {
            Self::IoFailure {
                path: path.display().to_string(),
                source: err,
            }
        }
    }

    /// Same as [`from_io`](Self::from_io) for errors reported against a
    /// repository identity rather than a filesystem path.
    pub(crate) fn from_io_at(id: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(id.to_string())
        } else {
            Self::IoFailure {
                path: id.to_string(),
                source: err,
            }
        }
    }

    /// Transient failures a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IoFailure { .. })
    }

    /// Refusals dictated by configuration rather than by the data.
    pub fn is_policy_refusal(&self) -> bool {
        matches!(self, Self::UnsupportedDirection(_))
    }

    /// Status code a transport layer would answer with.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidPath { .. } => 400,
            Self::UnsupportedDirection(_) => 403,
            Self::NotFederated(_) | Self::NotFound(_) => 404,
            Self::SourceNotFound(_) => 409,
            Self::DestinationConflict(_) => 412,
            Self::IoFailure { .. } | Self::InvalidConfig(_) => 500,
        }
    }
}

impl From<FederationError> for io::Error {
    fn from(err: FederationError) -> Self {
        let kind = match &err {
            FederationError::NotFederated(_)
            | FederationError::NotFound(_)
            | FederationError::SourceNotFound(_) => io::ErrorKind::NotFound,
            FederationError::InvalidPath { .. } => io::ErrorKind::InvalidInput,
            FederationError::DestinationConflict(_) => io::ErrorKind::AlreadyExists,
            FederationError::UnsupportedDirection(_) => io::ErrorKind::PermissionDenied,
            FederationError::InvalidConfig(_) => io::ErrorKind::InvalidData,
            FederationError::IoFailure { source, .. } => source.kind(),
        };
        io::Error::new(kind, err.to_string())
    }
}
