//! Transport-neutral requests and responses.
//!
//! A transport (HTTP, the CLI) turns its input into a [`Request`], hands it
//! to [`Federation::dispatch`](crate::Federation::dispatch) and renders the
//! [`Response`], or the error's [`status`](crate::FederationError::status).

use std::fmt;

use crate::copy::CopyOutcome;
use crate::path::RepoPath;
use crate::projection::ResourceView;
use crate::types::{ByteSource, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// The projected view of a federated resource.
    Get { target: RepoPath },
    /// Headers only: kind, size and `Last-Modified`.
    Head { target: RepoPath },
    /// Content bytes, following an external-content link if present.
    GetContent { target: RepoPath },
    /// Copy `target` to `destination` across the federation boundary.
    Copy {
        target: RepoPath,
        destination: RepoPath,
        overwrite: bool,
    },
}

impl Request {
    pub fn target(&self) -> &RepoPath {
        match self {
            Request::Get { target }
            | Request::Head { target }
            | Request::GetContent { target }
            | Request::Copy { target, .. } => target,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::Get { .. } | Request::GetContent { .. } => "GET",
            Request::Head { .. } => "HEAD",
            Request::Copy { .. } => "COPY",
        }
    }
}

pub enum Response {
    Resource(ResourceView),
    Headers {
        kind: ResourceKind,
        size: u64,
        last_modified: String,
    },
    Content(ByteSource),
    Copied(CopyOutcome),
}

impl Response {
    pub fn status(&self) -> u16 {
        match self {
            Response::Copied(outcome) => outcome.status(),
            _ => 200,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Resource(view) => f.debug_tuple("Resource").field(view).finish(),
            Response::Headers {
                kind,
                size,
                last_modified,
            } => f
                .debug_struct("Headers")
                .field("kind", kind)
                .field("size", size)
                .field("last_modified", last_modified)
                .finish(),
            Response::Content(_) => f.write_str("Content(..)"),
            Response::Copied(outcome) => f.debug_tuple("Copied").field(outcome).finish(),
        }
    }
}
