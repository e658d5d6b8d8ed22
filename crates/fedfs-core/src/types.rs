//! Data types shared across the crate.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Boxed, Send future: the return type for collaborator trait methods.
///
/// Boxing keeps `FileSystem` and `NativeStore` dyn-compatible so components
/// can hold `Arc<dyn ...>` and tests can swap in wrappers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Streaming content handle. Readers pull bytes incrementally; nothing
/// requires the whole resource to sit in memory.
pub type ByteSource = Pin<Box<dyn AsyncRead + Send>>;

pub const LDP_CONTAINER: &str = "http://www.w3.org/ns/ldp#Container";
pub const LDP_BASIC_CONTAINER: &str = "http://www.w3.org/ns/ldp#BasicContainer";
pub const LDP_NON_RDF_SOURCE: &str = "http://www.w3.org/ns/ldp#NonRDFSource";

/// Semantic kind of a resource: a directory projects to a container, a file
/// to a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Container,
    Binary,
}

impl ResourceKind {
    /// The RDF types a transport layer may publish for this kind.
    pub fn type_uris(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Container => &[LDP_CONTAINER, LDP_BASIC_CONTAINER],
            ResourceKind::Binary => &[LDP_NON_RDF_SOURCE],
        }
    }

    pub fn is_container(self) -> bool {
        self == ResourceKind::Container
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Container => write!(f, "container"),
            ResourceKind::Binary => write!(f, "binary"),
        }
    }
}
