//! Network Module
//!
//! The intercepted request model and the network the worker fetches through.
//! The [`Network`] trait is the seam between the strategy engine and the
//! real upstream, so strategies can be exercised against a scripted network.

mod http;
mod request;

use async_trait::async_trait;
use axum::http::HeaderMap;

pub use http::HttpNetwork;
pub use request::{FetchRequest, RequestMode};

use crate::cache::ResponseSnapshot;
use crate::error::Result;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-authorization",
    "proxy-authenticate",
    "host",
    "content-length",
];

/// Removes connection-scoped headers before a request or response crosses the proxy.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

// == Network Trait ==
/// Anything the worker can fetch through.
///
/// A rejected fetch (offline, DNS failure, timeout) is `Err(ShellError::Network)`.
/// Any response the server produced, whatever its status, is `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot>;
}
