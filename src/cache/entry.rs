//! Response Snapshot Module
//!
//! Defines the immutable, fully-buffered response stored in a cache store.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::{Origin, Url};

use crate::net::strip_hop_by_hop;

/// Body of the synthesized response for unreachable, uncached sub-resources.
pub const OFFLINE_BODY: &str = "Content unavailable offline";

// == Response Snapshot ==
/// A byte-for-byte copy of an HTTP response.
///
/// Cloning is cheap: the body is reference counted.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Final URL after redirects, None for synthesized responses
    pub url: Option<Url>,
    /// When the snapshot was taken; kept across restarts
    pub stored_at: DateTime<Utc>,
}

impl ResponseSnapshot {
    // == Constructor ==
    /// Creates a snapshot of a network response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>, url: Url) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            url: Some(url),
            stored_at: Utc::now(),
        }
    }

    // == Offline ==
    /// Synthesizes the `503 Service Unavailable` plain-text response.
    pub fn offline() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Bytes::from_static(OFFLINE_BODY.as_bytes()),
            url: None,
            stored_at: Utc::now(),
        }
    }

    // == Cacheability ==
    /// Returns true if this response may enter the dynamic store of a
    /// worker running on `origin`: status exactly 200 and same origin.
    pub fn is_cacheable_for(&self, origin: &Origin) -> bool {
        self.status == StatusCode::OK
            && self
                .url
                .as_ref()
                .is_some_and(|url| &url.origin() == origin)
    }

    /// Approximate storage footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        let header_bytes: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        self.body.len() + header_bytes
    }
}

impl IntoResponse for ResponseSnapshot {
    fn into_response(self) -> Response {
        let mut headers = self.headers;
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}
