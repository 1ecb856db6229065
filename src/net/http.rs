//! HTTP network backed by reqwest.
//!
//! Same-origin requests are rebased onto the upstream base URL; cross-origin
//! requests go out unchanged. Final URLs that land on the upstream are mapped
//! back onto the public origin so the same-origin write check sees the URL
//! the page would have seen.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{strip_hop_by_hop, FetchRequest, Network};
use crate::cache::ResponseSnapshot;
use crate::config::Config;
use crate::error::{Result, ShellError};

/// Network that forwards requests to the upstream origin.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
    public_origin: Url,
    upstream: Url,
}

impl HttpNetwork {
    /// Creates a network from the proxy configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_timeout(
            config.public_origin.clone(),
            config.upstream_url.clone(),
            config.fetch_timeout,
        )
    }

    pub fn with_timeout(public_origin: Url, upstream: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| ShellError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            public_origin,
            upstream,
        })
    }

    /// Maps a page-visible URL onto the URL actually fetched.
    fn upstream_url(&self, url: &Url) -> Url {
        if url.origin() != self.public_origin.origin() {
            return url.clone();
        }
        let mut target = self.upstream.clone();
        target.set_path(url.path());
        target.set_query(url.query());
        target
    }

    /// Maps a fetched URL back onto the page-visible origin.
    fn public_url(&self, url: &Url) -> Url {
        if url.origin() != self.upstream.origin() {
            return url.clone();
        }
        let mut public = self.public_origin.clone();
        public.set_path(url.path());
        public.set_query(url.query());
        public
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        let start = Instant::now();
        let target = self.upstream_url(&request.url);

        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);

        let response = self
            .client
            .request(request.method.clone(), target.as_str())
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| ShellError::Network(format!("{} {}: {}", request.method, target, e)))?;

        let status = response.status();
        let final_url = self.public_url(response.url());
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ShellError::Network(format!("reading body of {}: {}", target, e)))?;

        debug!(
            "{} {} -> {} ({} bytes, {}ms)",
            request.method,
            target,
            status.as_u16(),
            body.len(),
            start.elapsed().as_millis()
        );

        Ok(ResponseSnapshot::new(status, headers, body, final_url))
    }
}
