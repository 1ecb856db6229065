//! Response Strategy Engine
//!
//! Network-first with cache fallback for runtime requests, and the
//! all-or-nothing precache used at install.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::{Origin, Url};

use crate::cache::{RequestKey, ResponseSnapshot, SharedStorage};
use crate::error::{Result, ShellError};
use crate::generation::{CacheGeneration, GenerationSet};
use crate::net::{FetchRequest, Network};
use crate::router::RouteClassification;
use crate::tasks::spawn_cache_write;

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    /// A previously cached entry for the same request
    Cache,
    /// The precached shell document, for an offline navigation
    ShellFallback,
    /// The synthesized 503
    Offline,
}

/// Result of running a strategy for one request.
#[derive(Debug)]
pub struct StrategyOutcome {
    pub response: ResponseSnapshot,
    pub source: ResponseSource,
    /// Detached cache write started for this response, if any
    pub pending_write: Option<JoinHandle<()>>,
}

impl StrategyOutcome {
    fn served(response: ResponseSnapshot, source: ResponseSource) -> Self {
        Self {
            response,
            source,
            pending_write: None,
        }
    }
}

// == Response Strategy Engine ==
#[derive(Clone)]
pub struct ResponseStrategyEngine {
    storage: SharedStorage,
    network: Arc<dyn Network>,
    public_origin: Url,
    origin: Origin,
    navigation_fallback: String,
}

impl ResponseStrategyEngine {
    pub fn new(
        storage: SharedStorage,
        network: Arc<dyn Network>,
        public_origin: Url,
        navigation_fallback: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            network,
            origin: public_origin.origin(),
            public_origin,
            navigation_fallback: navigation_fallback.into(),
        }
    }

    // == Network First ==
    /// Tries the network; any response it returns wins, whatever its status.
    ///
    /// A 200 same-origin response is written to the dynamic generation by a
    /// detached task. When the network rejects, the cache is consulted, then
    /// the shell document for navigations, then a 503 is synthesized.
    pub async fn network_first(
        &self,
        request: &FetchRequest,
        route: RouteClassification,
        generations: &GenerationSet,
    ) -> StrategyOutcome {
        match self.network.fetch(request).await {
            Ok(response) => {
                let pending_write = if route.is_cacheable() && response.is_cacheable_for(&self.origin) {
                    Some(spawn_cache_write(
                        self.storage.clone(),
                        generations.dynamic_gen.clone(),
                        request.key(),
                        response.clone(),
                    ))
                } else {
                    None
                };

                StrategyOutcome {
                    response,
                    source: ResponseSource::Network,
                    pending_write,
                }
            }
            Err(e) => {
                debug!("Network failed for {}: {}", request.url, e);
                self.fallback(request, route, generations).await
            }
        }
    }

    async fn fallback(
        &self,
        request: &FetchRequest,
        route: RouteClassification,
        generations: &GenerationSet,
    ) -> StrategyOutcome {
        let key = request.key();
        // Shell assets prefer the installed copy; everything else the runtime copy.
        let lookup_order = match route {
            RouteClassification::Precache => [&generations.static_gen, &generations.dynamic_gen],
            _ => [&generations.dynamic_gen, &generations.static_gen],
        };

        let storage = self.storage.read().await;
        for generation in lookup_order {
            if let Some(cached) = storage.match_in(generation.as_str(), &key) {
                debug!("Serving {} from {} (stored {})", key, generation, cached.stored_at);
                return StrategyOutcome::served(cached, ResponseSource::Cache);
            }
        }

        if request.is_navigation() {
            if let Some(shell) = self.shell_key().and_then(|shell_key| {
                storage.match_in(generations.static_gen.as_str(), &shell_key)
            }) {
                debug!("Serving shell fallback for navigation to {}", request.url);
                return StrategyOutcome::served(shell, ResponseSource::ShellFallback);
            }
        }

        debug!("No cached entry for {}, responding offline", key);
        StrategyOutcome::served(ResponseSnapshot::offline(), ResponseSource::Offline)
    }

    fn shell_key(&self) -> Option<RequestKey> {
        self.public_origin
            .join(&self.navigation_fallback)
            .ok()
            .map(|url| RequestKey::get(&url))
    }

    // == Precache ==
    /// Fetches every manifest path in order and commits them to the static
    /// generation in one batch. Any unfetchable or non-2xx asset aborts the
    /// whole install and leaves the storage untouched.
    ///
    /// Returns the number of entries written.
    pub async fn precache(&self, manifest: &[String], generation: &CacheGeneration) -> Result<usize> {
        let mut entries = Vec::with_capacity(manifest.len());

        for path in manifest {
            let url = self.public_origin.join(path).map_err(|e| ShellError::InstallFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let request = FetchRequest::get(url);

            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| ShellError::InstallFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

            if !response.status.is_success() {
                return Err(ShellError::InstallFailed {
                    path: path.clone(),
                    reason: format!("status {}", response.status.as_u16()),
                });
            }
            entries.push((request.key(), response));
        }

        let count = entries.len();
        self.storage
            .write()
            .await
            .put_all(generation.as_str(), entries)
            .map_err(|e| ShellError::InstallFailed {
                path: generation.to_string(),
                reason: e.to_string(),
            })?;

        info!("Precached {} shell assets into {}", count, generation);
        Ok(count)
    }
}
