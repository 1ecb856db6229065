//! Configuration Module
//!
//! Handles loading and managing proxy configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::generation::{CacheGeneration, GenerationSet};

/// Default must-cache shell assets.
pub const DEFAULT_PRECACHE_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/Tech-driven_job_tracking_logo_design-removebg-preview.png",
];

/// Path prefix of the worker's own control endpoints.
pub const CONTROL_PREFIX: &str = "/__worker";

/// Proxy configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Origin the pages see (the worker's own origin)
    pub public_origin: Url,
    /// Base URL same-origin requests are forwarded to
    pub upstream_url: Url,
    /// Static (precache) cache generation
    pub static_generation: String,
    /// Dynamic (runtime) cache generation
    pub dynamic_generation: String,
    /// Ordered shell asset paths fetched at install
    pub precache_manifest: Vec<String>,
    /// Path prefixes that always bypass the cache
    pub api_prefixes: Vec<String>,
    /// Precached document served for offline navigations
    pub navigation_fallback: String,
    /// Network fetch timeout
    pub fetch_timeout: Duration,
    /// Total bytes the cache storage may hold, None = unlimited
    pub storage_quota_bytes: Option<usize>,
    /// Directory the cache stores persist in, None = memory only
    pub cache_dir: Option<PathBuf>,
    /// Adopt the new version as soon as precache completes
    pub skip_waiting_on_install: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `PUBLIC_ORIGIN` - Origin seen by pages (default: http://localhost:3000)
    /// - `UPSTREAM_URL` - Upstream base URL (default: http://localhost:5173)
    /// - `STATIC_GENERATION` - Static cache name (default: jobtracker-v1)
    /// - `DYNAMIC_GENERATION` - Dynamic cache name (default: jobtracker-dynamic-v1)
    /// - `PRECACHE_MANIFEST` - Comma separated shell paths
    /// - `API_PREFIXES` - Comma separated bypass prefixes (default: /api/)
    /// - `NAVIGATION_FALLBACK` - Offline navigation document (default: /index.html)
    /// - `FETCH_TIMEOUT_SECS` - Network timeout in seconds (default: 30)
    /// - `STORAGE_QUOTA_BYTES` - Storage quota in bytes (default: unlimited)
    /// - `CACHE_DIR` - Directory the cache persists in; empty keeps it in
    ///   memory only (default: offline-cache)
    /// - `SKIP_WAITING_ON_INSTALL` - Adopt immediately after install (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: parsed_var("SERVER_PORT").unwrap_or(defaults.server_port),
            public_origin: parsed_var("PUBLIC_ORIGIN").unwrap_or(defaults.public_origin),
            upstream_url: parsed_var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            static_generation: env::var("STATIC_GENERATION")
                .unwrap_or(defaults.static_generation),
            dynamic_generation: env::var("DYNAMIC_GENERATION")
                .unwrap_or(defaults.dynamic_generation),
            precache_manifest: list_var("PRECACHE_MANIFEST")
                .unwrap_or(defaults.precache_manifest),
            api_prefixes: list_var("API_PREFIXES").unwrap_or(defaults.api_prefixes),
            navigation_fallback: env::var("NAVIGATION_FALLBACK")
                .unwrap_or(defaults.navigation_fallback),
            fetch_timeout: parsed_var("FETCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            storage_quota_bytes: parsed_var("STORAGE_QUOTA_BYTES"),
            cache_dir: match env::var("CACHE_DIR") {
                Ok(dir) if dir.trim().is_empty() => None,
                Ok(dir) => Some(PathBuf::from(dir.trim())),
                Err(_) => defaults.cache_dir,
            },
            skip_waiting_on_install: parsed_var("SKIP_WAITING_ON_INSTALL")
                .unwrap_or(defaults.skip_waiting_on_install),
        }
    }

    /// Returns the generation pair declared by this configuration.
    pub fn generations(&self) -> GenerationSet {
        GenerationSet::new(
            CacheGeneration::new(&self.static_generation),
            CacheGeneration::new(&self.dynamic_generation),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            public_origin: Url::parse("http://localhost:3000").expect("valid default origin"),
            upstream_url: Url::parse("http://localhost:5173").expect("valid default upstream"),
            static_generation: "jobtracker-v1".to_string(),
            dynamic_generation: "jobtracker-dynamic-v1".to_string(),
            precache_manifest: DEFAULT_PRECACHE_MANIFEST
                .iter()
                .map(|p| p.to_string())
                .collect(),
            api_prefixes: vec!["/api/".to_string()],
            navigation_fallback: "/index.html".to_string(),
            fetch_timeout: Duration::from_secs(30),
            storage_quota_bytes: None,
            cache_dir: Some(PathBuf::from("offline-cache")),
            skip_waiting_on_install: true,
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn list_var(name: &str) -> Option<Vec<String>> {
    let raw = env::var(name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
