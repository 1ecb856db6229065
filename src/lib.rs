//! Offline Shell - an offline-first caching proxy
//!
//! Gives an installed web app service-worker fetch semantics: network-first
//! with cache fallback, a precached app shell, and versioned cache
//! generations purged at activation.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod models;
pub mod net;
pub mod router;
pub mod strategy;
pub mod tasks;
pub mod worker;

pub use api::AppState;
pub use config::Config;
pub use worker::{FetchDecision, ServiceWorker};
