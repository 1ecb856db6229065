//! Response DTOs for the worker control API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::generation::{GenerationSet, GenerationState};
use crate::lifecycle::LifecycleState;

/// Statistics of one stored generation
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    /// Generation name
    pub name: String,
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Lookup hit rate
    pub hit_rate: f64,
}

impl StoreStatus {
    pub fn new(name: impl Into<String>, stats: CacheStats) -> Self {
        Self {
            name: name.into(),
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

/// Response body for the status endpoint (GET /__worker/status)
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatusResponse {
    pub state: LifecycleState,
    /// Generations declared by this worker version
    pub declared: GenerationSet,
    pub static_state: GenerationState,
    pub dynamic_state: GenerationState,
    /// Generations currently served from, if any
    pub serving: Option<GenerationSet>,
    pub open_clients: usize,
    pub stores: Vec<StoreStatus>,
    /// Bytes held across all stores
    pub used_bytes: usize,
}

/// Response body for the message endpoint (POST /__worker/message)
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    /// Whether the message was recognized
    pub recognized: bool,
    /// Lifecycle state after handling the message
    pub state: LifecycleState,
}

/// Response body for the client tracking endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ClientsResponse {
    pub open_clients: usize,
    pub state: LifecycleState,
}

/// Response body for the health endpoint (GET /__worker/health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
