//! Generation Manager
//!
//! Tracks the declared static/dynamic cache generations and purges every
//! other stored generation at activation.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::CacheStorage;

// == Cache Generation ==
/// Immutable name of one cache store instance, e.g. `jobtracker-v1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheGeneration(String);

impl CacheGeneration {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The static and dynamic generations of one worker version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSet {
    #[serde(rename = "static")]
    pub static_gen: CacheGeneration,
    #[serde(rename = "dynamic")]
    pub dynamic_gen: CacheGeneration,
}

impl GenerationSet {
    pub fn new(static_gen: CacheGeneration, dynamic_gen: CacheGeneration) -> Self {
        Self {
            static_gen,
            dynamic_gen,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.static_gen.as_str() == name || self.dynamic_gen.as_str() == name
    }
}

/// Per-store-kind generation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    /// Declared but not yet authoritative
    Pending,
    /// Serving
    Active,
}

/// Outcome of one activation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Generation names whose stores were torn down
    pub deleted: Vec<String>,
}

// == Generation Manager ==
#[derive(Debug, Clone)]
pub struct GenerationManager {
    declared: GenerationSet,
    /// Generations of the version serving before this one activates
    previous: Option<GenerationSet>,
    static_state: GenerationState,
    dynamic_state: GenerationState,
}

impl GenerationManager {
    pub fn new(declared: GenerationSet) -> Self {
        Self {
            declared,
            previous: None,
            static_state: GenerationState::Pending,
            dynamic_state: GenerationState::Pending,
        }
    }

    /// Records the generations of the currently serving version.
    pub fn with_previous(mut self, previous: GenerationSet) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn declared(&self) -> &GenerationSet {
        &self.declared
    }

    pub fn states(&self) -> (GenerationState, GenerationState) {
        (self.static_state, self.dynamic_state)
    }

    pub fn is_active(&self) -> bool {
        self.static_state == GenerationState::Active
            && self.dynamic_state == GenerationState::Active
    }

    /// Generations requests are served from: the declared pair once active,
    /// otherwise the previous version's pair if there is one.
    pub fn serving(&self) -> Option<&GenerationSet> {
        if self.is_active() {
            Some(&self.declared)
        } else {
            self.previous.as_ref()
        }
    }

    // == Activate ==
    /// Deletes every stored generation other than the declared pair, opens
    /// the declared stores and records them as the active pair, then marks
    /// both kinds active. Running it again when converged deletes nothing.
    ///
    /// Runtime writes only land in stores that exist, so a write still in
    /// flight for a purged generation cannot bring it back.
    pub fn activate(&mut self, storage: &mut CacheStorage) -> ActivationReport {
        let stale: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|name| !self.declared.contains(name))
            .collect();

        for name in &stale {
            info!("Deleting stale cache generation {}", name);
            storage.delete(name);
        }

        for generation in [&self.declared.static_gen, &self.declared.dynamic_gen] {
            if let Err(e) = storage.open(generation.as_str()) {
                warn!("Failed to open cache generation {}: {}", generation, e);
            }
        }
        if let Err(e) = storage.record_active(&self.declared) {
            warn!("Failed to record active generations: {}", e);
        }

        self.static_state = GenerationState::Active;
        self.dynamic_state = GenerationState::Active;
        self.previous = None;

        ActivationReport { deleted: stale }
    }
}
