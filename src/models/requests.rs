//! Request DTOs for the worker control API
//!
//! Defines the messages pages post to the worker.

use serde::Deserialize;
use serde_json::Value;

/// Message posted on the cross-context channel (POST /__worker/message)
///
/// Only `{"type": "SKIP_WAITING"}` is recognized. Anything else, including
/// bodies that are not JSON objects, is `Unrecognized` and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Adopt the waiting version now
    SkipWaiting,
    #[serde(other)]
    Unrecognized,
}

impl WorkerMessage {
    /// Parses a message from raw body bytes.
    pub fn from_slice(body: &[u8]) -> Self {
        serde_json::from_slice::<Value>(body)
            .ok()
            .map_or(WorkerMessage::Unrecognized, Self::from_value)
    }

    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(WorkerMessage::Unrecognized)
    }
}
