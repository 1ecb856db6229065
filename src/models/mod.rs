//! Request and Response models for the worker control API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing control endpoint bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::WorkerMessage;
pub use responses::{
    ClientsResponse, HealthResponse, MessageResponse, StoreStatus, WorkerStatusResponse,
};
