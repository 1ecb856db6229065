//! API Module
//!
//! HTTP surface of the worker: request interception and control endpoints.
//!
//! # Endpoints
//! - `POST /__worker/message` - Cross-context message channel
//! - `POST /__worker/clients/open` - Register an open client tab
//! - `POST /__worker/clients/close` - Unregister a client tab
//! - `GET /__worker/status` - Worker status
//! - `GET /__worker/health` - Health check endpoint
//! - everything else - intercepted by the worker

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
