//! API Routes
//!
//! Configures the Axum router: the worker's control endpoints under
//! `/__worker`, and every other request through the interception handler.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    client_close_handler, client_open_handler, health_handler, intercept_handler,
    message_handler, status_handler, AppState,
};
use crate::config::CONTROL_PREFIX;

/// Creates the main router.
///
/// # Endpoints
/// - `POST /__worker/message` - Cross-context message channel
/// - `POST /__worker/clients/open` - Register an open client tab
/// - `POST /__worker/clients/close` - Unregister a client tab
/// - `GET /__worker/status` - Lifecycle state, generations and store stats
/// - `GET /__worker/health` - Health check endpoint
/// - anything else - intercepted fetch
pub fn create_router(state: AppState) -> Router {
    // Control endpoints are called cross-origin by the page during development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let control = Router::new()
        .route("/message", post(message_handler))
        .route("/clients/open", post(client_open_handler))
        .route("/clients/close", post(client_close_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(cors);

    Router::new()
        .nest(CONTROL_PREFIX, control)
        .fallback(intercept_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
