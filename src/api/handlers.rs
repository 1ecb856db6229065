//! API Handlers
//!
//! The interception handler every page request goes through, plus the
//! worker's control endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::cache::CacheStorage;
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::models::{ClientsResponse, HealthResponse, MessageResponse, WorkerMessage, WorkerStatusResponse};
use crate::net::{FetchRequest, HttpNetwork};
use crate::worker::{FetchDecision, ServiceWorker};

/// Largest request body forwarded through the worker.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<ServiceWorker>,
}

impl AppState {
    pub fn new(worker: ServiceWorker) -> Self {
        Self {
            worker: Arc::new(worker),
        }
    }

    /// Creates a worker from configuration, backed by the HTTP network and,
    /// when a cache directory is configured, by the stores persisted there.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = match &config.cache_dir {
            Some(dir) => CacheStorage::persistent(dir, config.storage_quota_bytes)?,
            None => CacheStorage::new(config.storage_quota_bytes),
        };
        let network = Arc::new(HttpNetwork::new(config)?);
        Ok(Self::new(ServiceWorker::from_storage(config, storage, network)))
    }
}

/// Fallback handler: offers every page request to the worker.
///
/// Intercepted requests get the worker's response. Pass-through requests are
/// forwarded to the network; if that fails the page sees `502 Bad Gateway`.
pub async fn intercept_handler(State(state): State<AppState>, request: Request) -> Response {
    match intercept(&state, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn intercept(state: &AppState, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ShellError::InvalidRequest(format!("Unreadable request body: {}", e)))?;

    let request = FetchRequest::from_parts(
        parts.method,
        &parts.uri,
        parts.headers,
        body,
        state.worker.public_origin(),
    )?;

    match state.worker.handle_fetch(&request).await {
        FetchDecision::Respond(outcome) => Ok(outcome.response.into_response()),
        FetchDecision::PassThrough => match state.worker.pass_through(&request).await {
            Ok(response) => Ok(response.into_response()),
            Err(e) => {
                warn!("Pass-through {} {} failed: {}", request.method, request.url, e);
                Err(e)
            }
        },
    }
}

/// Handler for POST /__worker/message
///
/// Always accepted; unrecognized messages are ignored.
pub async fn message_handler(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let message = WorkerMessage::from_slice(&body);
    let recognized = message != WorkerMessage::Unrecognized;
    let state = state.worker.handle_message(message).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse { recognized, state }),
    )
        .into_response())
}

/// Handler for POST /__worker/clients/open
pub async fn client_open_handler(State(state): State<AppState>) -> Json<ClientsResponse> {
    let open_clients = state.worker.client_opened().await;
    Json(ClientsResponse {
        open_clients,
        state: state.worker.state().await,
    })
}

/// Handler for POST /__worker/clients/close
pub async fn client_close_handler(State(state): State<AppState>) -> Result<Json<ClientsResponse>> {
    let open_clients = state.worker.client_closed().await?;
    Ok(Json(ClientsResponse {
        open_clients,
        state: state.worker.state().await,
    }))
}

/// Handler for GET /__worker/status
pub async fn status_handler(State(state): State<AppState>) -> Json<WorkerStatusResponse> {
    Json(state.worker.status().await)
}

/// Handler for GET /__worker/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

