//! Offline Shell - an offline-first caching proxy
//!
//! Sits in front of the web app's origin and serves every page request with
//! the worker's network-first, cache-fallback semantics.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offline_shell::api::create_router;
use offline_shell::{AppState, Config};

/// Main entry point for the offline shell proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the worker with its cache storage (reloaded from the cache
///    directory) and upstream network
/// 4. Install (precache the shell); a failed install leaves the previously
///    stored generation serving, or the proxy passing requests through
/// 5. Create Axum router and start serving
/// 6. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline_shell=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Offline Shell");

    let config = Config::from_env();
    info!(
        "Configuration loaded: origin={}, upstream={}, generations={}/{}, cache_dir={:?}, port={}",
        config.public_origin,
        config.upstream_url,
        config.static_generation,
        config.dynamic_generation,
        config.cache_dir,
        config.server_port
    );

    let state = AppState::from_config(&config).context("failed to create worker")?;

    if let Err(e) = state.worker.install().await {
        error!("Install failed, previous generation (if any) keeps serving: {}", e);
    }

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
