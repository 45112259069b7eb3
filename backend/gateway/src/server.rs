//! Main HTTP Gateway Server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use ocrgate_backends::Runtime;

use crate::handlers;

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub runtime: Runtime,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl GatewayState {
    /// State with the upload settings taken from the runtime's config.
    pub fn new(runtime: Runtime) -> Self {
        let gateway = runtime.config().gateway();
        Self {
            upload_dir: gateway.upload_dir(),
            max_upload_bytes: gateway.max_upload_bytes(),
            runtime,
        }
    }
}

/// Build the router with all routes.
pub fn build_router(state: GatewayState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::hello))
        .route("/api/health", get(handlers::health))
        .route("/ocr", post(handlers::ocr))
        .route("/convert", post(handlers::convert))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Starts the HTTP server and serves until Ctrl-C.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "Gateway HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        // Without a signal handler, serve until the process is killed.
        Err(_) => std::future::pending::<()>().await,
    }
}
