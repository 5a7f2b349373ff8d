//! HTTP surface for single-record resolution.

mod handlers;
mod state;

use axum::http::{header, HeaderValue};
use axum::routing::get;
use axum::Router;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

pub use state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/georeference", get(handlers::georeference))
        .route("/api/healthz", get(handlers::healthz))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Serve the API on `host:port` until Ctrl+C.
pub async fn start(host: &str, port: u16, state: AppState) -> io::Result<()> {
    let pipes: Vec<String> = state.chain.kinds().iter().map(|k| k.to_string()).collect();
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| io::Error::new(e.kind(), format!("cannot bind {}: {}", addr, e)))?;

    info!("georeferencing on http://{} with pipes {}", addr, pipes.join(" > "));
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("stopping; in-flight requests finish first"),
        Err(e) => warn!("cannot listen for Ctrl+C: {}", e),
    }
}
