//! HTTP status endpoint.
//!
//! `/metrics` serves the Prometheus text exposition. `/modules` lists loaded
//! modules and their lifecycle states as JSON.

use crate::modules::{ModuleDirectory, ModuleSummary};
use axum::extract::State;
use axum::{Json, Router, routing::get};
use std::net::{IpAddr, SocketAddr};

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn modules_handler(State(directory): State<ModuleDirectory>) -> Json<Vec<ModuleSummary>> {
    Json(directory.list())
}

pub fn router(directory: ModuleDirectory) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/modules", get(modules_handler))
        .with_state(directory)
}

/// Serve the status endpoint until the listener fails.
///
/// Long-running; spawn it in the background.
pub async fn run_http_server(bind: IpAddr, port: u16, directory: ModuleDirectory) {
    let addr = SocketAddr::new(bind, port);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind status endpoint");
            return;
        }
    };
    tracing::info!(%addr, "Status endpoint listening");

    if let Err(e) = axum::serve(listener, router(directory)).await {
        tracing::error!(error = %e, "Status endpoint stopped");
    }
}
