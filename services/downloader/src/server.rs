//! HTTP status surface for the download worker.

use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use crate::pool::PoolStats;

pub struct ServerState {
    pub stats: Arc<PoolStats>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub downloaded: u64,
    pub requeued: u64,
    pub abandoned: u64,
    pub expired: u64,
    pub hard_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    Json(StatusResponse {
        downloaded: state.stats.downloaded.load(Ordering::Relaxed),
        requeued: state.stats.requeued.load(Ordering::Relaxed),
        abandoned: state.stats.abandoned.load(Ordering::Relaxed),
        expired: state.stats.expired.load(Ordering::Relaxed),
        hard_failures: state.stats.hard_failures.load(Ordering::Relaxed),
    })
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "downloader".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn metrics_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    format!(
        "# HELP downloader_granules_downloaded_total Granules successfully downloaded\n\
         # TYPE downloader_granules_downloaded_total counter\n\
         downloader_granules_downloaded_total {}\n\
         # HELP downloader_granules_requeued_total Transient failures requeued\n\
         # TYPE downloader_granules_requeued_total counter\n\
         downloader_granules_requeued_total {}\n\
         # HELP downloader_granules_abandoned_total Granules abandoned at the retry cap\n\
         # TYPE downloader_granules_abandoned_total counter\n\
         downloader_granules_abandoned_total {}\n",
        state.stats.downloaded.load(Ordering::Relaxed),
        state.stats.requeued.load(Ordering::Relaxed),
        state.stats.abandoned.load(Ordering::Relaxed),
    )
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
}

pub async fn start_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port = port, "starting downloader HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
