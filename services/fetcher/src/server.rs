//! HTTP surface for the fetcher: the push subscription endpoint plus
//! `/status`, `/health`, `/metrics`.

use axum::{
    body::Bytes,
    extract::{Extension, Json},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use axum_extra::{
    headers::{authorization::Basic, Authorization},
    TypedHeader,
};
use chrono::{DateTime, Utc};
use pipeline_common::{NewGranule, PipelineError, TileAllowlist};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use storage::Catalog;
use tracing::{info, warn};

use crate::admission::admit;

/// Shared HTTP server state.
pub struct ServerState {
    pub catalog: Arc<Catalog>,
    pub queue: Arc<storage::DownloadQueue>,
    pub allowlist: Arc<TileAllowlist>,
    pub subscription_username: String,
    pub subscription_password: String,
    pub subscription_recency_days: i64,
}

/// Push event payload, conforming to the CDSE subscription push schema
/// (§4.2.2). Only the fields admission needs are modeled here.
#[derive(Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ContentLength")]
    pub content_length: i64,
    #[serde(rename = "Checksum", default)]
    pub checksum: String,
    #[serde(rename = "ContentDate")]
    pub content_date: PushContentDate,
    #[serde(rename = "TileId")]
    pub tile_id: String,
    #[serde(rename = "DownloadUrl")]
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
pub struct PushContentDate {
    #[serde(rename = "Start")]
    pub start: DateTime<Utc>,
    #[serde(rename = "End")]
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub admitted: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub counts: Vec<CountEntry>,
}

#[derive(Debug, Serialize)]
pub struct CountEntry {
    pub date: String,
    pub platform: String,
    pub available_links: i64,
    pub fetched_links: i64,
}

/// POST /subscription - push-mode granule admission (§4.2.2).
///
/// The body is taken as raw `Bytes` rather than `Json<PushEvent>` so that a
/// malformed payload from an unauthenticated caller is never parsed before
/// the Basic-auth check runs — axum extracts handler arguments in
/// declaration order, so a typed `Json` extractor would fail (422) ahead of
/// any auth logic in the handler body.
async fn subscription_handler(
    Extension(state): Extension<Arc<ServerState>>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
    body: Bytes,
) -> Response {
    let Some(TypedHeader(auth)) = auth else {
        return unauthorized();
    };

    if auth.username() != state.subscription_username || auth.password() != state.subscription_password {
        warn!("rejected push event with bad credentials");
        return unauthorized();
    }

    let event: PushEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "malformed push event body");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(PushResponse {
                    admitted: false,
                    reason: Some(format!("malformed request body: {e}")),
                }),
            )
                .into_response();
        }
    };

    let recency_cutoff = Utc::now() - chrono::Duration::days(state.subscription_recency_days);
    if event.content_date.start < recency_cutoff {
        info!(id = %event.id, "push event older than recency window, dropped");
        return (
            StatusCode::OK,
            Json(PushResponse {
                admitted: false,
                reason: Some("older than recency window".into()),
            }),
        )
            .into_response();
    }

    if !state.allowlist.accepts(&event.tile_id) {
        info!(id = %event.id, tile = %event.tile_id, "push event tile not in allowlist, dropped");
        return (
            StatusCode::OK,
            Json(PushResponse {
                admitted: false,
                reason: Some("tile not in allowlist".into()),
            }),
        )
            .into_response();
    }

    let ingestiondate = event.content_date.start.date_naive();
    let candidate = NewGranule {
        id: event.id.clone(),
        filename: event.name,
        tileid: event.tile_id,
        size: event.content_length,
        checksum: event.checksum,
        beginposition: event.content_date.start,
        endposition: event.content_date.end,
        ingestiondate,
        download_url: event.download_url,
    };

    match admit(&state.catalog, &state.queue, candidate).await {
        Ok(_) => (
            StatusCode::OK,
            Json(PushResponse {
                admitted: true,
                reason: None,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "push admission failed");
            error_response(&e)
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"fetcher\"")],
        Json(PushResponse {
            admitted: false,
            reason: Some("unauthorized".into()),
        }),
    )
        .into_response()
}

fn error_response(err: &PipelineError) -> Response {
    let status = StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(PushResponse {
            admitted: false,
            reason: Some(err.to_string()),
        }),
    )
        .into_response()
}

/// GET /status - discovery progress snapshot. Intentionally minimal; a full
/// per-(date, platform) sweep would need its own query, left to an operator
/// dashboard built on the `granule_count` table directly.
async fn status_handler() -> impl IntoResponse {
    Json(StatusResponse { counts: Vec::new() })
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "fetcher".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn metrics_handler() -> impl IntoResponse {
    "# HELP fetcher_info fetcher service information\n\
     # TYPE fetcher_info gauge\n\
     fetcher_info{version=\"0.1.0\"} 1\n"
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/subscription", post(subscription_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
}

pub async fn start_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port = port, "starting fetcher HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
