//! HTTP status endpoint.
//!
//! Serves health, node and path status as JSON, and lets operators pause
//! and resume individual paths.

use crate::config::HttpConfig;
use crate::supernode::{NodeInfo, PathInfo, SuperNode};
use anyhow::Result;
use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared server state.
pub struct AppState {
    pub supernode: Arc<SuperNode>,
    pub started: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(supernode: Arc<SuperNode>) -> Self {
        Self {
            supernode,
            started: Instant::now(),
        }
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/nodes", get(nodes_handler))
        .route("/api/paths", get(paths_handler))
        .route("/api/paths/:name", get(path_handler))
        .route("/api/paths/:name/pause", post(pause_handler))
        .route("/api/paths/:name/resume", post(resume_handler))
        .with_state(state)
}

/// Run the HTTP server until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the server fails to bind or serve.
pub async fn run_server(config: HttpConfig, state: Arc<AppState>, cancel: CancellationToken) -> Result<()> {
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP status endpoint listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let paths = state.supernode.paths();
    let running = paths.iter().filter(|p| p.state == "started").count();
    let failed = paths.iter().filter(|p| p.error.is_some()).count();
    Json(serde_json::json!({
        "status": if failed == 0 { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started.elapsed().as_secs(),
        "paths": paths.len(),
        "running": running,
        "failed": failed,
    }))
}

async fn nodes_handler(State(state): State<Arc<AppState>>) -> Json<Vec<NodeInfo>> {
    Json(state.supernode.nodes())
}

async fn paths_handler(State(state): State<Arc<AppState>>) -> Json<Vec<PathInfo>> {
    Json(state.supernode.paths())
}

async fn path_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<PathInfo>, StatusCode> {
    state.supernode.path(&name).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn pause_handler(State(state): State<Arc<AppState>>, UrlPath(name): UrlPath<String>) -> impl IntoResponse {
    control_response(state.supernode.pause(&name))
}

async fn resume_handler(State(state): State<Arc<AppState>>, UrlPath(name): UrlPath<String>) -> impl IntoResponse {
    control_response(state.supernode.resume(&name))
}

fn control_response(result: Option<Result<(), gridlink_core::PathError>>) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Some(Ok(())) => (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))),
        Some(Err(err)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": err.to_string() })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no running path of that name" })),
        ),
    }
}
