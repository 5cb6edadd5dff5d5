//! HTTP handlers for the sync server.
//!
//! Implements:
//! - POST /sync - Merge a client snapshot into the server document
//! - GET /data - Current document (client restore)
//! - GET /backups - Daily backups on disk
//! - GET / and GET /health - Liveness

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use qac_sync_core::{BackupInfo, SyncCoordinator, SyncResult};
use serde::Serialize;

use crate::error::Result;

/// Header carrying the shared sync password.
pub const SYNC_PASSWORD_HEADER: &str = "x-sync-password";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SyncCoordinator>,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
}

/// Backup listing response.
#[derive(Debug, Serialize)]
pub struct BackupsResponse {
    pub success: bool,
    pub backups: Vec<BackupInfo>,
}

/// GET / - Plain liveness string.
pub async fn index_handler() -> &'static str {
    "qac sync server is running"
}

/// GET /health - Health check endpoint.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Credential from the request headers; missing or non-ASCII values count
/// as empty.
fn extract_credential(headers: &HeaderMap) -> &str {
    headers
        .get(SYNC_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// POST /sync - Merge the client's document and return the result.
pub async fn sync_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncResult>> {
    let credential = extract_credential(&headers);
    let result = state.coordinator.sync(credential, &body).await?;
    Ok(Json(result))
}

/// GET /data - Current document without merging.
pub async fn data_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SyncResult>> {
    let result = state.coordinator.fetch(extract_credential(&headers)).await?;
    Ok(Json(result))
}

/// GET /backups - List daily backups, oldest first.
pub async fn backups_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BackupsResponse>> {
    let backups = state
        .coordinator
        .list_backups(extract_credential(&headers))
        .await?;
    Ok(Json(BackupsResponse {
        success: true,
        backups,
    }))
}
