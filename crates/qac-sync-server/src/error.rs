//! Error responses for the sync server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use qac_sync_core::{SyncError, SyncResult};

/// A declined or failed request, rendered as a `SyncResult` body.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub SyncError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SyncError::Unauthorized => StatusCode::UNAUTHORIZED,
            SyncError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            SyncError::UnsupportedAction(_) => StatusCode::BAD_REQUEST,
            SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(SyncResult::failure(self.to_string()))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
