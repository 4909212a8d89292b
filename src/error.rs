// src/error.rs
//! HTTP-boundary error: every handler failure becomes `{ "error": "..." }`.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::locate::LocateError;
use crate::upstream::{MissionError, VisionUnavailable};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    UpstreamUnavailable(String),
    #[error("upstream call failed: {0}")]
    Upstream(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Outbound failures: a switched-off provider is 503, anything else 502.
    pub fn from_upstream(err: anyhow::Error) -> Self {
        if let Some(off) = err.downcast_ref::<VisionUnavailable>() {
            return ApiError::UpstreamUnavailable(off.0.clone());
        }
        ApiError::Upstream(format!("{err:#}"))
    }
}

impl From<LocateError> for ApiError {
    fn from(e: LocateError) -> Self {
        ApiError::Unprocessable(e.to_string())
    }
}

impl From<MissionError> for ApiError {
    fn from(e: MissionError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

// Extractor rejections keep axum's message but use the JSON error body.
impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
