//! Error responses shared by the HTTP handlers.
//!
//! Every failure renders the session error frame
//! `{"type":"resp","state":"error","msg":...}` so HTTP clients and socket
//! clients parse a single shape.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use swarmhub_hub::Notification;
use swarmhub_torrent_core::TorrentError;
use tracing::warn;

/// Error returned by handlers, carrying the HTTP status and user-facing message.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    message: String,
}

impl ApiError {
    const fn new(status: StatusCode, message: String) -> Self {
        Self { status, message }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into())
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into())
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into())
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    /// User-facing message.
    pub(crate) fn message(&self) -> &str {
        &self.message
    }
}

impl From<TorrentError> for ApiError {
    fn from(err: TorrentError) -> Self {
        let status = match &err {
            TorrentError::NotFound { .. } => StatusCode::NOT_FOUND,
            TorrentError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            TorrentError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            TorrentError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            TorrentError::InvalidHash { .. }
            | TorrentError::InvalidMagnet { .. }
            | TorrentError::InvalidMetainfo { .. }
            | TorrentError::ParserFault { .. }
            | TorrentError::InvalidBase64 { .. }
            | TorrentError::FileMissing { .. }
            | TorrentError::DirectoryPresent { .. }
            | TorrentError::TooLarge { .. }
            | TorrentError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            warn!(error = %err, error_debug = ?err, "torrent operation failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Notification::error(self.message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use swarmhub_torrent_core::InfoHash;

    #[tokio::test]
    async fn renders_error_frame_with_status() -> Result<(), Box<dyn std::error::Error>> {
        let response = ApiError::from(TorrentError::NotFound {
            hash: InfoHash::from_bytes([7; 20]),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), 1024).await?;
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(
            value,
            serde_json::json!({"type": "resp", "state": "error", "msg": "torrent not found"})
        );
        Ok(())
    }

    #[test]
    fn malformed_input_maps_to_bad_request() {
        let err = ApiError::from(TorrentError::InvalidHash {
            value: "zz".into(),
        });
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "error parsing string to InfoHash");

        let err = ApiError::from(TorrentError::EngineUnavailable);
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
