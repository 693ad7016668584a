use crate::services::detector::DetectorError;
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid file: {0}")]
    InvalidFile(#[from] ValidationError),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("No images to process")]
    NoFilesStaged,

    #[error("Detection backend error: {0}")]
    DetectionBackend(String),

    #[error("Detection backend unavailable: {0}")]
    DetectionBackendUnavailable(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<DetectorError> for AppError {
    fn from(err: DetectorError) -> Self {
        match err {
            DetectorError::Backend(msg) => AppError::DetectionBackend(msg),
            DetectorError::Unavailable(msg) => AppError::DetectionBackendUnavailable(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InvalidFile(reason) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "message": reason.to_string(),
                    "code": reason.code(),
                }),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "message": msg }),
            ),
            AppError::NoFilesStaged => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": "No images to process" }),
            ),
            AppError::DetectionBackend(msg) => {
                tracing::error!("Detection backend reported failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "success": false,
                        "message": "YOLO processing failed",
                        "error": msg,
                    }),
                )
            }
            AppError::DetectionBackendUnavailable(msg) => {
                tracing::error!("Detection backend unreachable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "success": false,
                        "message": "YOLO API not available",
                        "error": msg,
                    }),
                )
            }
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": msg }),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal_error()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                internal_error()
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                internal_error()
            }
        };

        (status, Json(body)).into_response()
    }
}

fn internal_error() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "success": false, "message": "Internal Server Error" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_file_carries_code() {
        let (status, body) = render(AppError::from(ValidationError::UnsupportedType {
            declared: "text/plain".to_string(),
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "INVALID_MIME_TYPE");
    }

    #[tokio::test]
    async fn test_detector_errors_map_to_gateway_statuses() {
        let (status, body) = render(DetectorError::Backend("model not loaded".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "model not loaded");

        let (status, _) = render(DetectorError::Unavailable("connection refused".into()).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = render(AppError::Internal("disk on fire".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal Server Error");
    }
}
