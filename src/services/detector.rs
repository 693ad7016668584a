//! Client for the external YOLO detection server.
//!
//! The server is consumed only through three HTTP calls: `POST /predict_batch`,
//! `GET /model_info` and `GET /health`. Transport failures and failures the server
//! reports itself are kept apart so callers can tell "down" from "broken".

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectorError {
    /// The backend answered but signalled a failure
    #[error("{0}")]
    Backend(String),

    /// The backend could not be reached or did not answer in time
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Detection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detections for one input image, as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDetections {
    /// Path echoed back by the backend; absent on backends that only keep order
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub detected_classes: Vec<String>,
    #[serde(default)]
    pub detection_count: Option<usize>,
}

impl ImageDetections {
    pub fn count(&self) -> usize {
        self.detection_count.unwrap_or(self.detections.len())
    }
}

#[derive(Debug, Serialize)]
struct PredictBatchRequest<'a> {
    image_paths: &'a [PathBuf],
    conf_threshold: f32,
    iou_threshold: f32,
}

#[derive(Debug, Deserialize)]
struct PredictBatchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    results: Vec<ImageDetections>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    error: Option<String>,
}

#[async_trait]
pub trait DetectionBackend: Send + Sync {
    /// Runs detection over every path; one result per input path
    async fn predict_batch(
        &self,
        image_paths: &[PathBuf],
        conf_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<ImageDetections>, DetectorError>;

    async fn model_info(&self) -> Result<serde_json::Value, DetectorError>;

    async fn health(&self) -> Result<serde_json::Value, DetectorError>;
}

pub struct YoloHttpClient {
    client: Client,
    base_url: String,
}

impl YoloHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, DetectorError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| DetectorError::Backend(format!("Malformed response from /{}: {}", path, e)))
    }
}

#[async_trait]
impl DetectionBackend for YoloHttpClient {
    async fn predict_batch(
        &self,
        image_paths: &[PathBuf],
        conf_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Vec<ImageDetections>, DetectorError> {
        tracing::debug!(
            "POST {}/predict_batch ({} images, conf={}, iou={})",
            self.base_url,
            image_paths.len(),
            conf_threshold,
            iou_threshold
        );

        let response = self
            .client
            .post(self.url("predict_batch"))
            .json(&PredictBatchRequest {
                image_paths,
                conf_threshold,
                iou_threshold,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let body: PredictBatchResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(e)
            } else {
                DetectorError::Backend(format!("Malformed predict_batch response: {}", e))
            }
        })?;

        if !body.success {
            return Err(DetectorError::Backend(
                body.error
                    .unwrap_or_else(|| "Detection backend reported failure".to_string()),
            ));
        }

        Ok(body.results)
    }

    async fn model_info(&self) -> Result<serde_json::Value, DetectorError> {
        self.get_json("model_info").await
    }

    async fn health(&self) -> Result<serde_json::Value, DetectorError> {
        self.get_json("health").await
    }
}

fn transport_error(e: reqwest::Error) -> DetectorError {
    if e.is_timeout() {
        DetectorError::Unavailable(format!("Detection backend timed out: {}", e))
    } else {
        DetectorError::Unavailable(format!("Detection backend unreachable: {}", e))
    }
}

/// Non-2xx answers are application failures; the server puts its reason in `error`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DetectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.map_err(|e| {
        if e.is_timeout() {
            transport_error(e)
        } else {
            DetectorError::Backend(format!("HTTP {} with unreadable body: {}", status, e))
        }
    })?;
    let message = serde_json::from_str::<BackendErrorBody>(&text)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| format!("HTTP {}: {}", status, text.trim()));

    Err(DetectorError::Backend(message))
}
