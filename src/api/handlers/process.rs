use crate::AppState;
use crate::api::error::AppError;
use crate::services::orchestrator::{BatchSummary, DetectionResult, Thresholds};
use axum::{Json, extract::State};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Optional per-run threshold overrides
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct ProcessRequest {
    #[validate(range(min = 0.0, max = 1.0, message = "conf_threshold must be between 0 and 1"))]
    pub conf_threshold: Option<f32>,
    #[validate(range(min = 0.0, max = 1.0, message = "iou_threshold must be between 0 and 1"))]
    pub iou_threshold: Option<f32>,
}

impl ProcessRequest {
    fn thresholds(&self, defaults: Thresholds) -> Thresholds {
        Thresholds {
            conf: self.conf_threshold.unwrap_or(defaults.conf),
            iou: self.iou_threshold.unwrap_or(defaults.iou),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProcessResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<DetectionResult>,
    pub summary: BatchSummary,
}

#[utoipa::path(
    post,
    path = "/api/process",
    request_body(content = ProcessRequest, description = "Threshold overrides; an empty body uses the configured defaults"),
    responses(
        (status = 200, description = "Batch processed and staging cleared", body = ProcessResponse),
        (status = 400, description = "No images staged or invalid thresholds"),
        (status = 502, description = "Detector rejected the batch"),
        (status = 503, description = "Detector unreachable")
    ),
    tag = "detection"
)]
pub async fn process_images(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ProcessResponse>, AppError> {
    let request = parse_request(&body)?;
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let thresholds = request.thresholds(state.orchestrator.default_thresholds());
    let outcome = state.orchestrator.run_batch(thresholds).await?;

    Ok(Json(ProcessResponse {
        success: true,
        message: format!(
            "Processed {} images successfully",
            outcome.summary.total_images
        ),
        results: outcome.results,
        summary: outcome.summary,
    }))
}

fn parse_request(body: &[u8]) -> Result<ProcessRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProcessRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULTS: Thresholds = Thresholds {
        conf: 0.7,
        iou: 0.3,
    };

    #[test]
    fn test_empty_body_uses_defaults() {
        let request = parse_request(b"").unwrap();
        assert_eq!(request.thresholds(DEFAULTS), DEFAULTS);

        let request = parse_request(b"  \n").unwrap();
        assert_eq!(request.thresholds(DEFAULTS), DEFAULTS);
    }

    #[test]
    fn test_partial_override() {
        let request = parse_request(br#"{"conf_threshold": 0.5}"#).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(
            request.thresholds(DEFAULTS),
            Thresholds {
                conf: 0.5,
                iou: 0.3
            }
        );
    }

    #[test]
    fn test_out_of_range_rejected() {
        let request = parse_request(br#"{"conf_threshold": 1.5}"#).unwrap();
        assert!(request.validate().is_err());

        let request = parse_request(br#"{"iou_threshold": -0.1}"#).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_malformed_body_rejected() {
        assert!(matches!(
            parse_request(b"{not json"),
            Err(AppError::BadRequest(_))
        ));
    }
}
