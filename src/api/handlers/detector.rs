use crate::AppState;
use crate::api::error::AppError;
use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ModelInfoResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub model_info: serde_json::Value,
}

#[derive(Serialize, ToSchema)]
pub struct DetectorHealthResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub yolo_health: serde_json::Value,
}

#[utoipa::path(
    get,
    path = "/api/model-info",
    responses(
        (status = 200, description = "Model metadata reported by the detector", body = ModelInfoResponse),
        (status = 503, description = "Detector unreachable")
    ),
    tag = "detection"
)]
pub async fn model_info(
    State(state): State<AppState>,
) -> Result<Json<ModelInfoResponse>, AppError> {
    let model_info = state.detector.model_info().await?;
    Ok(Json(ModelInfoResponse {
        success: true,
        model_info,
    }))
}

#[utoipa::path(
    get,
    path = "/api/yolo-health",
    responses(
        (status = 200, description = "Detector health as reported by the detector", body = DetectorHealthResponse),
        (status = 503, description = "Detector unreachable")
    ),
    tag = "detection"
)]
pub async fn yolo_health(
    State(state): State<AppState>,
) -> Result<Json<DetectorHealthResponse>, AppError> {
    let yolo_health = state.detector.health().await?;
    Ok(Json(DetectorHealthResponse {
        success: true,
        yolo_health,
    }))
}
