pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::IntakeConfig;
use crate::services::detector::DetectionBackend;
use crate::services::orchestrator::{BatchOrchestrator, Thresholds};
use crate::services::staging::StagingStore;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::files::upload_image,
        api::handlers::files::list_files,
        api::handlers::files::get_file,
        api::handlers::files::delete_file,
        api::handlers::files::clear_files,
        api::handlers::process::process_images,
        api::handlers::detector::model_info,
        api::handlers::detector::yolo_health,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::files::UploadData,
            api::handlers::files::UploadResponse,
            api::handlers::files::FileListResponse,
            api::handlers::files::FileResponse,
            api::handlers::files::DeleteResponse,
            api::handlers::files::ClearResponse,
            api::handlers::process::ProcessRequest,
            api::handlers::process::ProcessResponse,
            api::handlers::detector::ModelInfoResponse,
            api::handlers::detector::DetectorHealthResponse,
            api::handlers::health::HealthResponse,
            services::staging::StagedFile,
            services::orchestrator::DetectionResult,
            services::orchestrator::BatchSummary,
            services::detector::Detection,
            services::detector::BoundingBox,
        )
    ),
    tags(
        (name = "files", description = "Image intake and staging endpoints"),
        (name = "detection", description = "Batch detection and detector pass-through endpoints"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StagingStore>,
    pub detector: Arc<dyn DetectionBackend>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub config: IntakeConfig,
}

impl AppState {
    pub fn new(
        store: Arc<StagingStore>,
        detector: Arc<dyn DetectionBackend>,
        config: IntakeConfig,
    ) -> Self {
        let orchestrator = Arc::new(BatchOrchestrator::new(
            store.clone(),
            detector.clone(),
            Thresholds {
                conf: config.conf_threshold,
                iou: config.iou_threshold,
            },
        ));

        Self {
            store,
            detector,
            orchestrator,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(api::handlers::health::health_check))
        .route(
            "/api/upload",
            post(api::handlers::files::upload_image)
                .layer(DefaultBodyLimit::max(state.config.upload_body_limit())),
        )
        .route(
            "/api/files",
            get(api::handlers::files::list_files).delete(api::handlers::files::clear_files),
        )
        .route(
            "/api/files/:id",
            get(api::handlers::files::get_file).delete(api::handlers::files::delete_file),
        )
        .route("/api/process", post(api::handlers::process::process_images))
        .route("/api/model-info", get(api::handlers::detector::model_info))
        .route("/api/yolo-health", get(api::handlers::detector::yolo_health))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors)
        .with_state(state)
}
