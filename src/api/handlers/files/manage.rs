use crate::AppState;
use crate::api::error::AppError;
use axum::{
    Json,
    extract::{Path, State},
};

use super::types::*;

#[utoipa::path(
    get,
    path = "/api/files",
    responses(
        (status = 200, description = "Staged files in upload order", body = FileListResponse)
    ),
    tag = "files"
)]
pub async fn list_files(State(state): State<AppState>) -> Json<FileListResponse> {
    let files = state.store.list().await;
    let count = files.len();
    Json(FileListResponse {
        success: true,
        files,
        count,
    })
}

#[utoipa::path(
    get,
    path = "/api/files/{id}",
    params(("id" = String, Path, description = "Staged file id")),
    responses(
        (status = 200, description = "Staged file", body = FileResponse),
        (status = 404, description = "No such file")
    ),
    tag = "files"
)]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, AppError> {
    let file = state.store.get(&id).await?;
    Ok(Json(FileResponse {
        success: true,
        file,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    params(("id" = String, Path, description = "Staged file id")),
    responses(
        (status = 200, description = "File removed from staging", body = DeleteResponse),
        (status = 404, description = "No such file")
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.store.delete(&id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: "File deleted successfully".to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/files",
    responses(
        (status = 200, description = "Staging area cleared", body = ClearResponse)
    ),
    tag = "files"
)]
pub async fn clear_files(State(state): State<AppState>) -> Json<ClearResponse> {
    let report = state.store.delete_all().await;
    report.log("Clear staging");
    Json(ClearResponse {
        success: true,
        message: "All files cleared".to_string(),
        removed: report.removed,
    })
}
