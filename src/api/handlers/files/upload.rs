use crate::AppState;
use crate::api::error::AppError;
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use bytes::Bytes;

use super::types::*;

/// Multipart field names that may carry the image
const FILE_FIELDS: &[&str] = &["image", "file"];

struct IncomingFile {
    original_name: String,
    content_type: Option<String>,
    data: Bytes,
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = Vec<u8>, description = "One image in an `image` (or `file`) field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image staged", body = UploadResponse),
        (status = 400, description = "Wrong type, too large, or no file")
    ),
    tag = "files"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let max_file_size = state.config.max_file_size;

    let result: Result<Json<UploadResponse>, AppError> = async {
        let mut incoming: Option<IncomingFile> = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max_file_size))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if !FILE_FIELDS.contains(&name.as_str()) {
                tracing::debug!("Ignoring multipart field '{}'", name);
                continue;
            }
            if incoming.is_some() {
                return Err(AppError::BadRequest(
                    "Exactly one file may be uploaded per request".to_string(),
                ));
            }

            let original_name = field.file_name().unwrap_or("unnamed").to_string();
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, max_file_size))?;

            incoming = Some(IncomingFile {
                original_name,
                content_type,
                data,
            });
        }

        let incoming =
            incoming.ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;

        let staged = state
            .store
            .put(
                &incoming.data,
                &incoming.original_name,
                incoming.content_type.as_deref(),
            )
            .await?;

        Ok(Json(UploadResponse::from(staged)))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain the rest of the body so the client sees our error instead of a reset
            tracing::warn!("Upload rejected: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

fn multipart_error(e: MultipartError, max_file_size: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::InvalidFile(ValidationError::ExceedsLimit { max: max_file_size })
    } else {
        AppError::BadRequest(e.body_text())
    }
}
