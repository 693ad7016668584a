use crate::services::staging::StagedFile;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub id: String,
    pub file_name: String,
    pub original_name: String,
    pub file_path: String,
    pub size: u64,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub data: UploadData,
}

impl From<StagedFile> for UploadResponse {
    fn from(file: StagedFile) -> Self {
        Self {
            success: true,
            message: "File uploaded successfully".to_string(),
            data: UploadData {
                id: file.id,
                file_name: file.stored_name,
                original_name: file.original_name,
                file_path: file.path.display().to_string(),
                size: file.size_bytes,
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FileListResponse {
    pub success: bool,
    pub files: Vec<StagedFile>,
    pub count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct FileResponse {
    pub success: bool,
    pub file: StagedFile,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    pub removed: usize,
}
