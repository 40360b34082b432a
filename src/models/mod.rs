use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;
use validator::Validate;

/// A file accepted over HTTP and written to the local upload directory.
#[derive(Debug, Clone, Validate)]
pub struct StagedFile {
    pub path: PathBuf,
    #[validate(length(min = 1, message = "Filename must not be empty"))]
    pub original_filename: String,
    #[validate(length(min = 1, message = "MIME type must not be empty"))]
    pub mime_type: String,
}

/// One form field the storage endpoint expects, in the order Shopify issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormParameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub upload_url: String,
    pub resource_url: String,
    pub parameters: Vec<FormParameter>,
}

/// Raw answer from the object storage endpoint.
#[derive(Debug, Clone)]
pub struct StorageResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageResult {
    pub location_url: String,
    pub http_status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedFileRecord {
    pub id: String,
    pub alt_text: Option<String>,
    pub preview_image_url: Option<String>,
}

/// Field-scoped validation error returned by a Shopify mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserError {
    pub field: Option<Vec<String>>,
    pub message: String,
}
