use crate::AppState;
use crate::api::error::AppError;
use crate::models::{ManagedFileRecord, StagedFile};
use crate::services::staging::UploadStager;
use axum::{
    Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::Path;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

pub const SUCCESS_MESSAGE: &str = "✅ File uploaded & registered with Shopify";

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub resource_url: String,
    pub shopify_file: ManagedFileRecord,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "Single file in the `file` field", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File uploaded and registered with Shopify", body = UploadResponse),
        (status = 400, description = "Rejected by Shopify or malformed request", body = crate::api::error::ErrorResponse),
        (status = 500, description = "Storage or Shopify failure", body = crate::api::error::ErrorResponse)
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let staged = receive_file(&state.stager, &mut multipart).await?;
    let outcome = state.orchestrator.handle_upload(staged).await?;

    Ok(Json(UploadResponse {
        message: SUCCESS_MESSAGE.to_string(),
        resource_url: outcome.resource_url,
        shopify_file: outcome.file,
    }))
}

/// Streams the `file` field to disk. Other fields are skipped; a second file
/// field is ignored.
///
/// The declared filename is reduced to its last path segment and the content
/// type to its `type/subtype` essence; a part without a content type is
/// treated as `text/plain`.
async fn receive_file(
    stager: &UploadStager,
    multipart: &mut Multipart,
) -> Result<StagedFile, AppError> {
    let mut staged: Option<StagedFile> = None;

    let read = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            if field.name() != Some("file") || staged.is_some() {
                continue;
            }

            let original_filename = field
                .file_name()
                .and_then(base_file_name)
                .ok_or_else(|| AppError::BadRequest("File field has no filename".to_string()))?;

            let mime_type = match field.content_type() {
                Some(raw) => raw
                    .parse::<mime::Mime>()
                    .map_err(|e| AppError::BadRequest(format!("Invalid content type: {}", e)))?
                    .essence_str()
                    .to_string(),
                None => mime::TEXT_PLAIN.essence_str().to_string(),
            };

            let reader = StreamReader::new(field.map_err(std::io::Error::other));
            let file = stager
                .stage(&original_filename, &mime_type, reader)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to stage upload: {}", e)))?;
            staged = Some(file);
        }
        Ok::<(), AppError>(())
    }
    .await;

    match (read, staged) {
        (Ok(()), Some(file)) => Ok(file),
        (Ok(()), None) => Err(AppError::BadRequest("No file provided".to_string())),
        (Err(e), Some(file)) => {
            stager.discard(&file).await;
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}

/// Last segment of a client-supplied path, split on both separators.
fn base_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next()?;
    Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_file_name() {
        assert_eq!(base_file_name("a.txt").as_deref(), Some("a.txt"));
        assert_eq!(base_file_name("photos/a.txt").as_deref(), Some("a.txt"));
        assert_eq!(base_file_name("C:\\Users\\me\\a.txt").as_deref(), Some("a.txt"));
        assert_eq!(base_file_name(""), None);
        assert_eq!(base_file_name("photos/"), None);
        assert_eq!(base_file_name(".."), None);
    }
}
