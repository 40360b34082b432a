use crate::services::orchestrator::OrchestrationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use utoipa::ToSchema;

pub const STAGED_UPLOAD_ERROR: &str = "Staged Upload Error";
pub const FILE_CREATE_FAILED: &str = "fileCreate failed";
pub const UPLOAD_FAILED: &str = "❌ Upload failed";
pub const BAD_REQUEST: &str = "Bad Request";
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Array of `{field, message}` for rejected mutations, otherwise a string
    #[schema(value_type = Object)]
    pub details: Value,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Upload(#[from] OrchestrationError),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, Value) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, BAD_REQUEST, json!(msg)),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR, json!(msg))
            }
            AppError::Upload(e) => match e {
                OrchestrationError::StagedUploadRejected(errors) => {
                    (StatusCode::BAD_REQUEST, STAGED_UPLOAD_ERROR, json!(errors))
                }
                OrchestrationError::FileCreateRejected(errors) => {
                    (StatusCode::BAD_REQUEST, FILE_CREATE_FAILED, json!(errors))
                }
                OrchestrationError::InvalidStagedFile(msg) => {
                    (StatusCode::BAD_REQUEST, BAD_REQUEST, json!(msg))
                }
                OrchestrationError::StorageRejected { status, body } => {
                    tracing::error!("Storage rejected upload with HTTP {}: {}", status, body);
                    (StatusCode::INTERNAL_SERVER_ERROR, UPLOAD_FAILED, json!(body))
                }
                other => {
                    tracing::error!("Upload failed at {}: {}", other.stage(), other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        INTERNAL_SERVER_ERROR,
                        json!(other.to_string()),
                    )
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = self.parts();

        let body = Json(ErrorResponse {
            error: error.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserError;

    #[test]
    fn test_rejections_map_to_bad_request_with_details() {
        let errors = vec![UserError {
            field: Some(vec!["files".into(), "0".into(), "originalSource".into()]),
            message: "Invalid URL".into(),
        }];

        let (status, error, details) =
            AppError::from(OrchestrationError::FileCreateRejected(errors)).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error, "fileCreate failed");
        assert_eq!(
            details,
            json!([{"field": ["files", "0", "originalSource"], "message": "Invalid URL"}])
        );

        let (status, error, _) =
            AppError::from(OrchestrationError::StagedUploadRejected(vec![])).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error, "Staged Upload Error");
    }

    #[test]
    fn test_storage_rejection_surfaces_raw_body() {
        let (status, error, details) = AppError::from(OrchestrationError::StorageRejected {
            status: 403,
            body: "<Error><Code>AccessDenied</Code></Error>".into(),
        })
        .parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error, "❌ Upload failed");
        assert_eq!(details, json!("<Error><Code>AccessDenied</Code></Error>"));
    }

    #[test]
    fn test_other_failures_name_the_step() {
        let (status, error, details) = AppError::from(OrchestrationError::MissingLocation {
            body: "<PostResponse/>".into(),
        })
        .parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error, "Internal Server Error");
        assert!(details.as_str().unwrap().contains("Missing Location"));
    }
}
