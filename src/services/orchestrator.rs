use crate::models::{
    ManagedFileRecord, StagedFile, StorageResponse, StorageResult, UploadTarget, UserError,
};
use crate::services::shopify::{
    CommercePlatform, FileCreateOutcome, PlatformError, StagedUploadOutcome,
};
use crate::services::storage::{ObjectStorage, StorageError, extract_location};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use validator::Validate;

/// Storage statuses that count as an accepted upload.
pub const ACCEPTED_STORAGE_STATUSES: [u16; 2] = [201, 299];

/// Point in the upload sequence a request reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Received,
    TargetRequested,
    Transmitted,
    StorageAccepted,
    LocationExtracted,
    Registered,
    CleanedUp,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStage::Received => "received",
            UploadStage::TargetRequested => "staged target request",
            UploadStage::Transmitted => "storage transmission",
            UploadStage::StorageAccepted => "storage acceptance",
            UploadStage::LocationExtracted => "location extraction",
            UploadStage::Registered => "file registration",
            UploadStage::CleanedUp => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Invalid staged file: {0}")]
    InvalidStagedFile(String),

    #[error("Staged upload rejected")]
    StagedUploadRejected(Vec<UserError>),

    #[error("Shopify {stage} failed: {source}")]
    Platform {
        stage: UploadStage,
        #[source]
        source: PlatformError,
    },

    #[error("Storage transmission failed: {0}")]
    StorageTransmission(#[from] StorageError),

    #[error("Storage upload failed with HTTP {status}")]
    StorageRejected { status: u16, body: String },

    #[error("Missing Location in storage response: {body}")]
    MissingLocation { body: String },

    #[error("fileCreate rejected")]
    FileCreateRejected(Vec<UserError>),

    #[error("Failed to remove staged file: {0}")]
    Cleanup(#[source] std::io::Error),
}

impl OrchestrationError {
    /// The stage whose transition failed.
    pub fn stage(&self) -> UploadStage {
        match self {
            OrchestrationError::InvalidStagedFile(_) => UploadStage::Received,
            OrchestrationError::StagedUploadRejected(_) => UploadStage::TargetRequested,
            OrchestrationError::Platform { stage, .. } => *stage,
            OrchestrationError::StorageTransmission(_) => UploadStage::Transmitted,
            OrchestrationError::StorageRejected { .. } => UploadStage::StorageAccepted,
            OrchestrationError::MissingLocation { .. } => UploadStage::LocationExtracted,
            OrchestrationError::FileCreateRejected(_) => UploadStage::Registered,
            OrchestrationError::Cleanup(_) => UploadStage::CleanedUp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Location reported by storage and used as the file's original source.
    pub resource_url: String,
    pub file: ManagedFileRecord,
}

/// Runs one staged file through stagedUploadsCreate, the storage POST and
/// fileCreate, strictly in that order.
pub struct UploadOrchestrator {
    platform: Arc<dyn CommercePlatform>,
    storage: Arc<dyn ObjectStorage>,
    alt_text: String,
}

impl UploadOrchestrator {
    pub fn new(
        platform: Arc<dyn CommercePlatform>,
        storage: Arc<dyn ObjectStorage>,
        alt_text: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            storage,
            alt_text: alt_text.into(),
        }
    }

    /// Only a fully successful run deletes the staged file; every failure
    /// leaves it on disk.
    pub async fn handle_upload(
        &self,
        staged: StagedFile,
    ) -> Result<UploadOutcome, OrchestrationError> {
        staged
            .validate()
            .map_err(|e| OrchestrationError::InvalidStagedFile(e.to_string()))?;

        let target = self.request_staged_target(&staged).await?;
        let response = self.transmit_to_storage(&target, &staged).await?;
        let stored = accept_storage_response(response)?;
        let file = self.register_managed_file(&stored.location_url).await?;

        tokio::fs::remove_file(&staged.path)
            .await
            .map_err(OrchestrationError::Cleanup)?;
        info!("🧹 Removed staged file {}", staged.path.display());

        Ok(UploadOutcome {
            resource_url: stored.location_url,
            file,
        })
    }

    async fn request_staged_target(
        &self,
        staged: &StagedFile,
    ) -> Result<UploadTarget, OrchestrationError> {
        info!(
            "🎫 Requesting staged upload for {} ({})",
            staged.original_filename, staged.mime_type
        );

        let outcome = self
            .platform
            .staged_uploads_create(&staged.original_filename, &staged.mime_type)
            .await
            .map_err(|source| OrchestrationError::Platform {
                stage: UploadStage::TargetRequested,
                source,
            })?;

        match outcome {
            StagedUploadOutcome::Granted(target) => Ok(target),
            StagedUploadOutcome::Rejected(errors) => {
                warn!("Staged upload rejected with {} user error(s)", errors.len());
                Err(OrchestrationError::StagedUploadRejected(errors))
            }
        }
    }

    async fn transmit_to_storage(
        &self,
        target: &UploadTarget,
        staged: &StagedFile,
    ) -> Result<StorageResponse, OrchestrationError> {
        info!("☁️  Uploading {} to {}", staged.original_filename, target.upload_url);
        let response = self.storage.post_form(target, staged).await?;
        info!("☁️  Storage answered HTTP {}", response.status);
        Ok(response)
    }

    async fn register_managed_file(
        &self,
        location_url: &str,
    ) -> Result<ManagedFileRecord, OrchestrationError> {
        info!("🗂️  Registering {} with Shopify", location_url);

        let outcome = self
            .platform
            .file_create(location_url, &self.alt_text)
            .await
            .map_err(|source| OrchestrationError::Platform {
                stage: UploadStage::Registered,
                source,
            })?;

        match outcome {
            FileCreateOutcome::Created(file) => {
                info!("✅ Shopify file {} created", file.id);
                Ok(file)
            }
            FileCreateOutcome::Rejected(errors) => {
                warn!("fileCreate rejected with {} user error(s)", errors.len());
                Err(OrchestrationError::FileCreateRejected(errors))
            }
        }
    }
}

/// Status is checked before the body is parsed, so error bodies that are
/// not XML surface as rejected uploads.
pub fn accept_storage_response(
    response: StorageResponse,
) -> Result<StorageResult, OrchestrationError> {
    if !ACCEPTED_STORAGE_STATUSES.contains(&response.status) {
        warn!("Storage rejected upload with HTTP {}", response.status);
        return Err(OrchestrationError::StorageRejected {
            status: response.status,
            body: response.body,
        });
    }

    match extract_location(&response.body) {
        Some(location_url) => Ok(StorageResult {
            location_url,
            http_status: response.status,
        }),
        None => Err(OrchestrationError::MissingLocation {
            body: response.body,
        }),
    }
}
