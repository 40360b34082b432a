use crate::config::ShopifyConfig;
use crate::models::{FormParameter, ManagedFileRecord, UploadTarget, UserError};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

const STAGED_UPLOADS_CREATE: &str = r#"
mutation stagedUploadsCreate($input: [StagedUploadInput!]!) {
  stagedUploadsCreate(input: $input) {
    stagedTargets {
      url
      resourceUrl
      parameters {
        name
        value
      }
    }
    userErrors {
      field
      message
    }
  }
}
"#;

const FILE_CREATE: &str = r#"
mutation fileCreate($files: [FileCreateInput!]!) {
  fileCreate(files: $files) {
    files {
      id
      alt
      preview {
        image {
          url
        }
      }
    }
    userErrors {
      field
      message
    }
  }
}
"#;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Shopify request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Shopify returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Shopify GraphQL errors: {0}")]
    Graphql(String),

    #[error("Shopify response is missing {0}")]
    MissingField(&'static str),
}

pub enum StagedUploadOutcome {
    Granted(UploadTarget),
    Rejected(Vec<UserError>),
}

pub enum FileCreateOutcome {
    Created(ManagedFileRecord),
    Rejected(Vec<UserError>),
}

/// The two Shopify mutations an upload goes through.
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    /// Ask for a single POST staging slot for a `FILE` resource.
    async fn staged_uploads_create(
        &self,
        filename: &str,
        mime_type: &str,
    ) -> Result<StagedUploadOutcome, PlatformError>;

    /// Register an uploaded object as a file in the store's content library.
    async fn file_create(
        &self,
        original_source: &str,
        alt: &str,
    ) -> Result<FileCreateOutcome, PlatformError>;
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    errors: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedUploadsCreateData {
    staged_uploads_create: Option<StagedUploadsCreatePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedUploadsCreatePayload {
    staged_targets: Option<Vec<StagedTarget>>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StagedTarget {
    url: Option<String>,
    resource_url: Option<String>,
    #[serde(default)]
    parameters: Vec<FormParameter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileCreateData {
    file_create: Option<FileCreatePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileCreatePayload {
    files: Option<Vec<CreatedFile>>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
    alt: Option<String>,
    preview: Option<FilePreview>,
}

#[derive(Deserialize)]
struct FilePreview {
    image: Option<PreviewImage>,
}

#[derive(Deserialize)]
struct PreviewImage {
    url: Option<String>,
}

impl From<CreatedFile> for ManagedFileRecord {
    fn from(file: CreatedFile) -> Self {
        Self {
            id: file.id,
            alt_text: file.alt,
            preview_image_url: file.preview.and_then(|p| p.image).and_then(|i| i.url),
        }
    }
}

/// Admin GraphQL client authenticated with a static access token.
pub struct ShopifyGraphqlClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl ShopifyGraphqlClient {
    pub fn new(
        config: &ShopifyConfig,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.graphql_endpoint(),
            access_token: config.admin_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &str,
        variables: Value,
    ) -> Result<T, PlatformError> {
        tracing::debug!("🛍️  Shopify {} -> {}", operation, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&json!({
                "query": query,
                "variables": variables,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GraphqlResponse<T> = response.json().await?;
        if let Some(errors) = payload.errors {
            return Err(PlatformError::Graphql(errors.to_string()));
        }

        payload.data.ok_or(PlatformError::MissingField("data"))
    }
}

#[async_trait]
impl CommercePlatform for ShopifyGraphqlClient {
    async fn staged_uploads_create(
        &self,
        filename: &str,
        mime_type: &str,
    ) -> Result<StagedUploadOutcome, PlatformError> {
        let variables = json!({
            "input": [{
                "filename": filename,
                "mimeType": mime_type,
                "resource": "FILE",
                "httpMethod": "POST",
            }]
        });

        let data: StagedUploadsCreateData = self
            .execute("stagedUploadsCreate", STAGED_UPLOADS_CREATE, variables)
            .await?;
        let payload = data
            .staged_uploads_create
            .ok_or(PlatformError::MissingField("stagedUploadsCreate"))?;

        if !payload.user_errors.is_empty() {
            return Ok(StagedUploadOutcome::Rejected(payload.user_errors));
        }

        let target = payload
            .staged_targets
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or(PlatformError::MissingField("stagedTargets[0]"))?;

        Ok(StagedUploadOutcome::Granted(UploadTarget {
            upload_url: target
                .url
                .ok_or(PlatformError::MissingField("stagedTargets[0].url"))?,
            resource_url: target.resource_url.unwrap_or_default(),
            parameters: target.parameters,
        }))
    }

    async fn file_create(
        &self,
        original_source: &str,
        alt: &str,
    ) -> Result<FileCreateOutcome, PlatformError> {
        let variables = json!({
            "files": [{
                "originalSource": original_source,
                "alt": alt,
            }]
        });

        let data: FileCreateData = self.execute("fileCreate", FILE_CREATE, variables).await?;
        let payload = data
            .file_create
            .ok_or(PlatformError::MissingField("fileCreate"))?;

        if !payload.user_errors.is_empty() {
            return Ok(FileCreateOutcome::Rejected(payload.user_errors));
        }

        let file = payload
            .files
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or(PlatformError::MissingField("files[0]"))?;

        Ok(FileCreateOutcome::Created(file.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_target_keeps_parameter_order() {
        let raw = r#"{
            "data": {
                "stagedUploadsCreate": {
                    "stagedTargets": [{
                        "url": "https://shopify-staged-uploads.storage.googleapis.com/",
                        "resourceUrl": "https://shopify-staged-uploads.storage.googleapis.com/tmp/1/a.txt",
                        "parameters": [
                            {"name": "Content-Type", "value": "text/plain"},
                            {"name": "success_action_status", "value": "201"},
                            {"name": "acl", "value": "private"},
                            {"name": "key", "value": "tmp/1/a.txt"}
                        ]
                    }],
                    "userErrors": []
                }
            }
        }"#;

        let response: GraphqlResponse<StagedUploadsCreateData> = serde_json::from_str(raw).unwrap();
        let payload = response.data.unwrap().staged_uploads_create.unwrap();
        let names: Vec<_> = payload.staged_targets.unwrap()[0]
            .parameters
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(
            names,
            vec!["Content-Type", "success_action_status", "acl", "key"]
        );
        assert!(payload.user_errors.is_empty());
    }

    #[test]
    fn test_user_errors_with_null_targets() {
        let raw = r#"{
            "data": {
                "stagedUploadsCreate": {
                    "stagedTargets": null,
                    "userErrors": [{"field": ["input", "0", "filename"], "message": "is invalid"}]
                }
            }
        }"#;

        let response: GraphqlResponse<StagedUploadsCreateData> = serde_json::from_str(raw).unwrap();
        let payload = response.data.unwrap().staged_uploads_create.unwrap();
        assert!(payload.staged_targets.is_none());
        assert_eq!(
            payload.user_errors,
            vec![UserError {
                field: Some(vec!["input".into(), "0".into(), "filename".into()]),
                message: "is invalid".into(),
            }]
        );
    }

    #[test]
    fn test_created_file_flattens_preview() {
        let raw = r#"{"id": "gid://shopify/GenericFile/1", "alt": "Uploaded via API",
                      "preview": {"image": {"url": "https://cdn.shopify.com/p.png"}}}"#;
        let file: CreatedFile = serde_json::from_str(raw).unwrap();
        let record = ManagedFileRecord::from(file);
        assert_eq!(record.id, "gid://shopify/GenericFile/1");
        assert_eq!(record.alt_text.as_deref(), Some("Uploaded via API"));
        assert_eq!(
            record.preview_image_url.as_deref(),
            Some("https://cdn.shopify.com/p.png")
        );

        let bare: CreatedFile =
            serde_json::from_str(r#"{"id": "gid://1", "alt": null, "preview": {"image": null}}"#)
                .unwrap();
        assert_eq!(ManagedFileRecord::from(bare).preview_image_url, None);
    }
}
