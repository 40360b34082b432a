use crate::models::{StagedFile, StorageResponse, UploadTarget};
use async_trait::async_trait;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::io::ReaderStream;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read staged file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid MIME type {0}")]
    InvalidMime(String),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("No progress for {0:?}")]
    Stalled(Duration),
}

/// Object storage endpoint a staged upload target points at.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// POSTs the target's form fields followed by the staged file as `file`.
    /// Any HTTP status is returned as-is; only transport failures are errors.
    async fn post_form(
        &self,
        target: &UploadTarget,
        staged: &StagedFile,
    ) -> Result<StorageResponse, StorageError>;
}

/// Multipart POST client for storage targets.
///
/// There is no cap on the total request time: an upload only fails when no
/// file bytes are handed to the connection, and no response arrives, for
/// `idle_timeout`.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    idle_timeout: Duration,
}

impl HttpObjectStorage {
    pub fn new(idle_timeout: Duration, connect_timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            client,
            idle_timeout,
        })
    }
}

/// Time of the last body chunk pulled by the connection.
#[derive(Clone)]
struct Progress {
    started: Instant,
    last_millis: Arc<AtomicU64>,
}

impl Progress {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_millis: Arc::new(AtomicU64::new(0)),
        }
    }

    fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_millis.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    /// Resolves once nothing has happened for `limit`.
    async fn stalled(&self, limit: Duration) {
        loop {
            let idle = self.idle_for();
            if idle >= limit {
                return;
            }
            tokio::time::sleep(limit - idle).await;
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn post_form(
        &self,
        target: &UploadTarget,
        staged: &StagedFile,
    ) -> Result<StorageResponse, StorageError> {
        let mut form = Form::new();
        for param in &target.parameters {
            form = form.text(param.name.clone(), param.value.clone());
        }

        // Streamed from disk; the known length keeps the request non-chunked.
        let file = tokio::fs::File::open(&staged.path).await?;
        let length = file.metadata().await?.len();
        let progress = Progress::new();
        let tracker = progress.clone();
        let chunks = ReaderStream::new(file).inspect_ok(move |_| tracker.touch());
        let body = reqwest::Body::wrap_stream(chunks);
        let part = Part::stream_with_length(body, length)
            .file_name(staged.original_filename.clone())
            .mime_str(&staged.mime_type)
            .map_err(|_| StorageError::InvalidMime(staged.mime_type.clone()))?;
        form = form.part("file", part);

        tracing::debug!(
            "🪣 POST {} ({} form fields + file, {} bytes)",
            target.upload_url,
            target.parameters.len(),
            length
        );

        let send = self
            .client
            .post(&target.upload_url)
            .multipart(form)
            .send();

        let response = tokio::select! {
            response = send => response?,
            _ = progress.stalled(self.idle_timeout) => {
                return Err(StorageError::Stalled(self.idle_timeout));
            }
        };

        let status = response.status().as_u16();
        let body = tokio::time::timeout(self.idle_timeout, response.text())
            .await
            .map_err(|_| StorageError::Stalled(self.idle_timeout))??;

        Ok(StorageResponse { status, body })
    }
}

/// Returns the text of the first `Location` child of the root element.
///
/// Unknown elements are skipped. Malformed documents and empty locations
/// yield `None`.
pub fn extract_location(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut capturing = false;
    let mut location = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 2 && e.local_name().as_ref() == b"Location" {
                    capturing = true;
                }
            }
            Ok(Event::Text(e)) if capturing => {
                location.push_str(&e.decode().ok()?);
            }
            Ok(Event::CData(e)) if capturing => {
                location.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::GeneralRef(e)) if capturing => match e.resolve_char_ref() {
                Ok(Some(ch)) => location.push(ch),
                _ => {
                    let name = e.decode().ok()?;
                    location.push_str(resolve_predefined_entity(&name)?);
                }
            },
            Ok(Event::End(_)) => {
                if capturing {
                    let trimmed = location.trim();
                    return (!trimmed.is_empty()).then(|| trimmed.to_string());
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => (),
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_resets_idle_clock() {
        let progress = Progress::new();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(progress.idle_for() >= Duration::from_millis(60));

        progress.touch();
        assert!(progress.idle_for() < Duration::from_millis(60));

        let started = Instant::now();
        progress.stalled(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(progress.idle_for() >= Duration::from_millis(50));
    }

    #[test]
    fn test_extract_location_from_post_response() {
        let xml = "<PostResponse><Location>https://store/x</Location></PostResponse>";
        assert_eq!(extract_location(xml).as_deref(), Some("https://store/x"));
    }

    #[test]
    fn test_extract_location_tolerates_extra_fields() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<PostResponse>
    <Bucket>shopify-staged-uploads</Bucket>
    <Key>tmp/123/products/a.txt</Key>
    <ETag>"0f343b0931126a20f133d67c2b018a3b"</ETag>
    <Location>https://shopify-staged-uploads.storage.googleapis.com/tmp/123/products/a.txt?a=1&amp;b=2</Location>
    <Location>https://ignored</Location>
</PostResponse>"#;
        assert_eq!(
            extract_location(xml).as_deref(),
            Some(
                "https://shopify-staged-uploads.storage.googleapis.com/tmp/123/products/a.txt?a=1&b=2"
            )
        );
    }

    #[test]
    fn test_extract_location_only_looks_at_root_children() {
        let xml = "<PostResponse><Meta><Location>https://nested</Location></Meta></PostResponse>";
        assert_eq!(extract_location(xml), None);
    }

    #[test]
    fn test_extract_location_missing_or_invalid() {
        assert_eq!(extract_location("<PostResponse><Key>k</Key></PostResponse>"), None);
        assert_eq!(extract_location("<PostResponse><Location>  </Location></PostResponse>"), None);
        assert_eq!(extract_location("Access Denied"), None);
        assert_eq!(extract_location(""), None);
    }
}
