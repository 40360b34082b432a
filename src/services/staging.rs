use crate::models::StagedFile;
use chrono::Utc;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Writes incoming upload bodies into the local upload directory.
pub struct UploadStager {
    upload_dir: PathBuf,
}

impl UploadStager {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await
    }

    /// Copies `reader` to a uniquely named file and returns its staged handle.
    /// A partially written file is removed when the copy fails.
    pub async fn stage<R>(
        &self,
        original_filename: &str,
        mime_type: &str,
        mut reader: R,
    ) -> std::io::Result<StagedFile>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.upload_dir.join(staged_file_name(original_filename));

        let written = async {
            let mut file = tokio::fs::File::create(&path).await?;
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;

        match written {
            Ok(bytes) => {
                tracing::info!(
                    "📥 Staged {} ({}, {} bytes) at {}",
                    original_filename,
                    mime_type,
                    bytes,
                    path.display()
                );
                Ok(StagedFile {
                    path,
                    original_filename: original_filename.to_string(),
                    mime_type: mime_type.to_string(),
                })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    pub async fn discard(&self, staged: &StagedFile) {
        if let Err(e) = tokio::fs::remove_file(&staged.path).await {
            tracing::warn!("Failed to discard {}: {}", staged.path.display(), e);
        }
    }
}

/// `{base}-{unix millis}-{random}{ext}`, built from the final path segment of
/// the client-supplied name only.
pub fn staged_file_name(original_filename: &str) -> String {
    let name = Path::new(original_filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let (base, ext) = match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) => (&name[..name.len() - ext.len() - 1], format!(".{}", ext)),
        None => (name, String::new()),
    };

    let suffix: u32 = rand::thread_rng().gen_range(0..=1_000_000_000);
    format!("{}-{}-{}{}", base, Utc::now().timestamp_millis(), suffix, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_file_name_keeps_base_and_extension() {
        let name = staged_file_name("report.final.pdf");
        assert!(name.starts_with("report.final-"));
        assert!(name.ends_with(".pdf"));

        let parts: Vec<&str> = name
            .trim_start_matches("report.final-")
            .trim_end_matches(".pdf")
            .split('-')
            .collect();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())));
    }

    #[test]
    fn test_staged_file_name_strips_directories() {
        let name = staged_file_name("../../etc/passwd");
        assert!(name.starts_with("passwd-"));
        assert!(!name.contains('/'));

        assert!(staged_file_name("..").starts_with("upload-"));
        assert!(staged_file_name(".env").starts_with(".env-"));
    }

    #[test]
    fn test_staged_file_names_are_unique() {
        assert_ne!(staged_file_name("a.txt"), staged_file_name("a.txt"));
    }

    #[tokio::test]
    async fn test_stage_writes_bytes_unmodified() {
        let dir = tempfile::tempdir().unwrap();
        let stager = UploadStager::new(dir.path());

        let content: &[u8] = b"\x00\x01binary\r\n\xff";
        let staged = stager.stage("blob.bin", "application/octet-stream", content).await.unwrap();

        assert_eq!(staged.original_filename, "blob.bin");
        assert_eq!(staged.mime_type, "application/octet-stream");
        assert!(staged.path.starts_with(dir.path()));
        assert_eq!(tokio::fs::read(&staged.path).await.unwrap(), content);

        stager.discard(&staged).await;
        assert!(!staged.path.exists());
    }

    #[tokio::test]
    async fn test_stage_fails_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let stager = UploadStager::new(dir.path().join("missing"));
        assert!(stager.stage("a.txt", "text/plain", &b"x"[..]).await.is_err());

        stager.ensure_dir().await.unwrap();
        assert!(stager.stage("a.txt", "text/plain", &b"x"[..]).await.is_ok());
    }
}
