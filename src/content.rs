//! Test content fetching.
//!
//! A [`ContentFetcher`] turns a [`ContentDescriptor`] into a test file on
//! the local filesystem. The orchestrator only ever sees the returned path;
//! how content got there (inline body, local file, repository checkout) is
//! the fetcher's business.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::execution::{ContentDescriptor, ContentType};

/// Errors that can occur while fetching content.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The descriptor lacks a field its content type needs.
    #[error("invalid content descriptor: {0}")]
    InvalidDescriptor(String),

    /// The content does not exist at the described location.
    #[error("content not found: {0}")]
    NotFound(String),

    /// This fetcher cannot materialize the given content type.
    #[error("unsupported content type: {0}")]
    Unsupported(String),

    /// I/O error writing or inspecting content.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Materializes test content on the local filesystem.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches the content and returns the path of the test file.
    async fn fetch(&self, content: &ContentDescriptor) -> Result<PathBuf, FetchError>;
}

/// Fetcher for content that is already local or inline.
///
/// | Type | Behavior |
/// |------|----------|
/// | `string` | Written to a fresh directory under `data_dir` |
/// | `file-uri` | Local path or `file://` URI, used in place |
/// | `git-file`, `git-dir`, `git` | `data_dir/repo/<path>`, if already checked out |
///
/// Cloning repositories is left to a dedicated fetcher; this one only finds
/// checkouts that a previous step placed under `data_dir/repo`.
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    data_dir: PathBuf,
}

impl LocalFetcher {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    async fn write_inline(&self, data: &str) -> Result<PathBuf, FetchError> {
        let dir = self.data_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join("test.yaml");
        tokio::fs::write(&path, data).await?;
        debug!("Wrote inline content to {}", path.display());
        Ok(path)
    }

    async fn existing(path: &Path) -> Result<PathBuf, FetchError> {
        match tokio::fs::metadata(path).await {
            Ok(_) => Ok(path.to_path_buf()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ContentFetcher for LocalFetcher {
    async fn fetch(&self, content: &ContentDescriptor) -> Result<PathBuf, FetchError> {
        match content.content_type {
            ContentType::String => {
                let data = content
                    .data
                    .as_deref()
                    .ok_or_else(|| FetchError::InvalidDescriptor("missing data".to_string()))?;
                self.write_inline(data).await
            }
            ContentType::FileUri => {
                let uri = content
                    .uri
                    .as_deref()
                    .ok_or_else(|| FetchError::InvalidDescriptor("missing uri".to_string()))?;
                let path = uri.strip_prefix("file://").unwrap_or(uri);
                if path.contains("://") {
                    return Err(FetchError::Unsupported(format!("remote uri {}", uri)));
                }
                Self::existing(Path::new(path)).await
            }
            ContentType::GitFile | ContentType::GitDir | ContentType::Git => {
                let repo = content.repository.as_ref().ok_or_else(|| {
                    FetchError::InvalidDescriptor("missing repository".to_string())
                })?;
                let checkout = self.data_dir.join("repo");
                let path = match repo.path.as_deref().filter(|p| !p.is_empty()) {
                    Some(p) => checkout.join(p),
                    None => checkout,
                };
                Self::existing(&path).await.map_err(|e| match e {
                    FetchError::NotFound(_) => FetchError::Unsupported(format!(
                        "{} content from {} is not checked out at {}",
                        content.content_type,
                        repo.uri,
                        path.display()
                    )),
                    other => other,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Repository;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fetch_string_content() {
        let dir = TempDir::new().unwrap();
        let fetcher = LocalFetcher::new(dir.path());
        let path = fetcher
            .fetch(&ContentDescriptor::string("config:\n  target: http://x\n"))
            .await
            .unwrap();

        assert!(path.starts_with(dir.path()));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "config:\n  target: http://x\n"
        );
    }

    #[tokio::test]
    async fn test_fetch_file_uri() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("flow.yaml");
        std::fs::write(&file, "config: {}").unwrap();
        let fetcher = LocalFetcher::new(dir.path());

        let uri = format!("file://{}", file.display());
        assert_eq!(
            fetcher.fetch(&ContentDescriptor::file(uri)).await.unwrap(),
            file
        );

        let missing = ContentDescriptor::file(dir.path().join("nope.yaml").display().to_string());
        assert!(matches!(
            fetcher.fetch(&missing).await.unwrap_err(),
            FetchError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_remote_uri_unsupported() {
        let dir = TempDir::new().unwrap();
        let fetcher = LocalFetcher::new(dir.path());
        let err = fetcher
            .fetch(&ContentDescriptor::file("https://example.com/flow.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_fetch_git_checkout() {
        let dir = TempDir::new().unwrap();
        let repo_dir = dir.path().join("repo").join("tests");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::write(repo_dir.join("flow.yaml"), "config: {}").unwrap();
        let fetcher = LocalFetcher::new(dir.path());

        let content = ContentDescriptor::git_file(
            Repository::new("https://example.com/r.git").with_path("tests/flow.yaml"),
        );
        assert_eq!(
            fetcher.fetch(&content).await.unwrap(),
            repo_dir.join("flow.yaml")
        );

        let absent = ContentDescriptor::git_file(
            Repository::new("https://example.com/r.git").with_path("other.yaml"),
        );
        assert!(matches!(
            fetcher.fetch(&absent).await.unwrap_err(),
            FetchError::Unsupported(_)
        ));
    }
}
