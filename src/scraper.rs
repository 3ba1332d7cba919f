//! Artifact archiving.
//!
//! After a run, the report (and any other artifacts) must be stored
//! durably, keyed by execution id. A failed scrape turns the execution
//! into an error, since the archived report is part of the execution
//! record.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

/// Errors that can occur while archiving artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// An artifact to archive does not exist.
    #[error("artifact not found: {0}")]
    MissingArtifact(PathBuf),

    /// The artifact could not be written to storage.
    #[error("failed to store {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Uploads execution artifacts to durable storage.
#[async_trait]
pub trait ArtifactScraper: Send + Sync {
    /// Stores every artifact under the given execution id.
    async fn scrape(&self, execution_id: &str, artifacts: &[PathBuf]) -> Result<(), ScrapeError>;
}

/// Scraper that copies artifacts into `<root>/<execution-id>/`.
///
/// ```no_run
/// use artillery_runner::scraper::{ArtifactScraper, DirectoryScraper};
///
/// # async fn example() -> Result<(), artillery_runner::scraper::ScrapeError> {
/// let scraper = DirectoryScraper::new("/data/artifacts");
/// scraper
///     .scrape("exec-42", &["/data/tests/test-report.json".into()])
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryScraper {
    root: PathBuf,
}

impl DirectoryScraper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding artifacts of one execution.
    pub fn execution_dir(&self, execution_id: &str) -> PathBuf {
        self.root.join(sanitize(execution_id))
    }
}

#[async_trait]
impl ArtifactScraper for DirectoryScraper {
    async fn scrape(&self, execution_id: &str, artifacts: &[PathBuf]) -> Result<(), ScrapeError> {
        let dest_dir = self.execution_dir(execution_id);
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| ScrapeError::Store {
                path: dest_dir.clone(),
                source: e,
            })?;

        for artifact in artifacts {
            let Some(name) = artifact.file_name() else {
                return Err(ScrapeError::MissingArtifact(artifact.clone()));
            };
            if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
                return Err(ScrapeError::MissingArtifact(artifact.clone()));
            }
            let dest = dest_dir.join(name);
            tokio::fs::copy(artifact, &dest)
                .await
                .map_err(|e| ScrapeError::Store {
                    path: dest.clone(),
                    source: e,
                })?;
            debug!("Archived {} to {}", artifact.display(), dest.display());
        }

        Ok(())
    }
}

/// Keeps execution ids from escaping the storage root.
fn sanitize(execution_id: &str) -> String {
    let cleaned: String = execution_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
