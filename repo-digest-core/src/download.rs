//! Archive fetcher: downloads a batch of repository archives under an admission limit.
//!
//! Every reference gets its own transfer. A counting semaphore admits at most
//! `concurrency_limit` transfers at once; the rest wait for a permit. Failures are isolated to
//! the item that hit them and every transfer is awaited before results are returned, in input
//! order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::contract::RepositoryReference;

/// Transfers admitted at once unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Response bodies are written through a buffer of this size, never held in memory whole.
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024 * 1024;

const AGENT: &str = concat!("repo-digest/", env!("CARGO_PKG_VERSION"));

/// Result of one transfer, reported in the same position as its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub name: String,
    /// File name (not path) of the archive inside the destination directory.
    pub archive_file_name: String,
    pub success: bool,
    /// Why the transfer failed, when it did.
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("download of {url} failed with HTTP status {status}")]
    Status { url: String, status: StatusCode },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("repository name {0:?} cannot be used as a file name")]
    InvalidName(String),
    #[error("download gate closed")]
    GateClosed,
}

/// A name is safe when it names exactly one entry inside a directory.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Local archive name for a repository: `<name>.zip`.
pub fn archive_file_name(name: &str) -> String {
    format!("{name}.zip")
}

#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: Client,
    concurrency_limit: usize,
    request_timeout: Option<Duration>,
}

impl ArchiveFetcher {
    pub fn new(concurrency_limit: usize) -> Self {
        Self::with_client(Client::new(), concurrency_limit)
    }

    pub fn with_client(client: Client, concurrency_limit: usize) -> Self {
        Self {
            client,
            concurrency_limit: concurrency_limit.max(1),
            request_timeout: None,
        }
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Download every reference into `destination_dir` as `<name>.zip`.
    ///
    /// Never fails as a whole: each item reports its own success flag. Outcomes are in input
    /// order regardless of completion order.
    pub async fn fetch_all(
        &self,
        items: &[RepositoryReference],
        destination_dir: &Path,
    ) -> Vec<DownloadOutcome> {
        info!(
            count = items.len(),
            limit = self.concurrency_limit,
            dir = %destination_dir.display(),
            "Starting archive downloads"
        );

        if let Err(e) = tokio::fs::create_dir_all(destination_dir).await {
            error!(
                error = ?e,
                path = %destination_dir.display(),
                "Failed to create download directory"
            );
            let reason = format!("cannot create {}: {e}", destination_dir.display());
            return items
                .iter()
                .map(|item| DownloadOutcome {
                    name: item.name.clone(),
                    archive_file_name: archive_file_name(&item.name),
                    success: false,
                    error: Some(reason.clone()),
                })
                .collect();
        }

        let gate = Semaphore::new(self.concurrency_limit);
        let transfers = items
            .iter()
            .map(|item| self.fetch_admitted(&gate, item, destination_dir));
        let outcomes = join_all(transfers).await;

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        info!(
            succeeded,
            failed = outcomes.len() - succeeded,
            "Archive downloads finished"
        );
        outcomes
    }

    async fn fetch_admitted(
        &self,
        gate: &Semaphore,
        item: &RepositoryReference,
        destination_dir: &Path,
    ) -> DownloadOutcome {
        let file_name = archive_file_name(&item.name);
        let result = if is_safe_name(&item.name) {
            let save_path = destination_dir.join(&file_name);
            match gate.acquire().await {
                Ok(_permit) => {
                    debug!(url = %item.archive_url, "Transfer admitted");
                    self.fetch_one(&item.archive_url, &save_path).await
                }
                Err(_) => Err(TransferError::GateClosed),
            }
        } else {
            Err(TransferError::InvalidName(item.name.clone()))
        };

        match result {
            Ok(bytes) => {
                info!(
                    repository = %item.name,
                    path = %destination_dir.join(&file_name).display(),
                    bytes,
                    "Archive downloaded"
                );
                DownloadOutcome {
                    name: item.name.clone(),
                    archive_file_name: file_name,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                match &e {
                    TransferError::Status { url, status } => error!(
                        repository = %item.name,
                        url = %url,
                        status = %status,
                        "Archive download failed"
                    ),
                    other => error!(
                        repository = %item.name,
                        url = %item.archive_url,
                        error = %other,
                        "Archive download failed"
                    ),
                }
                DownloadOutcome {
                    name: item.name.clone(),
                    archive_file_name: file_name,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn fetch_one(&self, url: &str, save_path: &Path) -> Result<u64, TransferError> {
        let result = self.transfer(url, save_path).await;
        if result.is_err() && tokio::fs::try_exists(save_path).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(save_path).await {
                error!(error = ?e, path = %save_path.display(), "Failed to remove partial archive");
            }
        }
        result
    }

    async fn transfer(&self, url: &str, save_path: &Path) -> Result<u64, TransferError> {
        let mut request = self.client.get(url).header(USER_AGENT, AGENT);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| self.network_error(url, e))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransferError::Status {
                url: url.to_string(),
                status,
            });
        }

        let write_error = |source| TransferError::Write {
            path: save_path.to_path_buf(),
            source,
        };
        let file = tokio::fs::File::create(save_path)
            .await
            .map_err(write_error)?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);

        let mut body = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.network_error(url, e))?;
            writer.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(write_error)?;
        Ok(written)
    }

    fn network_error(&self, url: &str, source: reqwest::Error) -> TransferError {
        match self.request_timeout {
            Some(timeout) if source.is_timeout() => TransferError::Timeout {
                url: url.to_string(),
                timeout,
            },
            _ => TransferError::Network {
                url: url.to_string(),
                source,
            },
        }
    }
}

/// Download `items` into `destination_dir` with at most `concurrency_limit` transfers in flight.
pub async fn fetch_all(
    items: &[RepositoryReference],
    destination_dir: &Path,
    concurrency_limit: usize,
) -> Vec<DownloadOutcome> {
    ArchiveFetcher::new(concurrency_limit)
        .fetch_all(items, destination_dir)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_names_are_single_path_segments() {
        assert!(is_safe_name("alpha"));
        assert!(is_safe_name("my.repo-2"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name("a/b"));
        assert!(!is_safe_name("a\\b"));
    }

    #[test]
    fn zero_limit_is_clamped_to_one() {
        assert_eq!(ArchiveFetcher::new(0).concurrency_limit(), 1);
    }
}
