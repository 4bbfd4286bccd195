//! High-level pipeline: orchestrates download → extract → serialize for a user's repositories.
//!
//! # Responsibilities
//! - Downloads the whole batch once, concurrently, through [`ArchiveFetcher`]
//! - Extracts and serializes each successfully downloaded archive, one at a time, in input order
//! - Isolates failures: a failed item is logged, recorded in the report and skipped, siblings
//!   carry on
//!
//! # Filesystem layout
//! Given a user scope directory `D/U`:
//! - archives: `D/U/<name>.zip` (removed after extraction)
//! - extracted projects: `D/U/<name>/`
//! - documents: `D/U/<name>.md`
//!
//! # Navigation
//! - Main entrypoints: [`run`], [`run_config`], [`run_with`]
//! - Supporting types: [`PipelineReport`], [`RepositoryDocument`], [`RepositoryFailure`]

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::config::{ConfigError, PipelineConfig};
use crate::contract::RepositoryReference;
use crate::document::{self, DocumentError, DocumentOptions};
use crate::download::ArchiveFetcher;
use crate::extract::{self, ExtractError};
use crate::generate::{GenerationRequest, Language};

/// One finished repository: its name and the document text handed to generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDocument {
    pub name: String,
    pub document_text: String,
}

impl RepositoryDocument {
    pub fn to_request(&self, keywords: Option<String>, language: Language) -> GenerationRequest {
        GenerationRequest {
            repository_name: self.name.clone(),
            context: self.document_text.clone(),
            keywords,
            language,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Download,
    Extract,
    Serialize,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Download => write!(f, "download"),
            FailureStage::Extract => write!(f, "extract"),
            FailureStage::Serialize => write!(f, "serialize"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryFailure {
    pub name: String,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Completed repositories, in input order.
    pub documents: Vec<RepositoryDocument>,
    pub failures: Vec<RepositoryFailure>,
}

impl PipelineReport {
    /// `(name, document_text)` pairs for every completed repository.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.documents
            .into_iter()
            .map(|d| (d.name, d.document_text))
            .collect()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }
}

#[derive(Debug, thiserror::Error)]
enum StageError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Serialize(#[from] DocumentError),
    #[error("failed to clear stale directory {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    fn stage(&self) -> FailureStage {
        match self {
            StageError::Serialize(_) => FailureStage::Serialize,
            StageError::Extract(_) | StageError::Cleanup { .. } => FailureStage::Extract,
        }
    }
}

/// Run the pipeline with default document options and no request timeout.
pub async fn run(
    references: &[RepositoryReference],
    user_scope_dir: &Path,
    concurrency_limit: usize,
) -> PipelineReport {
    let fetcher = ArchiveFetcher::new(concurrency_limit);
    run_with(&fetcher, references, user_scope_dir, &DocumentOptions::default()).await
}

/// Validate `config` and run the pipeline into its user scope directory.
pub async fn run_config(
    config: &PipelineConfig,
    references: &[RepositoryReference],
) -> Result<PipelineReport, ConfigError> {
    config.validate()?;
    let fetcher = ArchiveFetcher::new(config.concurrency).request_timeout(config.request_timeout);
    Ok(run_with(&fetcher, references, &config.user_scope_dir(), &config.document).await)
}

pub async fn run_with(
    fetcher: &ArchiveFetcher,
    references: &[RepositoryReference],
    user_scope_dir: &Path,
    options: &DocumentOptions,
) -> PipelineReport {
    info!(
        repositories = references.len(),
        scope = %user_scope_dir.display(),
        "[PIPELINE] Starting"
    );

    let outcomes = fetcher.fetch_all(references, user_scope_dir).await;
    let mut report = PipelineReport::default();

    for outcome in outcomes {
        if !outcome.success {
            let reason = outcome
                .error
                .unwrap_or_else(|| "download failed".to_string());
            error!(repository = %outcome.name, reason = %reason, "[PIPELINE] Skipping repository, download failed");
            report.failures.push(RepositoryFailure {
                name: outcome.name,
                stage: FailureStage::Download,
                reason,
            });
            continue;
        }

        let archive_path = user_scope_dir.join(&outcome.archive_file_name);
        let destination = user_scope_dir.join(&outcome.name);
        let output_path = user_scope_dir.join(format!("{}.md", outcome.name));
        let options = options.clone();

        let result = tokio::task::spawn_blocking(move || {
            process_archive(&archive_path, &destination, &output_path, &options)
        })
        .await;

        match result {
            Ok(Ok(document_text)) => {
                info!(repository = %outcome.name, "[PIPELINE] Repository document ready");
                report.documents.push(RepositoryDocument {
                    name: outcome.name,
                    document_text,
                });
            }
            Ok(Err(e)) => {
                let stage = e.stage();
                error!(repository = %outcome.name, stage = %stage, error = %e, "[PIPELINE] Repository failed");
                report.failures.push(RepositoryFailure {
                    name: outcome.name,
                    stage,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                error!(repository = %outcome.name, error = %e, "[PIPELINE] Repository task aborted");
                report.failures.push(RepositoryFailure {
                    name: outcome.name,
                    stage: FailureStage::Extract,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        completed = report.documents.len(),
        failed = report.failures.len(),
        "[PIPELINE] Finished"
    );
    report
}

fn process_archive(
    archive_path: &Path,
    destination: &Path,
    output_path: &Path,
    options: &DocumentOptions,
) -> Result<String, StageError> {
    if destination.exists() {
        std::fs::remove_dir_all(destination).map_err(|source| StageError::Cleanup {
            path: destination.to_path_buf(),
            source,
        })?;
    }
    let project = extract::extract(archive_path, destination)?;
    let document = document::serialize_with(project.project_dir(), output_path, options)?;
    Ok(document.text)
}
