/// `load_config` module: loads a static YAML config and adapts it into the core `PipelineConfig`.
///
/// This module is the only place where untrusted YAML is parsed and mapped to strongly-typed
/// internal structs.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`CliConfig`]
/// - Apply defaults (concurrency, visibility, document options)
/// - Map the YAML sections onto [`PipelineConfig`] and validate the result
///
/// # Errors
/// All errors use `anyhow::Error` for context-rich diagnostics and are surfaced at the CLI
/// boundary.
use anyhow::{Context, Result};
use repo_digest_core::config::PipelineConfig;
use repo_digest_core::contract::{RepositoryReference, Visibility};
use repo_digest_core::document::DocumentOptions;
use repo_digest_core::download::DEFAULT_CONCURRENCY;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub download: DownloadSection,
    #[serde(default)]
    pub document: DocumentSection,
}

#[derive(Debug, Deserialize)]
pub struct DownloadSection {
    pub root_dir: PathBuf,
    pub user: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub repositories: Vec<RepositoryReference>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentSection {
    #[serde(default)]
    pub extra_ignore_dirs: Vec<String>,
    #[serde(default)]
    pub extra_text_extensions: Vec<String>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl CliConfig {
    /// Core pipeline configuration described by this file.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.download.root_dir, &self.download.user);
        config.concurrency = self.download.concurrency;
        config.request_timeout = self.download.request_timeout_secs.map(Duration::from_secs);
        config.document = DocumentOptions::default()
            .with_ignore_dirs(self.document.extra_ignore_dirs.iter().cloned())
            .with_text_extensions(&self.document.extra_text_extensions);
        config
    }
}

/// Loads a static YAML config file and returns it parsed, with defaults applied.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let config: CliConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(
        config_path = ?path_ref,
        repositories = config.download.repositories.len(),
        "Parsed config YAML successfully"
    );

    config
        .pipeline_config()
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path_ref.display()))?;

    Ok(config)
}
