use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::document::DocumentOptions;
use crate::download::{is_safe_name, DEFAULT_CONCURRENCY};

/// Everything one pipeline run needs: where to put files, for which user, and how hard to hit
/// the network.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Download root (`D`). Each user gets a scope directory below it.
    pub root_dir: PathBuf,
    /// User scope (`U`), normally the account whose repositories are fetched.
    pub user: String,
    /// Maximum number of archive transfers in flight at once.
    pub concurrency: usize,
    /// Per-request timeout, covering connect through the last body byte.
    pub request_timeout: Option<Duration>,
    pub document: DocumentOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("user scope {0:?} is not a valid directory name")]
    InvalidUser(String),
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}

impl PipelineConfig {
    pub fn new(root_dir: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            user: user.into(),
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: None,
            document: DocumentOptions::default(),
        }
    }

    /// `D/U`: archives, extracted projects and documents all live directly in here.
    pub fn user_scope_dir(&self) -> PathBuf {
        self.root_dir.join(&self.user)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if !is_safe_name(&self.user) {
            return Err(ConfigError::InvalidUser(self.user.clone()));
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            root_dir = %self.root_dir.display(),
            user = %self.user,
            concurrency = self.concurrency,
            request_timeout = ?self.request_timeout,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
