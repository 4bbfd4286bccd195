//! # contract: collaborator interfaces consumed by the pipeline
//!
//! The pipeline never talks to a hosting provider itself. It consumes an ordered list of
//! [`RepositoryReference`]s produced by a [`RepositoryLister`], with the visibility filter
//! already applied.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall` so consumers can generate deterministic mocks.
//! - [`StaticLister`] serves references straight from configuration.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

/// One repository considered for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryReference {
    /// Repository name, unique within one user's batch. Used as the on-disk file stem.
    pub name: String,
    /// Where the zip archive of the repository can be fetched with a plain GET.
    pub archive_url: String,
    /// Only consulted by the lister's visibility filter.
    #[serde(default)]
    pub private: bool,
}

impl RepositoryReference {
    pub fn new(name: impl Into<String>, archive_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            archive_url: archive_url.into(),
            private: false,
        }
    }
}

/// Which repositories a lister hands to the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Only public repositories.
    #[default]
    #[serde(alias = "public_only")]
    Public,
    /// Public and private repositories.
    All,
}

impl Visibility {
    pub fn admits(self, reference: &RepositoryReference) -> bool {
        match self {
            Visibility::Public => !reference.private,
            Visibility::All => true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("unknown user {0:?}")]
    UnknownUser(String),
    #[error("repository listing failed: {0}")]
    Other(String),
}

/// Source of repository references for a user.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepositoryLister: Send + Sync {
    /// List the user's repositories, filtered by `visibility`, in a stable order.
    async fn list_repositories(
        &self,
        username: &str,
        visibility: Visibility,
    ) -> Result<Vec<RepositoryReference>, ListError>;
}

/// Lister backed by a fixed list, e.g. the `repositories` section of a config file.
#[derive(Debug, Clone)]
pub struct StaticLister {
    user: String,
    references: Vec<RepositoryReference>,
}

impl StaticLister {
    pub fn new(user: impl Into<String>, references: Vec<RepositoryReference>) -> Self {
        Self {
            user: user.into(),
            references,
        }
    }
}

#[async_trait]
impl RepositoryLister for StaticLister {
    async fn list_repositories(
        &self,
        username: &str,
        visibility: Visibility,
    ) -> Result<Vec<RepositoryReference>, ListError> {
        if username != self.user {
            return Err(ListError::UnknownUser(username.to_string()));
        }
        let listed: Vec<RepositoryReference> = self
            .references
            .iter()
            .filter(|r| visibility.admits(r))
            .cloned()
            .collect();
        tracing::debug!(
            user = username,
            ?visibility,
            total = self.references.len(),
            listed = listed.len(),
            "Listed repositories from static configuration"
        );
        Ok(listed)
    }
}
