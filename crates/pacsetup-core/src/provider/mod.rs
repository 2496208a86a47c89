//! Provider capability interface.
//!
//! One [`GitProvider`] implementation exists per hosting backend. Reconcilers
//! and orchestrators only ever see `&dyn GitProvider`, so tests can substitute
//! an in-memory fake.

mod github;
mod gitlab;
mod http;
mod unsupported;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EndpointSettings;
use crate::credentials::Credentials;
use crate::error::{ProviderError, ProvisionError};
use crate::files::{DesiredFileSet, FileChange};
use crate::repo::{ProviderKind, RepositoryRef};
use crate::webhook::{Webhook, WebhookSpec};

pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;
pub use unsupported::UnsupportedProvider;

/// Tip of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalState {
    Open,
    Closed,
    Merged,
}

/// A pull request or merge request as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeProposal {
    /// Pull request number or merge request iid.
    pub number: u64,
    pub source_branch: String,
    pub base_branch: String,
    pub title: String,
    pub web_url: String,
    pub state: ProposalState,
    /// Login of the account that opened it, when the provider reports one.
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// Parameters of a proposal to open.
#[derive(Debug, Clone, Copy)]
pub struct NewProposal<'a> {
    pub source_branch: &'a str,
    pub base_branch: &'a str,
    pub title: &'a str,
    pub body: &'a str,
}

/// Operations the engine needs from a hosting backend.
///
/// Mutating operations tolerate an already existing target where the
/// provider allows it: `create_branch` returns the existing tip, and
/// `create_proposal` is only called after `find_open_proposal` came back empty.
#[async_trait]
pub trait GitProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether `update_webhook` can re-activate a disabled hook.
    fn can_toggle_webhooks(&self) -> bool {
        true
    }

    /// Login of the account behind the credential, `None` when the provider
    /// cannot tell (installed applications).
    async fn current_user(&self) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }

    /// Default branch of the repository. An empty answer is an error.
    async fn default_branch(&self, repo: &RepositoryRef) -> Result<String, ProviderError>;

    /// Content of `path` at `git_ref`, `None` when the path does not exist.
    async fn read_file(
        &self,
        repo: &RepositoryRef,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError>;

    /// Changes required to make `git_ref` match `files`.
    async fn diff_files(
        &self,
        repo: &RepositoryRef,
        git_ref: &str,
        files: &DesiredFileSet,
    ) -> Result<Vec<FileChange>, ProviderError> {
        let mut changes = Vec::new();
        for entry in files.entries() {
            let current = self.read_file(repo, git_ref, &entry.path).await?;
            if let Some(change) = entry.change_from(current.as_deref()) {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    async fn find_branch(
        &self,
        repo: &RepositoryRef,
        branch: &str,
    ) -> Result<Option<BranchRef>, ProviderError>;

    async fn branch_exists(
        &self,
        repo: &RepositoryRef,
        branch: &str,
    ) -> Result<bool, ProviderError> {
        Ok(self.find_branch(repo, branch).await?.is_some())
    }

    /// Create `branch` at the tip of `from`.
    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        from: &str,
    ) -> Result<BranchRef, ProviderError>;

    /// Append one commit with `changes` to `branch`; returns the commit id.
    async fn commit_changes(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        changes: &[FileChange],
        author: &CommitAuthor,
        message: &str,
    ) -> Result<String, ProviderError>;

    async fn find_open_proposal(
        &self,
        repo: &RepositoryRef,
        source_branch: &str,
        base_branch: &str,
    ) -> Result<Option<ChangeProposal>, ProviderError>;

    /// Open a proposal. Fails with [`ProviderError::NoChanges`] when the
    /// source branch has nothing to merge.
    async fn create_proposal(
        &self,
        repo: &RepositoryRef,
        proposal: &NewProposal<'_>,
    ) -> Result<ChangeProposal, ProviderError>;

    async fn close_proposal(
        &self,
        repo: &RepositoryRef,
        proposal: &ChangeProposal,
    ) -> Result<(), ProviderError>;

    /// Delete `branch`; [`ProviderError::NotFound`] when it does not exist.
    async fn delete_branch(&self, repo: &RepositoryRef, branch: &str) -> Result<(), ProviderError>;

    async fn find_webhook(
        &self,
        repo: &RepositoryRef,
        target_url: &str,
    ) -> Result<Option<Webhook>, ProviderError>;

    async fn create_webhook(
        &self,
        repo: &RepositoryRef,
        spec: &WebhookSpec,
    ) -> Result<Webhook, ProviderError>;

    async fn update_webhook(
        &self,
        repo: &RepositoryRef,
        webhook: &Webhook,
    ) -> Result<Webhook, ProviderError>;

    async fn delete_webhook(
        &self,
        repo: &RepositoryRef,
        webhook: &Webhook,
    ) -> Result<(), ProviderError>;

    /// Verify the credential can reach the repository.
    ///
    /// Fails with [`ProviderError::NotAccessible`] when an installed
    /// application has not been granted access.
    async fn check_access(&self, _repo: &RepositoryRef) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Build the backend for `repo` using `credentials`.
pub fn connect(
    repo: &RepositoryRef,
    credentials: &Credentials,
    endpoints: &EndpointSettings,
) -> Result<Arc<dyn GitProvider>, ProvisionError> {
    credentials.validate(repo.kind)?;
    let base_url = endpoints
        .for_kind(repo.kind)
        .map(str::to_string)
        .unwrap_or_else(|| default_api_url(repo));

    let provider: Arc<dyn GitProvider> = match repo.kind {
        ProviderKind::GitHub => Arc::new(GitHubProvider::new(&base_url, credentials)?),
        ProviderKind::GitLab => Arc::new(GitLabProvider::new(&base_url, credentials)?),
        ProviderKind::Bitbucket => Arc::new(UnsupportedProvider::new(repo.kind)),
    };
    Ok(provider)
}

/// API base URL for the repository host.
pub fn default_api_url(repo: &RepositoryRef) -> String {
    match repo.kind {
        ProviderKind::GitHub if repo.host.eq_ignore_ascii_case("github.com") => {
            "https://api.github.com".to_string()
        }
        ProviderKind::GitHub => format!("https://{}/api/v3", repo.host),
        ProviderKind::GitLab => format!("https://{}/api/v4", repo.host),
        ProviderKind::Bitbucket => "https://api.bitbucket.org/2.0".to_string(),
    }
}
