use crate::error::{ProviderError, ProvisionError};
use crate::provider::{GitProvider, NewProposal};
use crate::repo::RepositoryRef;

use super::ProposalRequest;

/// Drives the branch and proposal of one [`ProposalRequest`] to convergence.
pub struct ProposalReconciler<'a> {
    pub(super) provider: &'a dyn GitProvider,
}

impl<'a> ProposalReconciler<'a> {
    pub fn new(provider: &'a dyn GitProvider) -> Self {
        Self { provider }
    }

    /// Converge the repository toward `request.files`.
    ///
    /// Returns the proposal URL, or `None` when the base branch already holds
    /// the desired files and nothing was written.
    ///
    /// A branch left behind by a merged proposal can end up identical to the
    /// base; the provider then refuses to open a proposal. The branch is
    /// deleted and the whole sequence runs once more. A second refusal is
    /// reported as [`ProvisionError::StaleBranch`].
    pub async fn ensure(
        &self,
        repo: &RepositoryRef,
        request: &ProposalRequest,
    ) -> Result<Option<String>, ProvisionError> {
        let mut retried = false;
        loop {
            match self.ensure_once(repo, request).await {
                Err(ProviderError::NoChanges { .. }) if !retried => {
                    retried = true;
                    tracing::warn!(
                        repository = %repo,
                        branch = %request.source_branch,
                        "branch has no changes against {}, recreating it",
                        request.base_branch
                    );
                    match self.provider.delete_branch(repo, &request.source_branch).await {
                        Ok(()) | Err(ProviderError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(ProviderError::NoChanges { .. }) => {
                    return Err(ProvisionError::StaleBranch {
                        branch: request.source_branch.clone(),
                        base_branch: request.base_branch.clone(),
                    });
                }
                result => return Ok(result?),
            }
        }
    }

    async fn ensure_once(
        &self,
        repo: &RepositoryRef,
        request: &ProposalRequest,
    ) -> Result<Option<String>, ProviderError> {
        let source = request.source_branch.as_str();
        let base = request.base_branch.as_str();

        let changes = self.provider.diff_files(repo, base, &request.files).await?;
        if changes.is_empty() {
            tracing::debug!(repository = %repo, branch = base, "base branch already up to date");
            return Ok(None);
        }

        let pending = match self.provider.find_branch(repo, source).await? {
            None => {
                self.provider.create_branch(repo, source, base).await?;
                tracing::debug!(
                    repository = %repo,
                    branch = source,
                    "created branch from {}",
                    base
                );
                changes
            }
            Some(_) => self.provider.diff_files(repo, source, &request.files).await?,
        };

        if pending.is_empty() {
            tracing::debug!(repository = %repo, branch = source, "branch already up to date");
        } else {
            let sha = self
                .provider
                .commit_changes(repo, source, &pending, &request.author, &request.commit_message)
                .await?;
            tracing::info!(
                repository = %repo,
                branch = source,
                commit = %sha,
                files = pending.len(),
                "committed changes"
            );
        }

        if let Some(existing) = self.provider.find_open_proposal(repo, source, base).await? {
            tracing::debug!(repository = %repo, url = %existing.web_url, "reusing open proposal");
            return Ok(Some(existing.web_url));
        }

        let created = self
            .provider
            .create_proposal(
                repo,
                &NewProposal {
                    source_branch: source,
                    base_branch: base,
                    title: &request.title,
                    body: &request.body,
                },
            )
            .await?;
        tracing::info!(repository = %repo, url = %created.web_url, "opened proposal");
        Ok(Some(created.web_url))
    }
}
