use serde::Serialize;

use crate::error::{ProviderError, ProvisionError};
use crate::provider::ChangeProposal;
use crate::repo::RepositoryRef;

use super::{ProposalReconciler, ProposalRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalAction {
    /// A removal proposal deletes the managed files.
    Delete,
    /// The onboarding proposal was abandoned instead.
    Close,
}

impl RemovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalAction::Delete => "delete",
            RemovalAction::Close => "close",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    /// Proposal URL; `None` when the files are already gone from the base.
    pub url: Option<String>,
    pub action: RemovalAction,
}

impl ProposalReconciler<'_> {
    /// Undo onboarding for the component.
    ///
    /// An onboarding proposal that never landed is abandoned: its branch is
    /// deleted and the proposal closed. Otherwise `removal` is converged like
    /// any other request, its tombstones deleting the managed files.
    ///
    /// With `owner` set, only a proposal opened by that account counts as the
    /// onboarding proposal; one opened by anybody else is left alone.
    pub async fn ensure_removed(
        &self,
        repo: &RepositoryRef,
        onboarding_branch: &str,
        owner: Option<&str>,
        removal: &ProposalRequest,
    ) -> Result<RemovalOutcome, ProvisionError> {
        let open = self
            .provider
            .find_open_proposal(repo, onboarding_branch, &removal.base_branch)
            .await?
            .filter(|proposal| {
                let ours = opened_by(proposal, owner);
                if !ours {
                    tracing::info!(
                        repository = %repo,
                        url = %proposal.web_url,
                        author = proposal.author.as_deref().unwrap_or(""),
                        "ignoring proposal opened by another account"
                    );
                }
                ours
            });

        let Some(onboarding) = open else {
            let url = self.ensure(repo, removal).await?;
            return Ok(RemovalOutcome {
                url,
                action: RemovalAction::Delete,
            });
        };

        match self.provider.delete_branch(repo, onboarding_branch).await {
            Ok(()) => {
                tracing::info!(
                    repository = %repo,
                    branch = onboarding_branch,
                    "deleted onboarding branch"
                );
            }
            Err(ProviderError::NotFound(_)) => {
                tracing::debug!(
                    repository = %repo,
                    branch = onboarding_branch,
                    "onboarding branch already gone"
                );
            }
            Err(e) => return Err(e.into()),
        }

        match self.provider.close_proposal(repo, &onboarding).await {
            Ok(()) | Err(ProviderError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!(
                    repository = %repo,
                    url = %onboarding.web_url,
                    error = %e,
                    "failed to close onboarding proposal"
                );
            }
        }

        Ok(RemovalOutcome {
            url: Some(onboarding.web_url),
            action: RemovalAction::Close,
        })
    }
}

/// Providers that do not report an author cannot be checked.
fn opened_by(proposal: &ChangeProposal, owner: Option<&str>) -> bool {
    match (owner, proposal.author.as_deref()) {
        (Some(owner), Some(author)) => author.eq_ignore_ascii_case(owner),
        _ => true,
    }
}
