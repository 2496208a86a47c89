//! The "set up" direction: webhook first, then the onboarding proposal.

use std::sync::Arc;

use crate::component::Component;
use crate::config::EngineConfig;
use crate::credentials::Credentials;
use crate::error::ProvisionError;
use crate::manifest::DesiredStateSource;
use crate::proposal::{ProposalReconciler, ProposalRequest};
use crate::provider::GitProvider;
use crate::repo::RepositoryRef;
use crate::webhook::{WebhookAction, WebhookReconciler, WebhookSpec};

use super::{WebhookTarget, permission_error, resolve_base_branch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub repository: RepositoryRef,
    pub base_branch: String,
    /// `None` when an installed application delivers events.
    pub webhook: Option<WebhookAction>,
    /// `None` when the base branch already holds the desired files.
    pub proposal_url: Option<String>,
}

impl ProvisionReport {
    pub fn is_up_to_date(&self) -> bool {
        self.proposal_url.is_none()
    }
}

pub struct ProvisionOrchestrator {
    provider: Arc<dyn GitProvider>,
    manifests: Arc<dyn DesiredStateSource>,
    config: EngineConfig,
}

impl ProvisionOrchestrator {
    pub fn new(
        provider: Arc<dyn GitProvider>,
        manifests: Arc<dyn DesiredStateSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            manifests,
            config,
        }
    }

    /// Provision `component`. Every failure is returned; webhook failures
    /// included, since without the hook no events would ever arrive.
    ///
    /// `webhook` is required unless `credentials` is an installed application.
    pub async fn provision(
        &self,
        component: &Component,
        credentials: &Credentials,
        webhook: Option<&WebhookTarget>,
    ) -> Result<ProvisionReport, ProvisionError> {
        let repo = component.repository()?;
        credentials.validate(repo.kind)?;
        self.run(&repo, component, credentials, webhook)
            .await
            .map_err(|e| permission_error(e, credentials, &repo))
    }

    async fn run(
        &self,
        repo: &RepositoryRef,
        component: &Component,
        credentials: &Credentials,
        webhook: Option<&WebhookTarget>,
    ) -> Result<ProvisionReport, ProvisionError> {
        let provider = self.provider.as_ref();

        let target = if credentials.is_app() {
            provider.check_access(repo).await?;
            None
        } else {
            let target = webhook.ok_or(ProvisionError::MissingWebhookTarget)?;
            if target.secret.is_empty() {
                return Err(ProvisionError::MissingWebhookSecret);
            }
            Some(target)
        };

        let base_branch = resolve_base_branch(provider, repo).await?;

        let webhook_action = match target {
            Some(target) => {
                let spec = WebhookSpec::new(
                    target.url.clone(),
                    target.secret.clone(),
                    &self.config.webhook,
                );
                Some(WebhookReconciler::new(provider).reconcile(repo, &spec).await?)
            }
            None => None,
        };

        let files = self.manifests.desired_files(component, &base_branch).await?;
        let request = ProposalRequest::onboarding(
            &self.config.proposal,
            component,
            base_branch.clone(),
            files,
            credentials.app(),
        );
        let proposal_url = ProposalReconciler::new(provider)
            .ensure(repo, &request)
            .await?;

        match &proposal_url {
            Some(url) => tracing::info!(repository = %repo, %url, "onboarding proposal ready"),
            None => tracing::info!(repository = %repo, "configuration already up to date"),
        }

        Ok(ProvisionReport {
            repository: repo.clone(),
            base_branch,
            webhook: webhook_action,
            proposal_url,
        })
    }
}
