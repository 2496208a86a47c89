//! The "tear down" direction. Best effort: failures become warnings.

use std::sync::Arc;

use crate::component::{BranchNames, Component};
use crate::config::EngineConfig;
use crate::credentials::Credentials;
use crate::error::ProvisionError;
use crate::manifest::DesiredStateSource;
use crate::proposal::{ProposalReconciler, ProposalRequest, RemovalOutcome};
use crate::provider::GitProvider;
use crate::repo::RepositoryRef;
use crate::webhook::{WebhookReconciler, WebhookRemoval};

use super::{permission_error, resolve_base_branch};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeprovisionReport {
    pub removal: Option<RemovalOutcome>,
    pub webhook: Option<WebhookRemoval>,
    pub warnings: Vec<String>,
}

impl DeprovisionReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, warning: String) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

pub struct DeprovisionOrchestrator {
    provider: Arc<dyn GitProvider>,
    manifests: Arc<dyn DesiredStateSource>,
    config: EngineConfig,
}

impl DeprovisionOrchestrator {
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

    /// Remove the webhook, then abandon the onboarding proposal or open a
    /// removal proposal. Never fails; problems are collected in the report.
    pub async fn deprovision(
        &self,
        component: &Component,
        credentials: &Credentials,
        webhook_url: Option<&str>,
    ) -> DeprovisionReport {
        let mut report = DeprovisionReport::default();

        let repo = match component.repository() {
            Ok(repo) => repo,
            Err(e) => {
                report.warn(format!("Skipping cleanup of {}: {}", component.name, e));
                return report;
            }
        };
        if let Err(e) = credentials.validate(repo.kind) {
            report.warn(format!("Skipping cleanup of {}: {}", repo, e));
            return report;
        }

        if !credentials.is_app() {
            self.remove_webhook(&repo, webhook_url, &mut report).await;
        }

        match self.remove_configuration(&repo, component, credentials).await {
            Ok(outcome) => {
                tracing::info!(
                    repository = %repo,
                    action = outcome.action.as_str(),
                    url = outcome.url.as_deref().unwrap_or(""),
                    "configuration removal handled"
                );
                report.removal = Some(outcome);
            }
            Err(e) => {
                let e = permission_error(e, credentials, &repo);
                report.warn(format!("Failed to remove configuration from {}: {}", repo, e));
            }
        }

        report
    }

    async fn remove_webhook(
        &self,
        repo: &RepositoryRef,
        webhook_url: Option<&str>,
        report: &mut DeprovisionReport,
    ) {
        let Some(url) = webhook_url.filter(|u| !u.trim().is_empty()) else {
            report.warn(format!(
                "Webhook target url is not configured; leaving webhooks of {} untouched",
                repo
            ));
            return;
        };
        match WebhookReconciler::new(self.provider.as_ref())
            .remove(repo, url)
            .await
        {
            Ok(removal) => report.webhook = Some(removal),
            Err(e) => report.warn(format!("Failed to delete webhook from {}: {}", repo, e)),
        }
    }

    async fn remove_configuration(
        &self,
        repo: &RepositoryRef,
        component: &Component,
        credentials: &Credentials,
    ) -> Result<RemovalOutcome, ProvisionError> {
        let provider = self.provider.as_ref();
        let base_branch = resolve_base_branch(provider, repo).await?;
        let owner = match credentials.app() {
            Some(app) => app.bot_login(),
            None => provider.current_user().await?,
        };

        let settings = &self.config.proposal;
        let branches = BranchNames::for_component(
            component,
            &settings.onboarding_branch_prefix,
            &settings.removal_branch_prefix,
        );
        let removal = ProposalRequest::removal(
            settings,
            component,
            base_branch,
            self.manifests.managed_paths(component),
            credentials.app(),
        );
        ProposalReconciler::new(provider)
            .ensure_removed(repo, &branches.onboarding, owner.as_deref(), &removal)
            .await
    }
}
