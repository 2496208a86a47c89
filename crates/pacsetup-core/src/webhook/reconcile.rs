use crate::error::ProviderError;
use crate::provider::GitProvider;
use crate::repo::RepositoryRef;

use super::WebhookSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    Created { id: u64 },
    /// Existing hook rewritten; `drift` lists the fields that were corrected
    /// besides the secret.
    Updated { id: u64, drift: Vec<&'static str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRemoval {
    Deleted { id: u64 },
    Absent,
}

/// Keeps the webhook for one target URL in its desired state.
pub struct WebhookReconciler<'a> {
    provider: &'a dyn GitProvider,
}

impl<'a> WebhookReconciler<'a> {
    pub fn new(provider: &'a dyn GitProvider) -> Self {
        Self { provider }
    }

    pub async fn reconcile(
        &self,
        repo: &RepositoryRef,
        spec: &WebhookSpec,
    ) -> Result<WebhookAction, ProviderError> {
        let Some(mut hook) = self.provider.find_webhook(repo, &spec.target_url).await? else {
            let created = self.provider.create_webhook(repo, spec).await?;
            tracing::info!(repository = %repo, webhook = created.id, "created webhook");
            return Ok(WebhookAction::Created { id: created.id });
        };

        let drift = if self.provider.can_toggle_webhooks() {
            hook.merge(spec)
        } else {
            if hook.active != spec.active {
                tracing::warn!(
                    repository = %repo,
                    webhook = hook.id,
                    active = hook.active,
                    "provider does not allow switching the webhook on or off; fix it manually"
                );
            }
            let pinned = WebhookSpec {
                active: hook.active,
                ..spec.clone()
            };
            hook.merge(&pinned)
        };
        let updated = self.provider.update_webhook(repo, &hook).await?;
        if drift.is_empty() {
            tracing::debug!(repository = %repo, webhook = updated.id, "refreshed webhook secret");
        } else {
            tracing::info!(
                repository = %repo,
                webhook = updated.id,
                fields = ?drift,
                "updated webhook"
            );
        }
        Ok(WebhookAction::Updated {
            id: updated.id,
            drift,
        })
    }

    /// Delete the hook for `target_url`; an absent hook is success.
    pub async fn remove(
        &self,
        repo: &RepositoryRef,
        target_url: &str,
    ) -> Result<WebhookRemoval, ProviderError> {
        let hook = match self.provider.find_webhook(repo, target_url).await {
            Ok(Some(hook)) => hook,
            Ok(None) | Err(ProviderError::NotFound(_)) => return Ok(WebhookRemoval::Absent),
            Err(e) => return Err(e),
        };
        match self.provider.delete_webhook(repo, &hook).await {
            Ok(()) => {
                tracing::info!(repository = %repo, webhook = hook.id, "deleted webhook");
                Ok(WebhookRemoval::Deleted { id: hook.id })
            }
            Err(ProviderError::NotFound(_)) => Ok(WebhookRemoval::Absent),
            Err(e) => Err(e),
        }
    }
}
