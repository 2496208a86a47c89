//! Provision/deprovision orchestration for one component.

pub mod deprovision;
pub mod provision;

use crate::credentials::{Credentials, Secret};
use crate::error::{ProviderError, ProvisionError};
use crate::provider::GitProvider;
use crate::repo::RepositoryRef;

pub use deprovision::{DeprovisionOrchestrator, DeprovisionReport};
pub use provision::{ProvisionOrchestrator, ProvisionReport};

/// Where the managed webhook delivers events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTarget {
    pub url: String,
    pub secret: Secret,
}

impl WebhookTarget {
    pub fn new(url: impl Into<String>, secret: impl Into<Secret>) -> Self {
        Self {
            url: url.into(),
            secret: secret.into(),
        }
    }
}

/// Explicit override if it exists in the repository, else the default branch.
async fn resolve_base_branch(
    provider: &dyn GitProvider,
    repo: &RepositoryRef,
) -> Result<String, ProvisionError> {
    let Some(branch) = &repo.base_branch else {
        return Ok(provider.default_branch(repo).await?);
    };
    if !provider.branch_exists(repo, branch).await? {
        return Err(ProvisionError::MissingBaseBranch {
            branch: branch.clone(),
            repository: repo.full_name(),
        });
    }
    Ok(branch.clone())
}

/// Re-raise an installed application's permission failure with guidance.
fn permission_error(
    err: ProvisionError,
    credentials: &Credentials,
    repo: &RepositoryRef,
) -> ProvisionError {
    match (err, credentials.app()) {
        (ProvisionError::Provider(ProviderError::NotAccessible(_)), Some(app)) => {
            ProvisionError::AppNotInstalled {
                app_id: app.app_id,
                repository: repo.full_name(),
            }
        }
        (err, _) => err,
    }
}
