//! Error taxonomy for provider calls and engine invocations.
//!
//! `ProviderError` is what a hosting backend reports. `ProvisionError` is what
//! an orchestrator invocation reports to its caller; configuration problems are
//! separated from transient remote failures so callers know whether to retry.

use crate::repo::ProviderKind;

/// Failure reported by a [`crate::provider::GitProvider`] backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The addressed object (file, branch, proposal, webhook) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A proposal could not be opened because source and base do not differ.
    #[error("no changes between {source_branch} and {base_branch}")]
    NoChanges {
        source_branch: String,
        base_branch: String,
    },

    /// The credential is valid but cannot reach the repository.
    #[error("resource not accessible: {0}")]
    NotAccessible(String),

    /// The hosting provider has no backend.
    #[error("git provider {0} is not supported")]
    Unsupported(ProviderKind),

    /// Any other non-success response from the hosting API.
    #[error("{method} {endpoint} failed with HTTP {status}: {message}")]
    Api {
        method: String,
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure of a provisioning or deprovisioning invocation.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("unsupported git provider: {0}")]
    UnsupportedProvider(String),

    #[error("invalid repository url '{url}': {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("webhook target url is not configured")]
    MissingWebhookTarget,

    /// Writing an empty secret would leave deliveries unsigned.
    #[error("webhook secret is not configured")]
    MissingWebhookSecret,

    #[error("base branch {branch} does not exist in {repository}")]
    MissingBaseBranch { branch: String, repository: String },

    #[error("application {app_id} is not installed for repository {repository}")]
    AppNotInstalled { app_id: u64, repository: String },

    #[error("branch {branch} still has no changes against {base_branch} after recreating it")]
    StaleBranch { branch: String, base_branch: String },

    #[error("failed to produce desired files: {0}")]
    DesiredState(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ProvisionError {
    /// Whether re-invoking without operator intervention can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisionError::UnsupportedProvider(_)
            | ProvisionError::InvalidRepositoryUrl { .. }
            | ProvisionError::InvalidCredentials(_)
            | ProvisionError::MissingWebhookTarget
            | ProvisionError::MissingWebhookSecret
            | ProvisionError::MissingBaseBranch { .. }
            | ProvisionError::AppNotInstalled { .. } => false,
            ProvisionError::Provider(ProviderError::Unsupported(_)) => false,
            ProvisionError::StaleBranch { .. }
            | ProvisionError::DesiredState(_)
            | ProvisionError::Provider(_) => true,
        }
    }
}
