//! Pacsetup Core Library
//!
//! Idempotent propagation of pipeline configuration into hosted git
//! repositories: manifests land through a branch and a pull/merge request,
//! events arrive through a managed webhook, and teardown mirrors both.

pub mod component;
pub mod config;
pub mod credentials;
pub mod error;
pub mod files;
pub mod manifest;
pub mod orchestration;
pub mod proposal;
pub mod provider;
pub mod repo;
pub mod webhook;

/// Re-exports of commonly used types
pub mod prelude {
    // Identity
    pub use crate::component::{BranchNames, Component};
    pub use crate::repo::{ProviderKind, RepositoryRef};

    // Configuration
    pub use crate::config::{ConfigStore, EngineConfig};
    pub use crate::credentials::{AppInstallation, Credentials, Secret};

    // Desired state
    pub use crate::files::{DesiredFileSet, FileChange, FileContent, FileEntry};
    pub use crate::manifest::{DesiredStateSource, LocalManifestSource, ManifestLayout};

    // Providers
    pub use crate::provider::{GitProvider, connect};

    // Reconcilers
    pub use crate::proposal::{ProposalReconciler, ProposalRequest, RemovalAction, RemovalOutcome};
    pub use crate::webhook::{WebhookAction, WebhookReconciler, WebhookRemoval, WebhookSpec};

    // Orchestration
    pub use crate::orchestration::{
        DeprovisionOrchestrator, DeprovisionReport, ProvisionOrchestrator, ProvisionReport,
        WebhookTarget,
    };

    // Errors
    pub use crate::error::{ProviderError, ProvisionError};
}
