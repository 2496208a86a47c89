//! Managed component identity.

use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::repo::{ProviderKind, RepositoryRef};

/// A component whose source repository receives CI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Declared source URL, e.g. `https://github.com/owner/repo`.
    pub source_url: String,
    /// Declared revision; used as the base branch when set.
    #[serde(default)]
    pub revision: Option<String>,
    /// Explicit provider, for hosts whose name does not reveal it.
    #[serde(default)]
    pub provider: Option<ProviderKind>,
}

impl Component {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            source_url: source_url.into(),
            revision: None,
            provider: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Resolve the repository this component is built from.
    pub fn repository(&self) -> Result<RepositoryRef, ProvisionError> {
        Ok(RepositoryRef::parse(&self.source_url, self.provider)?
            .with_base_branch(self.revision.as_deref()))
    }
}

/// Deterministic branch names for a component's proposals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNames {
    pub onboarding: String,
    pub removal: String,
}

impl BranchNames {
    pub fn for_component(
        component: &Component,
        onboarding_prefix: &str,
        removal_prefix: &str,
    ) -> Self {
        Self {
            onboarding: format!("{}{}", onboarding_prefix, component.name),
            removal: format!("{}{}", removal_prefix, component.name),
        }
    }
}
