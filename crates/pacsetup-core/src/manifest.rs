//! Desired-state providers: where pipeline manifests come from.
//!
//! Manifest content is opaque to the engine. A source only decides which
//! bytes belong at which repository path for a component.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::component::Component;
use crate::config::ManifestSettings;
use crate::error::ProvisionError;
use crate::files::{DesiredFileSet, FileEntry};

/// Repository paths of a component's pipeline manifests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub push: String,
    pub pull_request: String,
}

impl ManifestPaths {
    pub fn all(&self) -> [&str; 2] {
        [self.push.as_str(), self.pull_request.as_str()]
    }
}

/// Naming rules for manifest paths.
#[derive(Debug, Clone)]
pub struct ManifestLayout {
    settings: ManifestSettings,
}

impl ManifestLayout {
    pub fn new(settings: ManifestSettings) -> Self {
        Self { settings }
    }

    pub fn paths(&self, component: &Component) -> ManifestPaths {
        let dir = self.settings.directory.trim_matches('/');
        let expand = |file: &str| {
            let file = file.replace("{component}", &component.name);
            if dir.is_empty() {
                file
            } else {
                format!("{}/{}", dir, file)
            }
        };
        ManifestPaths {
            push: expand(&self.settings.push_file),
            pull_request: expand(&self.settings.pull_request_file),
        }
    }
}

impl Default for ManifestLayout {
    fn default() -> Self {
        Self::new(ManifestSettings::default())
    }
}

/// Produces the files a component's repository must contain.
#[async_trait]
pub trait DesiredStateSource: Send + Sync {
    /// Files for the onboarding proposal targeting `base_branch`.
    async fn desired_files(
        &self,
        component: &Component,
        base_branch: &str,
    ) -> Result<DesiredFileSet, ProvisionError>;

    /// Paths removed on teardown.
    fn managed_paths(&self, component: &Component) -> Vec<String>;
}

/// Path-only source: knows where manifests live but carries no content.
///
/// Enough for teardown, which only needs [`DesiredStateSource::managed_paths`].
#[async_trait]
impl DesiredStateSource for ManifestLayout {
    async fn desired_files(
        &self,
        component: &Component,
        _base_branch: &str,
    ) -> Result<DesiredFileSet, ProvisionError> {
        Err(ProvisionError::DesiredState(format!(
            "no manifest content configured for {}",
            component.name
        )))
    }

    fn managed_paths(&self, component: &Component) -> Vec<String> {
        let paths = self.paths(component);
        vec![paths.push, paths.pull_request]
    }
}

/// Reads the push and pull-request manifests from local files.
#[derive(Debug, Clone)]
pub struct LocalManifestSource {
    layout: ManifestLayout,
    push_manifest: PathBuf,
    pull_request_manifest: PathBuf,
}

impl LocalManifestSource {
    pub fn new(
        layout: ManifestLayout,
        push_manifest: PathBuf,
        pull_request_manifest: PathBuf,
    ) -> Self {
        Self {
            layout,
            push_manifest,
            pull_request_manifest,
        }
    }

    async fn read(path: &Path) -> Result<Vec<u8>, ProvisionError> {
        tokio::fs::read(path).await.map_err(|e| {
            ProvisionError::DesiredState(format!("failed to read {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl DesiredStateSource for LocalManifestSource {
    async fn desired_files(
        &self,
        component: &Component,
        _base_branch: &str,
    ) -> Result<DesiredFileSet, ProvisionError> {
        let paths = self.layout.paths(component);
        let push = Self::read(&self.push_manifest).await?;
        let pull_request = Self::read(&self.pull_request_manifest).await?;
        Ok(DesiredFileSet::from_entries([
            FileEntry::new(paths.push, push),
            FileEntry::new(paths.pull_request, pull_request),
        ]))
    }

    fn managed_paths(&self, component: &Component) -> Vec<String> {
        self.layout.managed_paths(component)
    }
}
