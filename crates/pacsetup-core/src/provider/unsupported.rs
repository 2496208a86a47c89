use async_trait::async_trait;

use super::{BranchRef, ChangeProposal, CommitAuthor, GitProvider, NewProposal};
use crate::error::ProviderError;
use crate::files::FileChange;
use crate::repo::{ProviderKind, RepositoryRef};
use crate::webhook::{Webhook, WebhookSpec};

/// Backend for hosts the engine recognizes but cannot drive yet.
///
/// Every operation fails with [`ProviderError::Unsupported`], so callers get
/// a non-retryable error instead of a transport failure.
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedProvider {
    kind: ProviderKind,
}

impl UnsupportedProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }

    fn fail<T>(&self) -> Result<T, ProviderError> {
        Err(ProviderError::Unsupported(self.kind))
    }
}

#[async_trait]
impl GitProvider for UnsupportedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn current_user(&self) -> Result<Option<String>, ProviderError> {
        self.fail()
    }

    async fn default_branch(&self, _repo: &RepositoryRef) -> Result<String, ProviderError> {
        self.fail()
    }

    async fn read_file(
        &self,
        _repo: &RepositoryRef,
        _git_ref: &str,
        _path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        self.fail()
    }

    async fn find_branch(
        &self,
        _repo: &RepositoryRef,
        _branch: &str,
    ) -> Result<Option<BranchRef>, ProviderError> {
        self.fail()
    }

    async fn create_branch(
        &self,
        _repo: &RepositoryRef,
        _branch: &str,
        _from: &str,
    ) -> Result<BranchRef, ProviderError> {
        self.fail()
    }

    async fn commit_changes(
        &self,
        _repo: &RepositoryRef,
        _branch: &str,
        _changes: &[FileChange],
        _author: &CommitAuthor,
        _message: &str,
    ) -> Result<String, ProviderError> {
        self.fail()
    }

    async fn find_open_proposal(
        &self,
        _repo: &RepositoryRef,
        _source_branch: &str,
        _base_branch: &str,
    ) -> Result<Option<ChangeProposal>, ProviderError> {
        self.fail()
    }

    async fn create_proposal(
        &self,
        _repo: &RepositoryRef,
        _proposal: &NewProposal<'_>,
    ) -> Result<ChangeProposal, ProviderError> {
        self.fail()
    }

    async fn close_proposal(
        &self,
        _repo: &RepositoryRef,
        _proposal: &ChangeProposal,
    ) -> Result<(), ProviderError> {
        self.fail()
    }

    async fn delete_branch(
        &self,
        _repo: &RepositoryRef,
        _branch: &str,
    ) -> Result<(), ProviderError> {
        self.fail()
    }

    async fn find_webhook(
        &self,
        _repo: &RepositoryRef,
        _target_url: &str,
    ) -> Result<Option<Webhook>, ProviderError> {
        self.fail()
    }

    async fn create_webhook(
        &self,
        _repo: &RepositoryRef,
        _spec: &WebhookSpec,
    ) -> Result<Webhook, ProviderError> {
        self.fail()
    }

    async fn update_webhook(
        &self,
        _repo: &RepositoryRef,
        _webhook: &Webhook,
    ) -> Result<Webhook, ProviderError> {
        self.fail()
    }

    async fn delete_webhook(
        &self,
        _repo: &RepositoryRef,
        _webhook: &Webhook,
    ) -> Result<(), ProviderError> {
        self.fail()
    }

    async fn check_access(&self, _repo: &RepositoryRef) -> Result<(), ProviderError> {
        self.fail()
    }
}
