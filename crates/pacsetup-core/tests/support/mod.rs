//! In-memory hosting provider for exercising the reconcilers.
//!
//! Every mutating call is appended to a write log so tests can assert that a
//! converged repository sees no further writes.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use pacsetup_core::credentials::Secret;
use pacsetup_core::error::ProviderError;
use pacsetup_core::files::FileChange;
use pacsetup_core::provider::{
    BranchRef, ChangeProposal, CommitAuthor, GitProvider, NewProposal, ProposalState,
};
use pacsetup_core::repo::{ProviderKind, RepositoryRef};
use pacsetup_core::webhook::{Webhook, WebhookSpec};

pub type Files = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
pub struct RecordedCommit {
    pub branch: String,
    pub author: CommitAuthor,
    pub message: String,
    pub changes: Vec<FileChange>,
}

#[derive(Default)]
struct State {
    default_branch: String,
    branches: BTreeMap<String, Files>,
    proposals: Vec<ChangeProposal>,
    webhooks: Vec<Webhook>,
    secrets: BTreeMap<u64, Secret>,
    commits: Vec<RecordedCommit>,
    writes: Vec<String>,
    no_changes_failures: usize,
    denied: bool,
    failing_webhooks: bool,
    user: Option<String>,
    next_id: u64,
}

/// Account the fake's credential belongs to.
pub const USER: &str = "pac-bot";

pub struct FakeProvider {
    kind: ProviderKind,
    toggles_webhooks: bool,
    state: Mutex<State>,
}

impl FakeProvider {
    /// Repository with an empty `main` as default branch.
    pub fn new() -> Self {
        let mut branches = BTreeMap::new();
        branches.insert("main".to_string(), Files::new());
        Self {
            kind: ProviderKind::GitHub,
            toggles_webhooks: true,
            state: Mutex::new(State {
                default_branch: "main".to_string(),
                branches,
                user: Some(USER.to_string()),
                next_id: 1,
                ..State::default()
            }),
        }
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_file(self, branch: &str, path: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .branches
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), content.as_bytes().to_vec());
        self
    }

    pub fn with_branch(self, branch: &str, from: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let files = state.branches.get(from).cloned().unwrap_or_default();
            state.branches.insert(branch.to_string(), files);
        }
        self
    }

    pub fn with_default_branch(self, branch: &str) -> Self {
        self.state.lock().unwrap().default_branch = branch.to_string();
        self
    }

    pub fn with_open_proposal(self, source: &str, base: &str) -> Self {
        let user = self.state.lock().unwrap().user.clone();
        self.with_proposal_by(source, base, user.as_deref())
    }

    /// Open proposal on `source` opened by `author` rather than the fake's user.
    pub fn with_proposal_by(self, source: &str, base: &str, author: Option<&str>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let number = state.next_id;
            state.next_id += 1;
            let mut existing = proposal(number, source, base, "existing");
            existing.author = author.map(str::to_string);
            state.proposals.push(existing);
        }
        self
    }

    /// Credential whose account the provider cannot name.
    pub fn without_user(self) -> Self {
        self.state.lock().unwrap().user = None;
        self
    }

    /// Backend that cannot switch a hook back on, like GitLab.
    pub fn with_fixed_webhook_activity(mut self) -> Self {
        self.toggles_webhooks = false;
        self
    }

    pub fn with_webhook(
        self,
        url: &str,
        events: &[&str],
        content_type: &str,
        active: bool,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.webhooks.push(Webhook {
                id,
                target_url: url.to_string(),
                events: events.iter().map(|e| e.to_string()).collect(),
                content_type: content_type.to_string(),
                insecure_ssl: true,
                active,
                secret: None,
            });
        }
        self
    }

    /// Make the next `count` proposal creations fail with "no changes".
    pub fn failing_proposals(self, count: usize) -> Self {
        self.state.lock().unwrap().no_changes_failures = count;
        self
    }

    pub fn denying_access(self) -> Self {
        self.state.lock().unwrap().denied = true;
        self
    }

    pub fn failing_webhooks(self) -> Self {
        self.state.lock().unwrap().failing_webhooks = true;
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn count_writes(&self, prefix: &str) -> usize {
        self.writes().iter().filter(|w| w.starts_with(prefix)).count()
    }

    pub fn branch(&self, name: &str) -> Option<Files> {
        self.state.lock().unwrap().branches.get(name).cloned()
    }

    pub fn proposals(&self) -> Vec<ChangeProposal> {
        self.state.lock().unwrap().proposals.clone()
    }

    pub fn commits(&self) -> Vec<RecordedCommit> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn webhooks(&self) -> Vec<Webhook> {
        self.state.lock().unwrap().webhooks.clone()
    }

    pub fn secret_of(&self, id: u64) -> Option<Secret> {
        self.state.lock().unwrap().secrets.get(&id).cloned()
    }

    /// Merge an open proposal the way a maintainer would, keeping its branch.
    pub fn merge_proposal(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.proposals.iter().position(|p| p.web_url == url) else {
            panic!("no proposal {}", url);
        };
        let source = state.proposals[index].source_branch.clone();
        let base = state.proposals[index].base_branch.clone();
        let files = state.branches.get(&source).cloned().unwrap_or_default();
        state.branches.insert(base, files);
        state.proposals[index].state = ProposalState::Merged;
    }
}

fn proposal(number: u64, source: &str, base: &str, title: &str) -> ChangeProposal {
    ChangeProposal {
        number,
        source_branch: source.to_string(),
        base_branch: base.to_string(),
        title: title.to_string(),
        web_url: format!("https://git.example.com/acme/app/pull/{}", number),
        state: ProposalState::Open,
        author: None,
    }
}

fn not_found(what: String) -> ProviderError {
    ProviderError::NotFound(what)
}

#[async_trait]
impl GitProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn can_toggle_webhooks(&self) -> bool {
        self.toggles_webhooks
    }

    async fn current_user(&self) -> Result<Option<String>, ProviderError> {
        Ok(self.state.lock().unwrap().user.clone())
    }

    async fn default_branch(&self, _repo: &RepositoryRef) -> Result<String, ProviderError> {
        let state = self.state.lock().unwrap();
        if state.default_branch.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "repository reports no default branch".to_string(),
            ));
        }
        Ok(state.default_branch.clone())
    }

    async fn read_file(
        &self,
        _repo: &RepositoryRef,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .branches
            .get(git_ref)
            .and_then(|files| files.get(path))
            .cloned())
    }

    async fn find_branch(
        &self,
        _repo: &RepositoryRef,
        branch: &str,
    ) -> Result<Option<BranchRef>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(state.branches.get(branch).map(|files| BranchRef {
            name: branch.to_string(),
            sha: format!("{}@{}", branch, files.len()),
        }))
    }

    async fn create_branch(
        &self,
        _repo: &RepositoryRef,
        branch: &str,
        from: &str,
    ) -> Result<BranchRef, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("create_branch:{}", branch));
        if !state.branches.contains_key(branch) {
            let files = state
                .branches
                .get(from)
                .cloned()
                .ok_or_else(|| not_found(format!("branch {}", from)))?;
            state.branches.insert(branch.to_string(), files);
        }
        let len = state.branches.get(branch).map_or(0, |f| f.len());
        Ok(BranchRef {
            name: branch.to_string(),
            sha: format!("{}@{}", branch, len),
        })
    }

    async fn commit_changes(
        &self,
        _repo: &RepositoryRef,
        branch: &str,
        changes: &[FileChange],
        author: &CommitAuthor,
        message: &str,
    ) -> Result<String, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("commit:{}", branch));
        let files = state
            .branches
            .get_mut(branch)
            .ok_or_else(|| not_found(format!("branch {}", branch)))?;
        for change in changes {
            match change {
                FileChange::Create { path, content } | FileChange::Update { path, content } => {
                    files.insert(path.clone(), content.clone());
                }
                FileChange::Delete { path } => {
                    files.remove(path);
                }
            }
        }
        state.commits.push(RecordedCommit {
            branch: branch.to_string(),
            author: author.clone(),
            message: message.to_string(),
            changes: changes.to_vec(),
        });
        Ok(format!("commit-{}", state.commits.len()))
    }

    async fn find_open_proposal(
        &self,
        _repo: &RepositoryRef,
        source_branch: &str,
        base_branch: &str,
    ) -> Result<Option<ChangeProposal>, ProviderError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .proposals
            .iter()
            .find(|p| {
                p.state == ProposalState::Open
                    && p.source_branch == source_branch
                    && p.base_branch == base_branch
            })
            .cloned())
    }

    async fn create_proposal(
        &self,
        _repo: &RepositoryRef,
        new: &NewProposal<'_>,
    ) -> Result<ChangeProposal, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("create_proposal:{}", new.source_branch));
        let no_changes = || ProviderError::NoChanges {
            source_branch: new.source_branch.to_string(),
            base_branch: new.base_branch.to_string(),
        };
        if state.no_changes_failures > 0 {
            state.no_changes_failures -= 1;
            return Err(no_changes());
        }
        if state.branches.get(new.source_branch) == state.branches.get(new.base_branch) {
            return Err(no_changes());
        }
        let number = state.next_id;
        state.next_id += 1;
        let mut created = proposal(number, new.source_branch, new.base_branch, new.title);
        created.author = state.user.clone();
        state.proposals.push(created.clone());
        Ok(created)
    }

    async fn close_proposal(
        &self,
        _repo: &RepositoryRef,
        target: &ChangeProposal,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("close_proposal:{}", target.number));
        let found = state
            .proposals
            .iter_mut()
            .find(|p| p.number == target.number)
            .ok_or_else(|| not_found(format!("proposal {}", target.number)))?;
        found.state = ProposalState::Closed;
        Ok(())
    }

    async fn delete_branch(
        &self,
        _repo: &RepositoryRef,
        branch: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("delete_branch:{}", branch));
        state
            .branches
            .remove(branch)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("branch {}", branch)))
    }

    async fn find_webhook(
        &self,
        _repo: &RepositoryRef,
        target_url: &str,
    ) -> Result<Option<Webhook>, ProviderError> {
        let state = self.state.lock().unwrap();
        if state.failing_webhooks {
            return Err(ProviderError::Api {
                method: "GET".to_string(),
                endpoint: "/hooks".to_string(),
                status: 500,
                message: "internal error".to_string(),
            });
        }
        Ok(state
            .webhooks
            .iter()
            .find(|h| h.target_url == target_url)
            .cloned())
    }

    async fn create_webhook(
        &self,
        _repo: &RepositoryRef,
        spec: &WebhookSpec,
    ) -> Result<Webhook, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("create_webhook:{}", spec.target_url));
        let id = state.next_id;
        state.next_id += 1;
        let hook = Webhook {
            id,
            target_url: spec.target_url.clone(),
            events: spec.events.clone(),
            content_type: spec.content_type.clone(),
            insecure_ssl: spec.insecure_ssl,
            active: spec.active,
            secret: None,
        };
        state.secrets.insert(id, spec.secret.clone());
        state.webhooks.push(hook.clone());
        Ok(hook)
    }

    async fn update_webhook(
        &self,
        _repo: &RepositoryRef,
        webhook: &Webhook,
    ) -> Result<Webhook, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("update_webhook:{}", webhook.id));
        if let Some(secret) = &webhook.secret {
            state.secrets.insert(webhook.id, secret.clone());
        }
        let stored = state
            .webhooks
            .iter_mut()
            .find(|h| h.id == webhook.id)
            .ok_or_else(|| not_found(format!("webhook {}", webhook.id)))?;
        *stored = Webhook {
            secret: None,
            ..webhook.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_webhook(
        &self,
        _repo: &RepositoryRef,
        webhook: &Webhook,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(format!("delete_webhook:{}", webhook.id));
        let before = state.webhooks.len();
        state.webhooks.retain(|h| h.id != webhook.id);
        if state.webhooks.len() == before {
            return Err(not_found(format!("webhook {}", webhook.id)));
        }
        state.secrets.remove(&webhook.id);
        Ok(())
    }

    async fn check_access(&self, repo: &RepositoryRef) -> Result<(), ProviderError> {
        if self.state.lock().unwrap().denied {
            return Err(ProviderError::NotAccessible(format!(
                "Resource not accessible by integration: {}",
                repo.full_name()
            )));
        }
        Ok(())
    }
}

pub fn repository() -> RepositoryRef {
    RepositoryRef::parse("https://github.com/acme/app", None).unwrap()
}
