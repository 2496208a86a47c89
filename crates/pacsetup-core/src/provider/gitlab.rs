//! GitLab REST backend.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::http::{HttpApi, PER_PAGE, optional};
use super::{BranchRef, ChangeProposal, CommitAuthor, GitProvider, NewProposal, ProposalState};
use crate::credentials::Credentials;
use crate::error::ProviderError;
use crate::files::FileChange;
use crate::repo::{ProviderKind, RepositoryRef};
use crate::webhook::{CONTENT_TYPE_JSON, Webhook, WebhookSpec};

/// Event names and the project hook flag that delivers them.
///
/// Several names may share a flag; GitLab reports all comments as notes.
const EVENT_FLAGS: &[(&str, &str)] = &[
    ("push", "push_events"),
    ("pull_request", "merge_requests_events"),
    ("issue_comment", "note_events"),
    ("commit_comment", "note_events"),
    ("tag_push", "tag_push_events"),
    ("issues", "issues_events"),
    ("pipeline", "pipeline_events"),
    ("job", "job_events"),
    ("wiki_page", "wiki_page_events"),
    ("release", "releases_events"),
    ("confidential_issues", "confidential_issues_events"),
    ("confidential_note", "confidential_note_events"),
    ("deployment", "deployment_events"),
];

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    name: String,
    commit: CommitId,
}

#[derive(Debug, Deserialize)]
struct CommitId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    commits: Vec<Value>,
    #[serde(default)]
    diffs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    iid: u64,
    title: String,
    web_url: String,
    state: String,
    source_branch: String,
    target_branch: String,
    #[serde(default)]
    author: Option<UserResponse>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    username: String,
}

impl From<MergeRequestResponse> for ChangeProposal {
    fn from(mr: MergeRequestResponse) -> Self {
        let state = match mr.state.as_str() {
            "opened" => ProposalState::Open,
            "merged" => ProposalState::Merged,
            _ => ProposalState::Closed,
        };
        ChangeProposal {
            number: mr.iid,
            source_branch: mr.source_branch,
            base_branch: mr.target_branch,
            title: mr.title,
            web_url: mr.web_url,
            state,
            author: mr.author.map(|user| user.username),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HookResponse {
    id: u64,
    url: String,
    #[serde(default)]
    enable_ssl_verification: bool,
    alert_status: Option<String>,
    #[serde(flatten)]
    flags: Map<String, Value>,
}

impl From<HookResponse> for Webhook {
    fn from(hook: HookResponse) -> Self {
        let events = EVENT_FLAGS
            .iter()
            .filter(|(_, flag)| hook.flags.get(*flag).and_then(Value::as_bool) == Some(true))
            .map(|(event, _)| event.to_string())
            .collect();
        Webhook {
            id: hook.id,
            target_url: hook.url,
            events,
            content_type: CONTENT_TYPE_JSON.to_string(),
            insecure_ssl: !hook.enable_ssl_verification,
            active: hook.alert_status.as_deref() != Some("disabled"),
            secret: None,
        }
    }
}

/// GitLab.com or a self-managed instance.
#[derive(Debug, Clone)]
pub struct GitLabProvider {
    api: HttpApi,
}

impl GitLabProvider {
    pub fn new(base_url: &str, credentials: &Credentials) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!(
            "Bearer {}",
            credentials.access_token().expose()
        ))
        .map_err(|_| ProviderError::InvalidResponse("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(Self {
            api: HttpApi::new(base_url, headers)?,
        })
    }

    /// Project endpoints are addressed by the encoded `namespace/name` path.
    fn project_url(&self, repo: &RepositoryRef, rest: &[&str]) -> url::Url {
        let project = repo.full_name();
        let mut segments = vec!["projects", project.as_str()];
        segments.extend_from_slice(rest);
        self.api.url(&segments)
    }

    fn hook_body(
        events: &[String],
        url: &str,
        secret: Option<&str>,
        insecure_ssl: bool,
    ) -> Value {
        let mut body = Map::new();
        body.insert("url".into(), Value::String(url.to_string()));
        body.insert("enable_ssl_verification".into(), Value::Bool(!insecure_ssl));
        for (event, flag) in EVENT_FLAGS {
            let enabled = events.iter().any(|e| e == event);
            let entry = body.entry(flag.to_string()).or_insert(Value::Bool(false));
            if enabled {
                *entry = Value::Bool(true);
            }
        }
        if let Some(secret) = secret {
            body.insert("token".into(), Value::String(secret.to_string()));
        }
        Value::Object(body)
    }

    /// Whether `source` carries anything `base` does not.
    async fn has_changes(
        &self,
        repo: &RepositoryRef,
        base: &str,
        source: &str,
    ) -> Result<bool, ProviderError> {
        let url = self.project_url(repo, &["repository", "compare"]);
        let compare: CompareResponse = self
            .api
            .send_json(
                self.api
                    .request(Method::GET, url)
                    .query(&[("from", base), ("to", source), ("straight", "false")]),
            )
            .await?;
        Ok(!compare.commits.is_empty() && !compare.diffs.is_empty())
    }
}

#[async_trait]
impl GitProvider for GitLabProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    /// GitLab disables failing hooks on its own and offers no field to
    /// re-enable them.
    fn can_toggle_webhooks(&self) -> bool {
        false
    }

    async fn current_user(&self) -> Result<Option<String>, ProviderError> {
        let url = self.api.url(&["user"]);
        let user: UserResponse = self
            .api
            .send_json(self.api.request(Method::GET, url))
            .await?;
        Ok(Some(user.username))
    }

    async fn default_branch(&self, repo: &RepositoryRef) -> Result<String, ProviderError> {
        let url = self.project_url(repo, &[]);
        let project: ProjectResponse = self
            .api
            .send_json(self.api.request(Method::GET, url))
            .await?;
        project
            .default_branch
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!(
                    "project {} reports no default branch",
                    repo.full_name()
                ))
            })
    }

    async fn read_file(
        &self,
        repo: &RepositoryRef,
        git_ref: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ProviderError> {
        let url = self.project_url(repo, &["repository", "files", path, "raw"]);
        let request = self
            .api
            .request(Method::GET, url)
            .query(&[("ref", git_ref)]);
        let Some(response) = optional(self.api.send(request).await)? else {
            return Ok(None);
        };
        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn find_branch(
        &self,
        repo: &RepositoryRef,
        branch: &str,
    ) -> Result<Option<BranchRef>, ProviderError> {
        let url = self.project_url(repo, &["repository", "branches", branch]);
        let found: Option<BranchResponse> =
            optional(self.api.send_json(self.api.request(Method::GET, url)).await)?;
        Ok(found.map(|b| BranchRef {
            name: b.name,
            sha: b.commit.id,
        }))
    }

    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        from: &str,
    ) -> Result<BranchRef, ProviderError> {
        let url = self.project_url(repo, &["repository", "branches"]);
        let request = self
            .api
            .request(Method::POST, url)
            .query(&[("branch", branch), ("ref", from)]);
        match self.api.send_json::<BranchResponse>(request).await {
            Ok(created) => Ok(BranchRef {
                name: created.name,
                sha: created.commit.id,
            }),
            Err(ProviderError::Api {
                status: 400,
                ref message,
                ..
            }) if message.contains("already exists") => {
                tracing::debug!(branch, "branch already exists, reusing it");
                self.find_branch(repo, branch)
                    .await?
                    .ok_or_else(|| ProviderError::NotFound(format!("branch {}", branch)))
            }
            Err(e) => Err(e),
        }
    }

    async fn commit_changes(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        changes: &[FileChange],
        author: &CommitAuthor,
        message: &str,
    ) -> Result<String, ProviderError> {
        let actions: Vec<Value> = changes
            .iter()
            .map(|change| match change {
                FileChange::Create { path, content } => json!({
                    "action": "create",
                    "file_path": path,
                    "content": BASE64.encode(content),
                    "encoding": "base64",
                }),
                FileChange::Update { path, content } => json!({
                    "action": "update",
                    "file_path": path,
                    "content": BASE64.encode(content),
                    "encoding": "base64",
                }),
                FileChange::Delete { path } => json!({
                    "action": "delete",
                    "file_path": path,
                }),
            })
            .collect();

        let url = self.project_url(repo, &["repository", "commits"]);
        let body = json!({
            "branch": branch,
            "commit_message": message,
            "author_name": author.name,
            "author_email": author.email,
            "actions": actions,
        });
        let commit: CommitId = self
            .api
            .send_json(self.api.request(Method::POST, url).json(&body))
            .await?;
        Ok(commit.id)
    }

    async fn find_open_proposal(
        &self,
        repo: &RepositoryRef,
        source_branch: &str,
        base_branch: &str,
    ) -> Result<Option<ChangeProposal>, ProviderError> {
        let url = self.project_url(repo, &["merge_requests"]);
        let requests: Vec<MergeRequestResponse> = self
            .api
            .send_json(self.api.request(Method::GET, url).query(&[
                ("state", "opened"),
                ("source_branch", source_branch),
                ("target_branch", base_branch),
            ]))
            .await?;
        Ok(requests.into_iter().next().map(ChangeProposal::from))
    }

    async fn create_proposal(
        &self,
        repo: &RepositoryRef,
        proposal: &NewProposal<'_>,
    ) -> Result<ChangeProposal, ProviderError> {
        // GitLab happily opens empty merge requests.
        if !self
            .has_changes(repo, proposal.base_branch, proposal.source_branch)
            .await?
        {
            return Err(ProviderError::NoChanges {
                source_branch: proposal.source_branch.to_string(),
                base_branch: proposal.base_branch.to_string(),
            });
        }

        let url = self.project_url(repo, &["merge_requests"]);
        let body = json!({
            "source_branch": proposal.source_branch,
            "target_branch": proposal.base_branch,
            "title": proposal.title,
            "description": proposal.body,
            "remove_source_branch": true,
        });
        match self
            .api
            .send_json::<MergeRequestResponse>(self.api.request(Method::POST, url).json(&body))
            .await
        {
            Ok(mr) => Ok(mr.into()),
            Err(ProviderError::Api {
                status: 409,
                ref message,
                ..
            }) if message.contains("already exists") => self
                .find_open_proposal(repo, proposal.source_branch, proposal.base_branch)
                .await?
                .ok_or_else(|| ProviderError::InvalidResponse(message.clone())),
            Err(e) => Err(e),
        }
    }

    async fn close_proposal(
        &self,
        repo: &RepositoryRef,
        proposal: &ChangeProposal,
    ) -> Result<(), ProviderError> {
        let iid = proposal.number.to_string();
        let url = self.project_url(repo, &["merge_requests", iid.as_str()]);
        self.api
            .send(
                self.api
                    .request(Method::PUT, url)
                    .json(&json!({ "state_event": "close" })),
            )
            .await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &RepositoryRef, branch: &str) -> Result<(), ProviderError> {
        let url = self.project_url(repo, &["repository", "branches", branch]);
        self.api
            .send(self.api.request(Method::DELETE, url))
            .await
            .map_err(|e| match e {
                ProviderError::NotFound(_) => ProviderError::NotFound(format!("branch {}", branch)),
                other => other,
            })?;
        Ok(())
    }

    async fn find_webhook(
        &self,
        repo: &RepositoryRef,
        target_url: &str,
    ) -> Result<Option<Webhook>, ProviderError> {
        let per_page = PER_PAGE.to_string();
        let mut page = 1usize;
        loop {
            let url = self.project_url(repo, &["hooks"]);
            let page_str = page.to_string();
            let hooks: Vec<HookResponse> = self
                .api
                .send_json(
                    self.api
                        .request(Method::GET, url)
                        .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]),
                )
                .await?;
            let count = hooks.len();
            if let Some(hook) = hooks.into_iter().find(|h| h.url == target_url) {
                return Ok(Some(hook.into()));
            }
            if count < PER_PAGE {
                return Ok(None);
            }
            page += 1;
        }
    }

    async fn create_webhook(
        &self,
        repo: &RepositoryRef,
        spec: &WebhookSpec,
    ) -> Result<Webhook, ProviderError> {
        let url = self.project_url(repo, &["hooks"]);
        let body = Self::hook_body(
            &spec.events,
            &spec.target_url,
            Some(spec.secret.expose()),
            spec.insecure_ssl,
        );
        let hook: HookResponse = self
            .api
            .send_json(self.api.request(Method::POST, url).json(&body))
            .await?;
        Ok(hook.into())
    }

    async fn update_webhook(
        &self,
        repo: &RepositoryRef,
        webhook: &Webhook,
    ) -> Result<Webhook, ProviderError> {
        let id = webhook.id.to_string();
        let url = self.project_url(repo, &["hooks", id.as_str()]);
        let body = Self::hook_body(
            &webhook.events,
            &webhook.target_url,
            webhook.secret.as_ref().map(|s| s.expose()),
            webhook.insecure_ssl,
        );
        let hook: HookResponse = self
            .api
            .send_json(self.api.request(Method::PUT, url).json(&body))
            .await?;
        Ok(hook.into())
    }

    async fn delete_webhook(
        &self,
        repo: &RepositoryRef,
        webhook: &Webhook,
    ) -> Result<(), ProviderError> {
        let id = webhook.id.to_string();
        let url = self.project_url(repo, &["hooks", id.as_str()]);
        self.api.send(self.api.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
