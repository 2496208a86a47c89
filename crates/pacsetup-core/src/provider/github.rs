//! GitHub REST backend.
//!
//! Commits are built through the git data API (blobs, trees, commits, refs)
//! so that several files land in a single commit and the branch is only ever
//! fast-forwarded.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};

use super::http::{HttpApi, PER_PAGE, optional};
use super::{BranchRef, ChangeProposal, CommitAuthor, GitProvider, NewProposal, ProposalState};
use crate::credentials::Credentials;
use crate::error::ProviderError;
use crate::files::FileChange;
use crate::repo::{ProviderKind, RepositoryRef};
use crate::webhook::{Webhook, WebhookSpec};

const API_VERSION: &str = "2022-11-28";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const NOT_ACCESSIBLE_SIGNAL: &str = "Resource not accessible by integration";

#[derive(Debug, Deserialize)]
struct RepoResponse {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    html_url: String,
    title: String,
    state: String,
    merged_at: Option<String>,
    head: PullRequestRef,
    base: PullRequestRef,
    #[serde(default)]
    user: Option<UserResponse>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    #[serde(rename = "ref")]
    name: String,
}

impl From<PullRequestResponse> for ChangeProposal {
    fn from(pr: PullRequestResponse) -> Self {
        let state = if pr.merged_at.is_some() {
            ProposalState::Merged
        } else if pr.state == "open" {
            ProposalState::Open
        } else {
            ProposalState::Closed
        };
        ChangeProposal {
            number: pr.number,
            source_branch: pr.head.name,
            base_branch: pr.base.name,
            title: pr.title,
            web_url: pr.html_url,
            state,
            author: pr.user.map(|user| user.login),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HookResponse {
    id: u64,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    config: HookConfig,
}

#[derive(Debug, Default, Deserialize)]
struct HookConfig {
    url: Option<String>,
    content_type: Option<String>,
    /// `"0"`/`"1"` as a string, occasionally a number.
    insecure_ssl: Option<Value>,
}

impl From<HookResponse> for Webhook {
    fn from(hook: HookResponse) -> Self {
        let insecure_ssl = match hook.config.insecure_ssl {
            Some(Value::String(s)) => s == "1",
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            Some(Value::Bool(b)) => b,
            _ => false,
        };
        Webhook {
            id: hook.id,
            target_url: hook.config.url.unwrap_or_default(),
            events: hook.events,
            content_type: hook
                .config
                .content_type
                .unwrap_or_else(|| "form".to_string()),
            insecure_ssl,
            active: hook.active,
            secret: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstallationRepositories {
    repositories: Vec<InstallationRepository>,
}

#[derive(Debug, Deserialize)]
struct InstallationRepository {
    full_name: String,
}

/// GitHub or GitHub Enterprise.
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    api: HttpApi,
    /// Authenticated as an installed application rather than a user token.
    app: bool,
}

impl GitHubProvider {
    pub fn new(base_url: &str, credentials: &Credentials) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!(
            "Bearer {}",
            credentials.access_token().expose()
        ))
        .map_err(|_| ProviderError::InvalidResponse("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static(API_VERSION),
        );
        Ok(Self {
            api: HttpApi::new(base_url, headers)?,
            app: credentials.is_app(),
        })
    }

    fn repo_url(&self, repo: &RepositoryRef, rest: &[&str]) -> url::Url {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        self.api.url(&segments)
    }

    /// Map provider-specific failure signals onto the shared taxonomy.
    fn classify(err: ProviderError) -> ProviderError {
        match err {
            ProviderError::Api {
                status: 403,
                ref message,
                ..
            } if message.contains(NOT_ACCESSIBLE_SIGNAL) => {
                ProviderError::NotAccessible(message.clone())
            }
            other => other,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ProviderError> {
        self.api.send(request).await.map_err(Self::classify)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        self.api.send_json(request).await.map_err(Self::classify)
    }

    async fn branch_tip(
        &self,
        repo: &RepositoryRef,
        branch: &str,
    ) -> Result<String, ProviderError> {
        let mut rest = vec!["git", "ref", "heads"];
        rest.extend(branch.split('/'));
        let url = self.repo_url(repo, &rest);
        let reference: RefResponse = self.send_json(self.api.request(Method::GET, url)).await?;
        Ok(reference.object.sha)
    }

    async fn create_blob(
        &self,
        repo: &RepositoryRef,
        content: &[u8],
    ) -> Result<String, ProviderError> {
        let url = self.repo_url(repo, &["git", "blobs"]);
        let body = json!({ "content": BASE64.encode(content), "encoding": "base64" });
        let blob: ShaResponse = self
            .send_json(self.api.request(Method::POST, url).json(&body))
            .await?;
        Ok(blob.sha)
    }

    fn hook_body(
        events: &[String],
        url: &str,
        content_type: &str,
        secret: Option<&str>,
        insecure_ssl: bool,
        active: bool,
    ) -> Value {
        let mut config = json!({
            "url": url,
            "content_type": content_type,
            "insecure_ssl": if insecure_ssl { "1" } else { "0" },
        });
        if let Some(secret) = secret {
            config["secret"] = Value::String(secret.to_string());
        }
        json!({
            "active": active,
            "events": events,
            "config": config,
        })
    }
}

#[async_trait]
impl GitProvider for GitHubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn default_branch(&self, repo: &RepositoryRef) -> Result<String, ProviderError> {
        let url = self.repo_url(repo, &[]);
        let info: RepoResponse = self.send_json(self.api.request(Method::GET, url)).await?;
        info.default_branch
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!(
                    "repository {} reports no default branch",
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
        let mut rest = vec!["contents"];
        rest.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.repo_url(repo, &rest);
        let request = self
            .api
            .request(Method::GET, url)
            .query(&[("ref", git_ref)])
            .header(ACCEPT, RAW_MEDIA_TYPE);
        let Some(response) = optional(self.send(request).await)? else {
            return Ok(None);
        };
        let bytes = response.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }

    async fn find_branch(
        &self,
        repo: &RepositoryRef,
        branch: &str,
    ) -> Result<Option<BranchRef>, ProviderError> {
        Ok(optional(self.branch_tip(repo, branch).await)?.map(|sha| BranchRef {
            name: branch.to_string(),
            sha,
        }))
    }

    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        from: &str,
    ) -> Result<BranchRef, ProviderError> {
        let sha = self.branch_tip(repo, from).await?;
        let url = self.repo_url(repo, &["git", "refs"]);
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": sha });
        match self.send(self.api.request(Method::POST, url).json(&body)).await {
            Ok(_) => Ok(BranchRef {
                name: branch.to_string(),
                sha,
            }),
            Err(ProviderError::Api {
                status: 422,
                ref message,
                ..
            }) if message.contains("Reference already exists") => {
                tracing::debug!(branch, "branch already exists, reusing it");
                Ok(BranchRef {
                    name: branch.to_string(),
                    sha: self.branch_tip(repo, branch).await?,
                })
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
        let parent = self.branch_tip(repo, branch).await?;
        let commit_url = self.repo_url(repo, &["git", "commits", parent.as_str()]);
        let parent_commit: CommitResponse = self
            .send_json(self.api.request(Method::GET, commit_url))
            .await?;

        let mut tree = Vec::with_capacity(changes.len());
        for change in changes {
            let entry = match change {
                FileChange::Create { path, content } | FileChange::Update { path, content } => {
                    let sha = self.create_blob(repo, content).await?;
                    json!({ "path": path, "mode": "100644", "type": "blob", "sha": sha })
                }
                FileChange::Delete { path } => {
                    json!({ "path": path, "mode": "100644", "type": "blob", "sha": Value::Null })
                }
            };
            tree.push(entry);
        }

        let tree_url = self.repo_url(repo, &["git", "trees"]);
        let new_tree: ShaResponse = self
            .send_json(
                self.api
                    .request(Method::POST, tree_url)
                    .json(&json!({ "base_tree": parent_commit.tree.sha, "tree": tree })),
            )
            .await?;

        let commits_url = self.repo_url(repo, &["git", "commits"]);
        let signature = json!({
            "name": author.name,
            "email": author.email,
            "date": chrono::Utc::now().to_rfc3339(),
        });
        let commit: ShaResponse = self
            .send_json(self.api.request(Method::POST, commits_url).json(&json!({
                "message": message,
                "tree": new_tree.sha,
                "parents": [parent],
                "author": signature,
                "committer": signature,
            })))
            .await?;

        let mut rest = vec!["git", "refs", "heads"];
        rest.extend(branch.split('/'));
        let ref_url = self.repo_url(repo, &rest);
        self.send(
            self.api
                .request(Method::PATCH, ref_url)
                .json(&json!({ "sha": commit.sha, "force": false })),
        )
        .await?;

        Ok(commit.sha)
    }

    async fn find_open_proposal(
        &self,
        repo: &RepositoryRef,
        source_branch: &str,
        base_branch: &str,
    ) -> Result<Option<ChangeProposal>, ProviderError> {
        let url = self.repo_url(repo, &["pulls"]);
        let head = format!("{}:{}", repo.owner, source_branch);
        let pulls: Vec<PullRequestResponse> = self
            .send_json(self.api.request(Method::GET, url).query(&[
                ("state", "open"),
                ("head", head.as_str()),
                ("base", base_branch),
            ]))
            .await?;
        Ok(pulls
            .into_iter()
            .map(ChangeProposal::from)
            .find(|pr| pr.source_branch == source_branch && pr.base_branch == base_branch))
    }

    async fn create_proposal(
        &self,
        repo: &RepositoryRef,
        proposal: &NewProposal<'_>,
    ) -> Result<ChangeProposal, ProviderError> {
        let url = self.repo_url(repo, &["pulls"]);
        let body = json!({
            "title": proposal.title,
            "head": proposal.source_branch,
            "base": proposal.base_branch,
            "body": proposal.body,
            "maintainer_can_modify": false,
        });
        match self
            .send_json::<PullRequestResponse>(self.api.request(Method::POST, url).json(&body))
            .await
        {
            Ok(pr) => Ok(pr.into()),
            Err(ProviderError::Api {
                status: 422,
                ref message,
                ..
            }) if message.contains("No commits between") => Err(ProviderError::NoChanges {
                source_branch: proposal.source_branch.to_string(),
                base_branch: proposal.base_branch.to_string(),
            }),
            Err(ProviderError::Api {
                status: 422,
                ref message,
                ..
            }) if message.contains("A pull request already exists") => self
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
        let number = proposal.number.to_string();
        let url = self.repo_url(repo, &["pulls", number.as_str()]);
        self.send(
            self.api
                .request(Method::PATCH, url)
                .json(&json!({ "state": "closed" })),
        )
        .await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &RepositoryRef, branch: &str) -> Result<(), ProviderError> {
        let mut rest = vec!["git", "refs", "heads"];
        rest.extend(branch.split('/'));
        let url = self.repo_url(repo, &rest);
        match self.send(self.api.request(Method::DELETE, url)).await {
            Ok(_) => Ok(()),
            Err(ProviderError::Api {
                status: 422,
                ref message,
                ..
            }) if message.contains("Reference does not exist") => {
                Err(ProviderError::NotFound(format!("branch {}", branch)))
            }
            Err(e) => Err(e),
        }
    }

    async fn find_webhook(
        &self,
        repo: &RepositoryRef,
        target_url: &str,
    ) -> Result<Option<Webhook>, ProviderError> {
        let per_page = PER_PAGE.to_string();
        let mut page = 1usize;
        loop {
            let url = self.repo_url(repo, &["hooks"]);
            let page_str = page.to_string();
            let hooks: Vec<HookResponse> = self
                .send_json(
                    self.api
                        .request(Method::GET, url)
                        .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]),
                )
                .await?;
            let count = hooks.len();
            if let Some(hook) = hooks
                .into_iter()
                .find(|h| h.config.url.as_deref() == Some(target_url))
            {
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
        let url = self.repo_url(repo, &["hooks"]);
        let mut body = Self::hook_body(
            &spec.events,
            &spec.target_url,
            &spec.content_type,
            Some(spec.secret.expose()),
            spec.insecure_ssl,
            spec.active,
        );
        body["name"] = Value::String("web".to_string());
        let hook: HookResponse = self
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
        let url = self.repo_url(repo, &["hooks", id.as_str()]);
        let body = Self::hook_body(
            &webhook.events,
            &webhook.target_url,
            &webhook.content_type,
            webhook.secret.as_ref().map(|s| s.expose()),
            webhook.insecure_ssl,
            webhook.active,
        );
        let hook: HookResponse = self
            .send_json(self.api.request(Method::PATCH, url).json(&body))
            .await?;
        Ok(hook.into())
    }

    async fn delete_webhook(
        &self,
        repo: &RepositoryRef,
        webhook: &Webhook,
    ) -> Result<(), ProviderError> {
        let id = webhook.id.to_string();
        let url = self.repo_url(repo, &["hooks", id.as_str()]);
        self.send(self.api.request(Method::DELETE, url)).await?;
        Ok(())
    }

    /// Installation tokens cannot read `/user`; `None` in that mode.
    async fn current_user(&self) -> Result<Option<String>, ProviderError> {
        if self.app {
            return Ok(None);
        }
        let url = self.api.url(&["user"]);
        let user: UserResponse = self.send_json(self.api.request(Method::GET, url)).await?;
        Ok(Some(user.login))
    }

    async fn check_access(&self, repo: &RepositoryRef) -> Result<(), ProviderError> {
        if !self.app {
            return Ok(());
        }
        let wanted = repo.full_name();
        let per_page = PER_PAGE.to_string();
        let mut page = 1usize;
        loop {
            let url = self.api.url(&["installation", "repositories"]);
            let page_str = page.to_string();
            let listing: InstallationRepositories = self
                .send_json(
                    self.api
                        .request(Method::GET, url)
                        .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]),
                )
                .await?;
            let count = listing.repositories.len();
            if listing
                .repositories
                .iter()
                .any(|r| r.full_name.eq_ignore_ascii_case(&wanted))
            {
                return Ok(());
            }
            if count < PER_PAGE {
                return Err(ProviderError::NotAccessible(format!(
                    "application installation has no access to {}",
                    wanted
                )));
            }
            page += 1;
        }
    }
}
