//! Repository references derived from a component's declared source URL.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProvisionError;

/// Hosting provider of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Bitbucket,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::GitLab => "gitlab",
            ProviderKind::Bitbucket => "bitbucket",
        }
    }

    /// Guess the provider from a host name.
    pub fn detect(host: &str) -> Option<Self> {
        let host = host.to_ascii_lowercase();
        if host.contains("github") {
            Some(ProviderKind::GitHub)
        } else if host.contains("gitlab") {
            Some(ProviderKind::GitLab)
        } else if host.contains("bitbucket") {
            Some(ProviderKind::Bitbucket)
        } else {
            None
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ProviderKind::GitHub),
            "gitlab" => Ok(ProviderKind::GitLab),
            "bitbucket" => Ok(ProviderKind::Bitbucket),
            other => Err(ProvisionError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// A repository on a hosting provider.
///
/// Built once per invocation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub kind: ProviderKind,
    /// Host name, e.g. `github.com` or a self-hosted GitLab instance.
    pub host: String,
    /// Owner or namespace; GitLab namespaces may contain `/`.
    pub owner: String,
    pub name: String,
    /// Explicit base branch; the provider default is used when absent.
    pub base_branch: Option<String>,
}

impl RepositoryRef {
    /// Parse a source URL into a repository reference.
    ///
    /// Supports formats:
    /// - `https://github.com/owner/repo`
    /// - `https://github.com/owner/repo.git`
    /// - `https://github.com/owner/repo/tree/main/sub`
    /// - `https://gitlab.com/group/subgroup/project/-/tree/main`
    /// - `git@github.com:owner/repo.git`
    ///
    /// The provider is detected from the host unless `kind` is given.
    pub fn parse(source_url: &str, kind: Option<ProviderKind>) -> Result<Self, ProvisionError> {
        let invalid = |reason: &str| ProvisionError::InvalidRepositoryUrl {
            url: source_url.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = source_url.trim();
        let (host, path) = if let Some(rest) = trimmed
            .strip_prefix("git@")
            .filter(|_| !trimmed.contains("://"))
        {
            let (host, path) = rest
                .split_once(':')
                .ok_or_else(|| invalid("missing ':' after host"))?;
            (host.to_string(), path.to_string())
        } else {
            let parsed = url::Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
            let host = parsed
                .host_str()
                .ok_or_else(|| invalid("missing host"))?
                .to_string();
            (host, parsed.path().to_string())
        };

        let kind = match kind {
            Some(kind) => kind,
            None => ProviderKind::detect(&host).ok_or_else(|| {
                ProvisionError::UnsupportedProvider(format!("cannot detect provider for {}", host))
            })?,
        };

        let segments: Vec<&str> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        let segments: Vec<&str> = match kind {
            // GitLab separates the project path from UI routes with "/-/".
            ProviderKind::GitLab => segments.into_iter().take_while(|s| *s != "-").collect(),
            ProviderKind::GitHub | ProviderKind::Bitbucket => {
                segments.into_iter().take(2).collect()
            }
        };

        if segments.len() < 2 {
            return Err(invalid("expected <owner>/<repository> in path"));
        }

        let (name, owner) = segments
            .split_last()
            .ok_or_else(|| invalid("expected <owner>/<repository> in path"))?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        if name.is_empty() {
            return Err(invalid("repository name is empty"));
        }

        Ok(Self {
            kind,
            host,
            owner: owner.join("/"),
            name: name.to_string(),
            base_branch: None,
        })
    }

    /// Set the explicit base branch; blank values are ignored.
    pub fn with_base_branch(mut self, branch: Option<impl Into<String>>) -> Self {
        self.base_branch = branch.map(Into::into).filter(|b: &String| !b.trim().is_empty());
        self
    }

    /// `owner/name` path as used by both hosting APIs.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Browsable URL of the repository.
    pub fn web_url(&self) -> String {
        format!("https://{}/{}", self.host, self.full_name())
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.full_name())
    }
}
