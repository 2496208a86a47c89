//! Configuration schema types.

use serde::{Deserialize, Serialize};

use crate::repo::ProviderKind;

/// Default events a managed webhook subscribes to.
pub const DEFAULT_WEBHOOK_EVENTS: [&str; 4] =
    ["pull_request", "push", "issue_comment", "commit_comment"];

const DEFAULT_ONBOARDING_BODY: &str = "\
# Pipelines as Code configuration proposal

To start the PipelineRun, add a new comment with content `/ok-to-test`

For more detailed information about running a PipelineRun, please refer to \
Pipelines as Code documentation [Running the PipelineRun](https://pipelinesascode.com/docs/guide/running/)
";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub proposal: ProposalSettings,
    pub webhook: WebhookSettings,
    pub manifests: ManifestSettings,
    pub endpoints: EndpointSettings,
}

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.proposal;
        if p.onboarding_branch_prefix.trim().is_empty() || p.removal_branch_prefix.trim().is_empty()
        {
            anyhow::bail!("Branch prefixes must not be empty");
        }
        if p.onboarding_branch_prefix == p.removal_branch_prefix {
            anyhow::bail!("Onboarding and removal branch prefixes must differ");
        }
        if p.author_name.trim().is_empty() || p.author_email.trim().is_empty() {
            anyhow::bail!("Commit author name and email must be configured");
        }
        if self.webhook.events.is_empty() {
            anyhow::bail!("At least one webhook event must be configured");
        }
        if let Some(ref url) = self.webhook.target_url {
            url::Url::parse(url)
                .map_err(|e| anyhow::anyhow!("Invalid webhook target url '{}': {}", url, e))?;
        }
        for (kind, base) in [
            (ProviderKind::GitHub, &self.endpoints.github),
            (ProviderKind::GitLab, &self.endpoints.gitlab),
        ] {
            if let Some(base) = base {
                url::Url::parse(base)
                    .map_err(|e| anyhow::anyhow!("Invalid {} API url '{}': {}", kind, base, e))?;
            }
        }
        Ok(())
    }
}

/// Naming and text of the proposals the engine opens.
///
/// Templates expand `{component}` and `{app}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalSettings {
    pub onboarding_branch_prefix: String,
    pub removal_branch_prefix: String,
    /// Value of `{app}` unless an installed application supplies its own name.
    pub display_name: String,
    pub author_name: String,
    pub author_email: String,
    pub onboarding_title: String,
    pub onboarding_commit_message: String,
    pub onboarding_body: String,
    pub removal_title: String,
    pub removal_commit_message: String,
    pub removal_body: String,
}

impl Default for ProposalSettings {
    fn default() -> Self {
        Self {
            onboarding_branch_prefix: "pac-".to_string(),
            removal_branch_prefix: "pac-purge-".to_string(),
            display_name: "Pipelines as Code".to_string(),
            author_name: "pacsetup".to_string(),
            author_email: "pacsetup@noreply.localhost".to_string(),
            onboarding_title: "{app} update {component}".to_string(),
            onboarding_commit_message: "{app} update {component}".to_string(),
            onboarding_body: DEFAULT_ONBOARDING_BODY.to_string(),
            removal_title: "{app} purge {component}".to_string(),
            removal_commit_message: "{app} purge {component}".to_string(),
            removal_body: "Pipelines as Code configuration removal".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Callback URL of the event receiver.
    pub target_url: Option<String>,
    pub events: Vec<String>,
    /// Ask the provider to skip TLS verification when delivering events.
    pub insecure_ssl: bool,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            target_url: None,
            events: DEFAULT_WEBHOOK_EVENTS.iter().map(|e| e.to_string()).collect(),
            // TODO: default to verified TLS once the receiver route carries a trusted certificate.
            insecure_ssl: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSettings {
    pub directory: String,
    pub push_file: String,
    pub pull_request_file: String,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            directory: ".tekton".to_string(),
            push_file: "{component}-push.yaml".to_string(),
            pull_request_file: "{component}-pull-request.yaml".to_string(),
        }
    }
}

/// API base URL overrides; derived from the repository host when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub github: Option<String>,
    pub gitlab: Option<String>,
}

impl EndpointSettings {
    pub fn for_kind(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::GitHub => self.github.as_deref(),
            ProviderKind::GitLab => self.gitlab.as_deref(),
            ProviderKind::Bitbucket => None,
        }
    }
}

pub fn render_template(template: &str, component: &str, app: &str) -> String {
    template
        .replace("{component}", component)
        .replace("{app}", app)
}
