mod support;

use std::sync::Arc;

use async_trait::async_trait;

use pacsetup_core::component::Component;
use pacsetup_core::config::EngineConfig;
use pacsetup_core::credentials::{AppInstallation, Credentials, Secret};
use pacsetup_core::error::{ProviderError, ProvisionError};
use pacsetup_core::files::{DesiredFileSet, FileEntry};
use pacsetup_core::manifest::{DesiredStateSource, ManifestLayout};
use pacsetup_core::orchestration::{ProvisionOrchestrator, WebhookTarget};
use pacsetup_core::webhook::WebhookAction;

use support::FakeProvider;

const HOOK: &str = "https://pac.example.com/hook";

/// Fixed manifest bytes laid out with the default naming rules.
struct StaticManifests;

#[async_trait]
impl DesiredStateSource for StaticManifests {
    async fn desired_files(
        &self,
        component: &Component,
        _base_branch: &str,
    ) -> Result<DesiredFileSet, ProvisionError> {
        let paths = ManifestLayout::default().paths(component);
        Ok(DesiredFileSet::from_entries([
            FileEntry::new(paths.push, "push"),
            FileEntry::new(paths.pull_request, "pr"),
        ]))
    }

    fn managed_paths(&self, component: &Component) -> Vec<String> {
        ManifestLayout::default().managed_paths(component)
    }
}

fn orchestrator(provider: &Arc<FakeProvider>) -> ProvisionOrchestrator {
    ProvisionOrchestrator::new(
        provider.clone(),
        Arc::new(StaticManifests),
        EngineConfig::default(),
    )
}

fn component() -> Component {
    Component::new("app", "https://github.com/acme/app")
}

fn target() -> WebhookTarget {
    WebhookTarget::new(HOOK, "s3cr3t")
}

#[tokio::test]
async fn token_flow_reconciles_webhook_then_proposal() {
    let provider = Arc::new(FakeProvider::new());

    let report = orchestrator(&provider)
        .provision(&component(), &Credentials::token("t"), Some(&target()))
        .await
        .unwrap();

    assert_eq!(report.base_branch, "main");
    assert!(matches!(report.webhook, Some(WebhookAction::Created { .. })));
    assert!(report.proposal_url.is_some());
    assert!(!report.is_up_to_date());

    let writes = provider.writes();
    assert_eq!(writes[0], format!("create_webhook:{}", HOOK));
    assert_eq!(writes.last().map(String::as_str), Some("create_proposal:pac-app"));
    let hook = &provider.webhooks()[0];
    assert_eq!(provider.secret_of(hook.id), Some(Secret::new("s3cr3t")));
}

#[tokio::test]
async fn second_provision_only_refreshes_the_secret() {
    let provider = Arc::new(FakeProvider::new());
    let orchestrator = orchestrator(&provider);
    let credentials = Credentials::token("t");

    let first = orchestrator
        .provision(&component(), &credentials, Some(&target()))
        .await
        .unwrap();
    provider.clear_writes();
    let second = orchestrator
        .provision(&component(), &credentials, Some(&target()))
        .await
        .unwrap();

    assert_eq!(first.proposal_url, second.proposal_url);
    let id = provider.webhooks()[0].id;
    assert_eq!(provider.writes(), vec![format!("update_webhook:{}", id)]);
}

#[tokio::test]
async fn revision_overrides_default_branch() {
    let provider = Arc::new(FakeProvider::new().with_branch("release", "main"));

    let report = orchestrator(&provider)
        .provision(
            &component().with_revision("release"),
            &Credentials::token("t"),
            Some(&target()),
        )
        .await
        .unwrap();

    assert_eq!(report.base_branch, "release");
    assert_eq!(provider.proposals()[0].base_branch, "release");
}

#[tokio::test]
async fn missing_default_branch_is_an_error() {
    let provider = Arc::new(FakeProvider::new().with_default_branch(""));

    let err = orchestrator(&provider)
        .provision(&component(), &Credentials::token("t"), Some(&target()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::Provider(ProviderError::InvalidResponse(_))
    ));
    assert!(provider.writes().is_empty());
}

#[tokio::test]
async fn token_flow_requires_webhook_target() {
    let provider = Arc::new(FakeProvider::new());

    let err = orchestrator(&provider)
        .provision(&component(), &Credentials::token("t"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::MissingWebhookTarget));
    assert!(!err.is_retryable());
    assert!(provider.writes().is_empty());
}

#[tokio::test]
async fn webhook_failure_blocks_provisioning() {
    let provider = Arc::new(FakeProvider::new().failing_webhooks());

    let err = orchestrator(&provider)
        .provision(&component(), &Credentials::token("t"), Some(&target()))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(provider.proposals().is_empty());
    assert!(provider.branch("pac-app").is_none());
}

#[tokio::test]
async fn app_flow_skips_webhook_and_uses_app_identity() {
    let provider = Arc::new(FakeProvider::new());
    let app = AppInstallation::new(42, "ghs_token")
        .with_identity(Some("Acme CI".to_string()), Some("acme-ci".to_string()));

    let report = orchestrator(&provider)
        .provision(&component(), &Credentials::App(app), None)
        .await
        .unwrap();

    assert_eq!(report.webhook, None);
    assert!(provider.webhooks().is_empty());
    assert_eq!(provider.proposals()[0].title, "Acme CI update app");
    assert_eq!(provider.commits()[0].author.name, "acme-ci");
}

#[tokio::test]
async fn app_without_access_is_reported() {
    let provider = Arc::new(FakeProvider::new().denying_access());

    let err = orchestrator(&provider)
        .provision(
            &component(),
            &Credentials::App(AppInstallation::new(42, "ghs_token")),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::AppNotInstalled { app_id: 42, ref repository } if repository == "acme/app"
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn invalid_credentials_fail_before_any_call() {
    let provider = Arc::new(FakeProvider::new());

    let err = orchestrator(&provider)
        .provision(
            &Component::new("app", "https://gitlab.com/acme/app"),
            &Credentials::App(AppInstallation::new(42, "ghs_token")),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::InvalidCredentials(_)));
    assert!(provider.writes().is_empty());
}

#[tokio::test]
async fn malformed_repository_url_is_not_retryable() {
    let provider = Arc::new(FakeProvider::new());

    let err = orchestrator(&provider)
        .provision(
            &Component::new("app", "not a url"),
            &Credentials::token("t"),
            Some(&target()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::InvalidRepositoryUrl { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn empty_webhook_secret_is_rejected_before_any_call() {
    let provider = Arc::new(FakeProvider::new().with_webhook(HOOK, &["push"], "json", true));

    let err = orchestrator(&provider)
        .provision(
            &component(),
            &Credentials::token("t"),
            Some(&WebhookTarget::new(HOOK, Secret::new("  "))),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::MissingWebhookSecret));
    assert!(!err.is_retryable());
    assert!(provider.writes().is_empty());
    assert_eq!(provider.secret_of(provider.webhooks()[0].id), None);
}

#[tokio::test]
async fn missing_revision_branch_is_reported() {
    let provider = Arc::new(FakeProvider::new());

    let err = orchestrator(&provider)
        .provision(
            &component().with_revision("release"),
            &Credentials::token("t"),
            Some(&target()),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProvisionError::MissingBaseBranch { ref branch, .. } if branch == "release"
    ));
    assert!(!err.is_retryable());
    assert!(provider.writes().is_empty());
}
