mod support;

use pacsetup_core::component::Component;
use pacsetup_core::config::ProposalSettings;
use pacsetup_core::files::FileChange;
use pacsetup_core::proposal::{ProposalReconciler, ProposalRequest, RemovalAction};
use pacsetup_core::provider::ProposalState;

use support::{FakeProvider, USER, repository};

const PUSH: &str = ".tekton/app-push.yaml";
const PULL_REQUEST: &str = ".tekton/app-pull-request.yaml";

fn removal() -> ProposalRequest {
    ProposalRequest::removal(
        &ProposalSettings::default(),
        &Component::new("app", "https://github.com/acme/app"),
        "main",
        vec![PUSH.to_string(), PULL_REQUEST.to_string()],
        None,
    )
}

#[tokio::test]
async fn open_onboarding_proposal_is_abandoned() {
    let provider = FakeProvider::new()
        .with_branch("pac-app", "main")
        .with_open_proposal("pac-app", "main");
    let onboarding = provider.proposals()[0].web_url.clone();

    let outcome = ProposalReconciler::new(&provider)
        .ensure_removed(&repository(), "pac-app", Some(USER), &removal())
        .await
        .unwrap();

    assert_eq!(outcome.action, RemovalAction::Close);
    assert_eq!(outcome.url, Some(onboarding));
    assert!(provider.branch("pac-app").is_none());
    assert_eq!(provider.proposals()[0].state, ProposalState::Closed);
    assert_eq!(provider.count_writes("create_proposal"), 0);
}

#[tokio::test]
async fn already_deleted_onboarding_branch_is_fine() {
    let provider = FakeProvider::new().with_open_proposal("pac-app", "main");

    let outcome = ProposalReconciler::new(&provider)
        .ensure_removed(&repository(), "pac-app", Some(USER), &removal())
        .await
        .unwrap();

    assert_eq!(outcome.action, RemovalAction::Close);
    assert!(outcome.url.is_some());
}

#[tokio::test]
async fn merged_configuration_gets_removal_proposal() {
    let provider = FakeProvider::new()
        .with_file("main", PUSH, "push")
        .with_file("main", PULL_REQUEST, "pr")
        .with_file("main", "README.md", "readme");

    let outcome = ProposalReconciler::new(&provider)
        .ensure_removed(&repository(), "pac-app", Some(USER), &removal())
        .await
        .unwrap();

    assert_eq!(outcome.action, RemovalAction::Delete);
    let proposals = provider.proposals();
    assert_eq!(proposals.len(), 1);
    assert_eq!(outcome.url.as_deref(), Some(proposals[0].web_url.as_str()));
    assert_eq!(proposals[0].source_branch, "pac-purge-app");
    assert_eq!(proposals[0].title, "Pipelines as Code purge app");

    let commits = provider.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(
        commits[0].changes,
        vec![
            FileChange::Delete {
                path: PUSH.to_string()
            },
            FileChange::Delete {
                path: PULL_REQUEST.to_string()
            },
        ]
    );
    let branch = provider.branch("pac-purge-app").unwrap();
    assert_eq!(branch.keys().collect::<Vec<_>>(), vec!["README.md"]);
}

#[tokio::test]
async fn nothing_to_remove_means_no_proposal() {
    let provider = FakeProvider::new().with_file("main", "README.md", "readme");

    let outcome = ProposalReconciler::new(&provider)
        .ensure_removed(&repository(), "pac-app", Some(USER), &removal())
        .await
        .unwrap();

    assert_eq!(outcome.action, RemovalAction::Delete);
    assert_eq!(outcome.url, None);
    assert!(provider.writes().is_empty());
}

#[tokio::test]
async fn repeated_teardown_reuses_removal_proposal() {
    let provider = FakeProvider::new()
        .with_file("main", PUSH, "push")
        .with_file("main", PULL_REQUEST, "pr");
    let reconciler = ProposalReconciler::new(&provider);

    let first = reconciler
        .ensure_removed(&repository(), "pac-app", Some(USER), &removal())
        .await
        .unwrap();
    provider.clear_writes();
    let second = reconciler
        .ensure_removed(&repository(), "pac-app", Some(USER), &removal())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert!(provider.writes().is_empty());
    assert_eq!(provider.proposals().len(), 1);
}

#[tokio::test]
async fn proposal_from_another_account_is_left_open() {
    let provider = FakeProvider::new()
        .with_branch("pac-app", "main")
        .with_proposal_by("pac-app", "main", Some("octocat"));

    let outcome = ProposalReconciler::new(&provider)
        .ensure_removed(&repository(), "pac-app", Some(USER), &removal())
        .await
        .unwrap();

    assert_eq!(outcome.action, RemovalAction::Delete);
    assert_eq!(outcome.url, None);
    assert!(provider.branch("pac-app").is_some());
    assert_eq!(provider.proposals()[0].state, ProposalState::Open);
    assert!(provider.writes().is_empty());
}

#[tokio::test]
async fn unknown_owner_accepts_any_onboarding_proposal() {
    let provider = FakeProvider::new()
        .with_branch("pac-app", "main")
        .with_proposal_by("pac-app", "main", Some("octocat"));

    let outcome = ProposalReconciler::new(&provider)
        .ensure_removed(&repository(), "pac-app", None, &removal())
        .await
        .unwrap();

    assert_eq!(outcome.action, RemovalAction::Close);
    assert_eq!(provider.proposals()[0].state, ProposalState::Closed);
}
