//! Change proposals: the branch plus pull/merge request carrying the
//! engine's commits.
//!
//! [`ProposalReconciler::ensure`] converges a repository toward a desired file
//! set through one deterministic branch and at most one open proposal.
//! [`ProposalReconciler::ensure_removed`] is its teardown counterpart.

mod ensure;
mod remove;

use crate::component::{BranchNames, Component};
use crate::config::{ProposalSettings, render_template};
use crate::credentials::AppInstallation;
use crate::files::DesiredFileSet;
use crate::provider::CommitAuthor;

pub use ensure::ProposalReconciler;
pub use remove::{RemovalAction, RemovalOutcome};

/// Everything needed to converge one proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRequest {
    pub source_branch: String,
    pub base_branch: String,
    pub title: String,
    pub body: String,
    pub commit_message: String,
    pub author: CommitAuthor,
    pub files: DesiredFileSet,
}

impl ProposalRequest {
    /// Proposal adding `files` on the component's onboarding branch.
    pub fn onboarding(
        settings: &ProposalSettings,
        component: &Component,
        base_branch: impl Into<String>,
        files: DesiredFileSet,
        app: Option<&AppInstallation>,
    ) -> Self {
        let branches = Self::branches(settings, component);
        let app_name = Self::app_name(settings, app);
        Self {
            source_branch: branches.onboarding,
            base_branch: base_branch.into(),
            title: render_template(&settings.onboarding_title, &component.name, app_name),
            body: settings.onboarding_body.clone(),
            commit_message: render_template(
                &settings.onboarding_commit_message,
                &component.name,
                app_name,
            ),
            author: Self::author(settings, app),
            files,
        }
    }

    /// Proposal deleting `paths` on the component's removal branch.
    pub fn removal(
        settings: &ProposalSettings,
        component: &Component,
        base_branch: impl Into<String>,
        paths: Vec<String>,
        app: Option<&AppInstallation>,
    ) -> Self {
        let branches = Self::branches(settings, component);
        let app_name = Self::app_name(settings, app);
        Self {
            source_branch: branches.removal,
            base_branch: base_branch.into(),
            title: render_template(&settings.removal_title, &component.name, app_name),
            body: settings.removal_body.clone(),
            commit_message: render_template(
                &settings.removal_commit_message,
                &component.name,
                app_name,
            ),
            author: Self::author(settings, app),
            files: DesiredFileSet::removal(paths),
        }
    }

    fn branches(settings: &ProposalSettings, component: &Component) -> BranchNames {
        BranchNames::for_component(
            component,
            &settings.onboarding_branch_prefix,
            &settings.removal_branch_prefix,
        )
    }

    fn app_name<'a>(settings: &'a ProposalSettings, app: Option<&'a AppInstallation>) -> &'a str {
        app.and_then(|a| a.name.as_deref())
            .unwrap_or(&settings.display_name)
    }

    /// The installed application's bot commits under its slug.
    fn author(settings: &ProposalSettings, app: Option<&AppInstallation>) -> CommitAuthor {
        CommitAuthor {
            name: app
                .and_then(|a| a.slug.clone())
                .unwrap_or_else(|| settings.author_name.clone()),
            email: settings.author_email.clone(),
        }
    }
}
