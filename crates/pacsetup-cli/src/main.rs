//! Pacsetup - pipeline configuration propagation
//!
//! Usage:
//!   pacsetup provision --component app --repo https://github.com/acme/app \
//!       --push-manifest push.yaml --pull-request-manifest pr.yaml
//!   pacsetup deprovision --component app --repo https://github.com/acme/app

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pacsetup_core::component::Component;
use pacsetup_core::config::{ConfigStore, EngineConfig};
use pacsetup_core::credentials::{AppInstallation, Credentials, Secret};
use pacsetup_core::manifest::{LocalManifestSource, ManifestLayout};
use pacsetup_core::orchestration::{
    DeprovisionOrchestrator, DeprovisionReport, ProvisionOrchestrator, ProvisionReport,
    WebhookTarget,
};
use pacsetup_core::provider;
use pacsetup_core::repo::ProviderKind;
use pacsetup_core::webhook::{WebhookAction, WebhookRemoval};

#[derive(Parser)]
#[command(name = "pacsetup")]
#[command(
    about = "Pipeline configuration propagation for hosted git repositories",
    long_about = None
)]
struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Abort the invocation after this many seconds
    #[arg(long, global = true, default_value_t = 300)]
    timeout: u64,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push pipeline manifests through a proposal and register the webhook
    Provision(ProvisionArgs),

    /// Remove the webhook and the pipeline manifests
    ///
    /// Best effort: problems are reported as warnings and the exit code stays 0.
    Deprovision(ComponentArgs),
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable summary
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Args)]
struct ComponentArgs {
    /// Component name; also names the branches and manifest files
    #[arg(long)]
    component: String,

    /// Source repository URL
    #[arg(long)]
    repo: String,

    /// Base branch; the repository default branch when omitted
    #[arg(long)]
    revision: Option<String>,

    /// Hosting provider (github, gitlab, bitbucket); detected from the host when omitted
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Access token or application installation token
    #[arg(long, env = "PAC_GIT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// User name paired with the token (Bitbucket)
    #[arg(long, env = "PAC_GIT_USERNAME")]
    username: Option<String>,

    /// Treat the token as an installed GitHub application's token
    #[arg(long, env = "PAC_APP_ID")]
    app_id: Option<String>,

    /// Application display name, used in proposal titles
    #[arg(long, requires = "app_id")]
    app_name: Option<String>,

    /// Application slug, used as commit author
    #[arg(long, requires = "app_id")]
    app_slug: Option<String>,

    /// Webhook target URL (overrides `webhook.target_url`)
    #[arg(long, env = "PAC_WEBHOOK_URL")]
    webhook_url: Option<String>,
}

#[derive(Args)]
struct ProvisionArgs {
    #[command(flatten)]
    component: ComponentArgs,

    /// Manifest for push events
    #[arg(long)]
    push_manifest: PathBuf,

    /// Manifest for pull/merge request events
    #[arg(long)]
    pull_request_manifest: PathBuf,

    /// Secret the webhook signs deliveries with; required with a token
    #[arg(long, env = "PAC_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pacsetup=info,pacsetup_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.clone())?;
    let timeout = Duration::from_secs(cli.timeout);

    // Dropping the command future cancels whatever call is in flight.
    tokio::select! {
        result = tokio::time::timeout(timeout, run_cli(cli.command, config, cli.format)) => {
            result.map_err(|_| anyhow::anyhow!("Timed out after {}s", timeout.as_secs()))?
        }
        _ = tokio::signal::ctrl_c() => {
            anyhow::bail!("Interrupted");
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    let store = match path {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::from_default_location()?,
    };
    let config = store
        .load()
        .with_context(|| format!("Failed to load {}", store.config_path().display()))?;
    tracing::debug!(path = %store.config_path().display(), "loaded configuration");
    Ok(config)
}

async fn run_cli(command: Commands, config: EngineConfig, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Provision(args) => run_provision(args, config, format).await,
        Commands::Deprovision(args) => run_deprovision(args, config, format).await,
    }
}

async fn run_provision(
    args: ProvisionArgs,
    config: EngineConfig,
    format: OutputFormat,
) -> Result<()> {
    let component = component_from(&args.component);
    let credentials = credentials_from(&args.component)?;
    let repo = component.repository()?;
    let provider = provider::connect(&repo, &credentials, &config.endpoints)?;

    let webhook_url = args
        .component
        .webhook_url
        .clone()
        .or_else(|| config.webhook.target_url.clone());
    let secret = args
        .webhook_secret
        .clone()
        .filter(|secret| !secret.trim().is_empty());
    let webhook = match (webhook_url, secret) {
        (Some(url), Some(secret)) => Some(WebhookTarget::new(url, Secret::new(secret))),
        (Some(_), None) if !credentials.is_app() => anyhow::bail!(
            "No webhook secret given; pass --webhook-secret or set PAC_WEBHOOK_SECRET"
        ),
        _ => None,
    };

    let manifests = LocalManifestSource::new(
        ManifestLayout::new(config.manifests.clone()),
        args.push_manifest,
        args.pull_request_manifest,
    );
    let orchestrator = ProvisionOrchestrator::new(provider, Arc::new(manifests), config);

    match orchestrator
        .provision(&component, &credentials, webhook.as_ref())
        .await
    {
        Ok(report) => print_provision_report(&component, &report, format),
        Err(e) if !e.is_retryable() => {
            Err(anyhow::Error::new(e).context("Configuration error; fix it before retrying"))
        }
        Err(e) => {
            Err(anyhow::Error::new(e).context(format!("Failed to provision {}", component.name)))
        }
    }
}

async fn run_deprovision(
    args: ComponentArgs,
    config: EngineConfig,
    format: OutputFormat,
) -> Result<()> {
    let component = component_from(&args);
    let credentials = credentials_from(&args)?;
    let repo = component.repository()?;
    let provider = provider::connect(&repo, &credentials, &config.endpoints)?;

    let webhook_url = args
        .webhook_url
        .clone()
        .or_else(|| config.webhook.target_url.clone());
    let layout = ManifestLayout::new(config.manifests.clone());
    let orchestrator = DeprovisionOrchestrator::new(provider, Arc::new(layout), config);

    let report = orchestrator
        .deprovision(&component, &credentials, webhook_url.as_deref())
        .await;
    print_deprovision_report(&component, &report, format)
}

fn component_from(args: &ComponentArgs) -> Component {
    let mut component = Component::new(args.component.clone(), args.repo.clone());
    if let Some(revision) = args.revision.as_deref().filter(|r| !r.trim().is_empty()) {
        component = component.with_revision(revision);
    }
    if let Some(kind) = args.provider {
        component = component.with_provider(kind);
    }
    component
}

fn credentials_from(args: &ComponentArgs) -> Result<Credentials> {
    let token = args
        .token
        .clone()
        .context("No token given; pass --token or set PAC_GIT_TOKEN")?;
    match args.app_id.as_deref() {
        Some(raw) => {
            let app_id = AppInstallation::parse_app_id(raw)?;
            Ok(Credentials::App(
                AppInstallation::new(app_id, token)
                    .with_identity(args.app_name.clone(), args.app_slug.clone()),
            ))
        }
        None => Ok(Credentials::Token {
            token: Secret::new(token),
            username: args.username.clone(),
        }),
    }
}

fn print_provision_report(
    component: &Component,
    report: &ProvisionReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            match &report.webhook {
                Some(WebhookAction::Created { id }) => println!("✓ Created webhook {}", id),
                Some(WebhookAction::Updated { id, drift }) if drift.is_empty() => {
                    println!("• Webhook {} is up to date", id)
                }
                Some(WebhookAction::Updated { id, drift }) => {
                    println!("✓ Updated webhook {} ({})", id, drift.join(", "))
                }
                None => {}
            }
            match &report.proposal_url {
                Some(url) => println!("✓ Proposal for '{}': {}", component.name, url),
                None => println!(
                    "• '{}' is already configured on {} ({})",
                    component.name, report.repository, report.base_branch
                ),
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "component": component.name,
                "repository": report.repository.web_url(),
                "base_branch": report.base_branch,
                "webhook": report.webhook.as_ref().map(webhook_action_json),
                "proposal_url": report.proposal_url,
                "up_to_date": report.is_up_to_date(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn webhook_action_json(action: &WebhookAction) -> serde_json::Value {
    match action {
        WebhookAction::Created { id } => serde_json::json!({ "action": "created", "id": id }),
        WebhookAction::Updated { id, drift } => {
            serde_json::json!({ "action": "updated", "id": id, "fields": drift })
        }
    }
}

fn print_deprovision_report(
    component: &Component,
    report: &DeprovisionReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            match report.webhook {
                Some(WebhookRemoval::Deleted { id }) => println!("✓ Deleted webhook {}", id),
                Some(WebhookRemoval::Absent) => println!("• No webhook to delete"),
                None => {}
            }
            if let Some(removal) = &report.removal {
                match &removal.url {
                    Some(url) => println!(
                        "✓ Removal for '{}' ({}): {}",
                        component.name,
                        removal.action.as_str(),
                        url
                    ),
                    None => println!("• '{}' has no configuration to remove", component.name),
                }
            }
            for warning in &report.warnings {
                println!("  ⚠ {}", warning);
            }
        }
        OutputFormat::Json => {
            let webhook = report.webhook.map(|w| match w {
                WebhookRemoval::Deleted { id } => {
                    serde_json::json!({ "action": "deleted", "id": id })
                }
                WebhookRemoval::Absent => serde_json::json!({ "action": "absent" }),
            });
            let output = serde_json::json!({
                "component": component.name,
                "webhook": webhook,
                "action": report.removal.as_ref().map(|r| r.action),
                "url": report.removal.as_ref().and_then(|r| r.url.clone()),
                "warnings": report.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
