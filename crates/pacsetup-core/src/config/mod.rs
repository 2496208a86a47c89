//! Engine configuration (`config.toml`).
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration.

mod schema;
mod store;

pub use schema::{
    EndpointSettings, EngineConfig, ManifestSettings, ProposalSettings, WebhookSettings,
    render_template,
};
pub use store::{ConfigStore, default_config_path};
