//! Webhook descriptors and the reconciler that keeps one of them in shape.
//!
//! A webhook is identified solely by its target URL. The engine never looks
//! at, mutates, or deletes hooks pointing anywhere else.

mod reconcile;

use crate::config::WebhookSettings;
use crate::credentials::Secret;

pub use reconcile::{WebhookAction, WebhookReconciler, WebhookRemoval};

/// Payload format requested from the provider.
pub const CONTENT_TYPE_JSON: &str = "json";

/// Desired state of the managed webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSpec {
    pub target_url: String,
    pub secret: Secret,
    pub events: Vec<String>,
    pub content_type: String,
    pub insecure_ssl: bool,
    pub active: bool,
}

impl WebhookSpec {
    pub fn new(
        target_url: impl Into<String>,
        secret: impl Into<Secret>,
        settings: &WebhookSettings,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            secret: secret.into(),
            events: settings.events.clone(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            insecure_ssl: settings.insecure_ssl,
            active: true,
        }
    }
}

/// A webhook as reported by the provider.
///
/// `secret` is write-only: providers never return it, so it is `None` on
/// every value read back and only set on values about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub id: u64,
    pub target_url: String,
    pub events: Vec<String>,
    pub content_type: String,
    pub insecure_ssl: bool,
    pub active: bool,
    pub secret: Option<Secret>,
}

impl Webhook {
    /// Bring this hook in line with `spec`; returns the fields that drifted.
    ///
    /// The secret is always rewritten. Events are only ever added.
    pub fn merge(&mut self, spec: &WebhookSpec) -> Vec<&'static str> {
        let mut drift = Vec::new();
        self.secret = Some(spec.secret.clone());

        let mut added = false;
        for event in &spec.events {
            if !self.events.contains(event) {
                self.events.push(event.clone());
                added = true;
            }
        }
        if added {
            drift.push("events");
        }
        if self.content_type != spec.content_type {
            self.content_type = spec.content_type.clone();
            drift.push("content_type");
        }
        if self.insecure_ssl != spec.insecure_ssl {
            self.insecure_ssl = spec.insecure_ssl;
            drift.push("insecure_ssl");
        }
        if self.active != spec.active {
            self.active = spec.active;
            drift.push("active");
        }
        drift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WebhookSpec {
        WebhookSpec::new(
            "https://hooks.example.com",
            "s3cr3t",
            &WebhookSettings::default(),
        )
    }

    fn existing(events: &[&str]) -> Webhook {
        Webhook {
            id: 1,
            target_url: "https://hooks.example.com".to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            insecure_ssl: true,
            active: true,
            secret: None,
        }
    }

    #[test]
    fn spec_uses_configured_events_and_json() {
        let spec = spec();
        assert_eq!(spec.events.len(), 4);
        assert_eq!(spec.content_type, "json");
        assert!(spec.active);
        assert!(spec.insecure_ssl);
    }

    #[test]
    fn merge_keeps_unrelated_events() {
        let mut hook = existing(&["release", "push"]);
        let drift = hook.merge(&spec());
        assert_eq!(drift, vec!["events"]);
        assert_eq!(
            hook.events,
            vec!["release", "push", "pull_request", "issue_comment", "commit_comment"]
        );
    }

    #[test]
    fn merge_always_sets_secret() {
        let mut hook = existing(&["pull_request", "push", "issue_comment", "commit_comment"]);
        let drift = hook.merge(&spec());
        assert!(drift.is_empty());
        assert_eq!(hook.secret, Some(Secret::new("s3cr3t")));
    }

    #[test]
    fn merge_corrects_flags_only_when_different() {
        let mut hook = existing(&["pull_request", "push", "issue_comment", "commit_comment"]);
        hook.content_type = "form".to_string();
        hook.active = false;
        let drift = hook.merge(&spec());
        assert_eq!(drift, vec!["content_type", "active"]);
        assert_eq!(hook.content_type, "json");
        assert!(hook.active);
        assert!(hook.insecure_ssl);
    }
}
