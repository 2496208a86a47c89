//! Provider credentials handed to the engine for one invocation.

use std::fmt;

use crate::error::ProvisionError;
use crate::repo::ProviderKind;

/// A string that must never appear in logs or debug output.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An installed application, already authenticated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInstallation {
    pub app_id: u64,
    pub installation_token: Secret,
    /// Display name, used in proposal titles.
    pub name: Option<String>,
    /// Login of the application's bot user, used as commit author.
    pub slug: Option<String>,
}

impl AppInstallation {
    pub fn new(app_id: u64, installation_token: impl Into<Secret>) -> Self {
        Self {
            app_id,
            installation_token: installation_token.into(),
            name: None,
            slug: None,
        }
    }

    pub fn with_identity(mut self, name: Option<String>, slug: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self.slug = slug.filter(|s| !s.trim().is_empty());
        self
    }

    /// Account GitHub shows as author of the application's pull requests.
    pub fn bot_login(&self) -> Option<String> {
        self.slug.as_ref().map(|slug| format!("{}[bot]", slug))
    }

    pub fn parse_app_id(raw: &str) -> Result<u64, ProvisionError> {
        raw.trim().parse().map_err(|e| {
            ProvisionError::InvalidCredentials(format!(
                "failed to parse application id '{}': {}",
                raw, e
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Personal or project access token; webhooks are managed by the engine.
    Token {
        token: Secret,
        username: Option<String>,
    },
    /// Installed application; the provider delivers events itself.
    App(AppInstallation),
}

impl Credentials {
    pub fn token(token: impl Into<Secret>) -> Self {
        Credentials::Token {
            token: token.into(),
            username: None,
        }
    }

    pub fn is_app(&self) -> bool {
        matches!(self, Credentials::App(_))
    }

    pub fn app(&self) -> Option<&AppInstallation> {
        match self {
            Credentials::App(app) => Some(app),
            Credentials::Token { .. } => None,
        }
    }

    /// Bearer credential for API calls.
    pub fn access_token(&self) -> &Secret {
        match self {
            Credentials::Token { token, .. } => token,
            Credentials::App(app) => &app.installation_token,
        }
    }

    /// Check that the mandatory fields for `kind` are present.
    pub fn validate(&self, kind: ProviderKind) -> Result<(), ProvisionError> {
        match (self, kind) {
            (Credentials::App(app), ProviderKind::GitHub) => {
                if app.app_id == 0 {
                    return Err(ProvisionError::InvalidCredentials(
                        "application id is not configured".to_string(),
                    ));
                }
                if app.installation_token.is_empty() {
                    return Err(ProvisionError::InvalidCredentials(
                        "application installation token is not configured".to_string(),
                    ));
                }
                Ok(())
            }
            (Credentials::App(_), other) => Err(ProvisionError::InvalidCredentials(format!(
                "installed applications are not supported for {}",
                other
            ))),
            (Credentials::Token { token, username }, kind) => {
                if token.is_empty() {
                    return Err(ProvisionError::InvalidCredentials(format!(
                        "{} token is not configured",
                        kind
                    )));
                }
                if kind == ProviderKind::Bitbucket
                    && username.as_deref().is_none_or(|u| u.trim().is_empty())
                {
                    return Err(ProvisionError::InvalidCredentials(
                        "name of the user field must be configured".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}
