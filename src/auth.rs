//! Authentication configuration handed to the session layer.
//!
//! The console does not run the OIDC handshake itself. It derives the
//! configuration from the resolved environment and the deployment location,
//! then hands it to whatever [`Authenticator`] the host application wires in.

use async_trait::async_trait;
use serde::Serialize;

use crate::environment::EnvironmentConfig;

/// Scopes requested from the issuer.
pub const AUTH_SCOPE: &str = "openid profile email";

/// Suffix of the redirect target after a successful login.
pub const CALLBACK_PATH: &str = "auth/callback";

/// Suffix of the redirect target after logout.
pub const SIGNED_OUT_PATH: &str = "signedout";

/// OIDC client configuration derived during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthBootstrapConfig {
    pub scope: String,
    pub response_type: String,
    pub oidc: bool,
    pub client_id: String,
    pub issuer: String,
    pub redirect_uri: String,
    pub post_logout_redirect_uri: String,
    pub require_https: bool,
}

impl AuthBootstrapConfig {
    /// Derive the configuration for an environment served from
    /// `origin` + `base_href`.
    ///
    /// Returns `None` if the environment has no issuer.
    pub fn derive(env: &EnvironmentConfig, location: &dyn DeploymentLocation) -> Option<Self> {
        let issuer = env.issuer()?;
        let root = format!("{}{}", location.origin(), location.base_href());

        Some(Self {
            scope: AUTH_SCOPE.to_string(),
            response_type: "code".to_string(),
            oidc: true,
            client_id: env.client_id().to_string(),
            issuer: issuer.to_string(),
            redirect_uri: format!("{}{}", root, CALLBACK_PATH),
            post_logout_redirect_uri: format!("{}{}", root, SIGNED_OUT_PATH),
            require_https: false,
        })
    }
}

/// Where the console is served from.
pub trait DeploymentLocation: Send + Sync {
    /// Scheme, host and port, without a trailing slash.
    fn origin(&self) -> String;

    /// Deployment base path, starting and ending with `/`.
    fn base_href(&self) -> String;
}

/// Fixed deployment location.
#[derive(Debug, Clone)]
pub struct StaticLocation {
    origin: String,
    base_href: String,
}

impl StaticLocation {
    pub fn new(origin: &str, base_href: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            base_href: normalize_base_href(base_href),
        }
    }
}

impl DeploymentLocation for StaticLocation {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn base_href(&self) -> String {
        self.base_href.clone()
    }
}

/// Ensure a base path starts and ends with a single `/`.
pub fn normalize_base_href(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

/// Result of a re-authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthOutcome {
    /// A fresh credential is available.
    Completed,
    /// The user declined or the flow failed.
    Abandoned,
}

/// Session side of the authentication subsystem.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Receive the configuration derived by a successful bootstrap.
    fn init_config(&self, config: AuthBootstrapConfig);

    /// Current bearer credential, if the user is logged in.
    async fn access_token(&self) -> Option<String>;

    /// Run the interactive login again after the session expired.
    async fn reauthenticate(&self) -> ReauthOutcome;
}

/// Blocking "your session expired" prompt.
#[async_trait]
pub trait SessionPrompt: Send + Sync {
    /// Returns `true` if the user wants to log in again.
    async fn confirm_session_expired(&self) -> bool;
}

/// Label/branding policy applied before anything else. Must not block.
pub trait BrandingPolicy: Send + Sync {
    fn apply_label_policy(&self);
}

/// Branding policy for hosts that have none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBranding;

impl BrandingPolicy for NoBranding {
    fn apply_label_policy(&self) {}
}
