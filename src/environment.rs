//! Environment discovery.
//!
//! The console is deployed next to an `environment.json` that tells it where
//! the API lives and which OIDC issuer and client to use. Resolvers produce
//! that record; the bootstrap subscribes once per run.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

use crate::auth::normalize_base_href;

/// Relative location of the environment document under the deployment root.
pub const ENVIRONMENT_PATH: &str = "assets/environment.json";

/// Resolved deployment environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// API base URL
    #[serde(default)]
    pub api: Option<String>,
    /// OIDC issuer
    #[serde(default)]
    pub issuer: Option<String>,
    /// OIDC client id
    #[serde(default)]
    pub clientid: Option<String>,
    /// Where an administrator can raise the instance quota
    #[serde(default)]
    pub instance_management_url: Option<String>,
    /// Everything else the deployment ships, ignored here
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl EnvironmentConfig {
    pub fn new(api: &str, issuer: &str, clientid: &str) -> Self {
        Self {
            api: Some(api.to_string()),
            issuer: Some(issuer.to_string()),
            clientid: Some(clientid.to_string()),
            ..Default::default()
        }
    }

    pub fn api(&self) -> Option<&str> {
        non_blank(self.api.as_deref())
    }

    pub fn issuer(&self) -> Option<&str> {
        non_blank(self.issuer.as_deref())
    }

    pub fn client_id(&self) -> &str {
        self.clientid.as_deref().unwrap_or_default()
    }

    /// Both the API base URL and the issuer are present.
    pub fn is_complete(&self) -> bool {
        self.api().is_some() && self.issuer().is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("failed to fetch environment from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("environment endpoint {url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read environment file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("environment document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid environment location: {0}")]
    InvalidLocation(String),
    #[error("environment source closed before a value was published")]
    Closed,
}

/// Source of the deployment environment.
///
/// `Ok(None)` means the source answered but has nothing to offer; the
/// bootstrap treats that like an incomplete environment.
#[async_trait]
pub trait EnvironmentResolver: Send + Sync {
    async fn resolve(&self) -> Result<Option<EnvironmentConfig>, EnvironmentError>;
}

/// Fetches `environment.json` from the deployment over HTTP.
pub struct HttpEnvironmentResolver {
    client: reqwest::Client,
    url: Url,
}

impl HttpEnvironmentResolver {
    /// Resolve `<origin><base_href>assets/environment.json`.
    pub fn new(origin: &str, base_href: &str) -> Result<Self, EnvironmentError> {
        let root = format!(
            "{}{}",
            origin.trim_end_matches('/'),
            normalize_base_href(base_href)
        );
        let url = Url::parse(&root)
            .and_then(|root| root.join(ENVIRONMENT_PATH))
            .map_err(|e| EnvironmentError::InvalidLocation(format!("{}: {}", root, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EnvironmentResolver for HttpEnvironmentResolver {
    async fn resolve(&self) -> Result<Option<EnvironmentConfig>, EnvironmentError> {
        debug!("Fetching environment from {}", self.url);
        let fetch_err = |source| EnvironmentError::Fetch {
            url: self.url.to_string(),
            source,
        };

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(fetch_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnvironmentError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(fetch_err)?;
        parse_environment(&body)
    }
}

/// Reads `environment.json` from disk.
pub struct FileEnvironmentResolver {
    path: PathBuf,
}

impl FileEnvironmentResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EnvironmentResolver for FileEnvironmentResolver {
    async fn resolve(&self) -> Result<Option<EnvironmentConfig>, EnvironmentError> {
        debug!("Reading environment from {:?}", self.path);
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| EnvironmentError::Read {
                path: self.path.clone(),
                source,
            })?;
        parse_environment(&content)
    }
}

/// Always yields the same value. Mostly useful for embedding and tests.
pub struct StaticEnvironmentResolver {
    env: Option<EnvironmentConfig>,
}

impl StaticEnvironmentResolver {
    pub fn new(env: Option<EnvironmentConfig>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl EnvironmentResolver for StaticEnvironmentResolver {
    async fn resolve(&self) -> Result<Option<EnvironmentConfig>, EnvironmentError> {
        Ok(self.env.clone())
    }
}

/// Environment that may be republished over the process lifetime.
///
/// Each bootstrap takes the value current at the time it asks; later
/// publications are picked up by the next bootstrap.
pub struct WatchEnvironmentResolver {
    rx: watch::Receiver<Option<EnvironmentConfig>>,
}

impl WatchEnvironmentResolver {
    pub fn channel(
        initial: Option<EnvironmentConfig>,
    ) -> (watch::Sender<Option<EnvironmentConfig>>, Self) {
        let (tx, rx) = watch::channel(initial);
        (tx, Self { rx })
    }
}

#[async_trait]
impl EnvironmentResolver for WatchEnvironmentResolver {
    async fn resolve(&self) -> Result<Option<EnvironmentConfig>, EnvironmentError> {
        let mut rx = self.rx.clone();
        // Nothing published yet: wait for the first value.
        if rx.borrow().is_none() {
            rx.changed().await.map_err(|_| EnvironmentError::Closed)?;
        }
        let current = rx.borrow_and_update().clone();
        Ok(current)
    }
}

fn parse_environment(raw: &str) -> Result<Option<EnvironmentConfig>, EnvironmentError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str(raw)?)
}
