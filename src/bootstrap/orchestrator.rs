use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::auth::{
    AuthBootstrapConfig, Authenticator, BrandingPolicy, DeploymentLocation, SessionPrompt,
};
use crate::environment::{EnvironmentConfig, EnvironmentError, EnvironmentResolver};
use crate::interceptor::{ChainParts, ExhaustionPolicy, InterceptorChain, OrgContextStore};
use crate::locale::{LocaleError, LocaleSource};
use crate::rpc::{RpcClient, RpcClientFactory, RpcError, Surface};

/// External collaborators, passed in explicitly.
#[derive(Clone)]
pub struct Collaborators {
    pub environment: Arc<dyn EnvironmentResolver>,
    pub locale: Arc<dyn LocaleSource>,
    pub authenticator: Arc<dyn Authenticator>,
    pub prompt: Arc<dyn SessionPrompt>,
    pub org_context: Arc<dyn OrgContextStore>,
    pub exhaustion_policy: Arc<dyn ExhaustionPolicy>,
    pub location: Arc<dyn DeploymentLocation>,
    pub branding: Arc<dyn BrandingPolicy>,
}

/// Error types for the bootstrap
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to load locale '{locale}': {source}")]
    Locale {
        locale: String,
        #[source]
        source: LocaleError,
    },
    #[error("failed to resolve environment: {0}")]
    Environment(#[from] EnvironmentError),
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(#[source] RpcError),
}

/// How a successful bootstrap ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapOutcome {
    /// Clients were installed and the auth configuration handed off.
    Installed {
        attempt: u64,
        auth_config: AuthBootstrapConfig,
    },
    /// The environment lacks the API URL or issuer; nothing was built.
    SkippedIncompleteEnvironment,
    /// A newer bootstrap installed its clients first; this result was dropped.
    Superseded { attempt: u64 },
}

/// Clients produced by one bootstrap, installed as a unit.
pub struct RpcClients {
    pub attempt: u64,
    pub auth: RpcClient,
    pub mgmt: RpcClient,
    pub admin: RpcClient,
}

impl RpcClients {
    /// The chain every client of this attempt shares.
    pub fn chain(&self) -> &Arc<InterceptorChain> {
        self.auth.chain()
    }

    pub fn get(&self, surface: Surface) -> &RpcClient {
        match surface {
            Surface::Auth => &self.auth,
            Surface::Management => &self.mgmt,
            Surface::Admin => &self.admin,
        }
    }
}

impl std::fmt::Debug for RpcClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClients")
            .field("attempt", &self.attempt)
            .field("base_url", &self.auth.base_url().as_str())
            .finish()
    }
}

/// Owns the installed clients and runs the bootstrap sequence.
///
/// # Example
/// ```ignore
/// let bootstrapper = Bootstrapper::new(collaborators);
/// bootstrapper.bootstrap().await?;
/// if let Some(mgmt) = bootstrapper.mgmt() {
///     let org: serde_json::Value = mgmt.get("orgs/me").await?;
/// }
/// ```
pub struct Bootstrapper {
    collaborators: Collaborators,
    attempts: AtomicU64,
    installed: RwLock<Option<Arc<RpcClients>>>,
}

impl Bootstrapper {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            attempts: AtomicU64::new(0),
            installed: RwLock::new(None),
        }
    }

    /// Number of bootstrap attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Currently installed clients, if any bootstrap has succeeded.
    pub fn clients(&self) -> Option<Arc<RpcClients>> {
        self.installed
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn auth(&self) -> Option<RpcClient> {
        self.clients().map(|c| c.auth.clone())
    }

    pub fn mgmt(&self) -> Option<RpcClient> {
        self.clients().map(|c| c.mgmt.clone())
    }

    pub fn admin(&self) -> Option<RpcClient> {
        self.clients().map(|c| c.admin.clone())
    }

    /// Run the bootstrap sequence.
    ///
    /// Failures of locale loading or environment resolution are logged and
    /// returned. An incomplete environment is not an error.
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome, BootstrapError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Starting bootstrap attempt {}", attempt);

        // Step 1: branding does not gate anything
        self.collaborators.branding.apply_label_policy();

        // Step 2: locale, before anything that may need translated text
        let locale = self.load_locale().await?;
        debug!("Locale '{}' ready", locale);

        // Step 3: environment
        let env = match self.collaborators.environment.resolve().await {
            Ok(env) => env,
            Err(e) => {
                error!("Failed to load environment: {}", e);
                return Err(e.into());
            }
        };

        // Step 4: validate. The auth configuration is derived here too since a
        // complete environment is exactly one that has an issuer.
        let location = self.collaborators.location.as_ref();
        let Some((env, auth_config)) = env
            .filter(EnvironmentConfig::is_complete)
            .and_then(|env| {
                let auth_config = AuthBootstrapConfig::derive(&env, location)?;
                Some((env, auth_config))
            })
        else {
            warn!("Environment is missing the API URL or issuer; RPC clients not created");
            return Ok(BootstrapOutcome::SkippedIncompleteEnvironment);
        };

        // Steps 5 and 6: one chain, three clients bound to it
        let clients = self.build_clients(attempt, &env)?;

        // Steps 7 and 8: install and hand off the auth configuration, unless a
        // newer attempt got there first
        if !self.install(clients, &auth_config) {
            debug!("Bootstrap attempt {} superseded, discarding its clients", attempt);
            return Ok(BootstrapOutcome::Superseded { attempt });
        }

        info!(
            "✅ RPC clients ready for {} (attempt {})",
            env.api().unwrap_or_default(),
            attempt
        );
        Ok(BootstrapOutcome::Installed {
            attempt,
            auth_config,
        })
    }

    async fn load_locale(&self) -> Result<String, BootstrapError> {
        let source = &self.collaborators.locale;
        let locale = source
            .detected_locale()
            .unwrap_or_else(|| source.default_locale());

        match source.load(&locale).await {
            Ok(()) => Ok(locale),
            Err(e) => {
                error!("Failed to load translations for '{}': {}", locale, e);
                Err(BootstrapError::Locale { locale, source: e })
            }
        }
    }

    fn build_clients(
        &self,
        attempt: u64,
        env: &EnvironmentConfig,
    ) -> Result<RpcClients, BootstrapError> {
        let c = &self.collaborators;
        let parts = ChainParts {
            exhaustion_policy: c.exhaustion_policy.clone(),
            org_context: c.org_context.clone(),
            authenticator: c.authenticator.clone(),
            prompt: c.prompt.clone(),
            locale: c.locale.clone(),
        };

        let chain = InterceptorChain::new(env, parts).map_err(|e| {
            error!("Failed to build HTTP transport: {}", e);
            BootstrapError::Transport(e)
        })?;
        let chain = Arc::new(chain);

        let api = env.api().unwrap_or_default();
        let make = |surface| {
            RpcClientFactory::make_client(surface, api, &chain).map_err(|e| {
                error!("Invalid API base URL '{}': {}", api, e);
                BootstrapError::InvalidBaseUrl(e)
            })
        };

        Ok(RpcClients {
            attempt,
            auth: make(Surface::Auth)?,
            mgmt: make(Surface::Management)?,
            admin: make(Surface::Admin)?,
        })
    }

    /// Install `clients` unless a newer attempt is already installed.
    ///
    /// The hand-off happens under the same lock so the authentication
    /// subsystem always ends up with the configuration of the installed
    /// attempt.
    fn install(&self, clients: RpcClients, auth_config: &AuthBootstrapConfig) -> bool {
        let mut installed = self
            .installed
            .write()
            .unwrap_or_else(|p| p.into_inner());

        if let Some(current) = installed.as_ref() {
            if current.attempt > clients.attempt {
                return false;
            }
        }

        *installed = Some(Arc::new(clients));
        self.collaborators
            .authenticator
            .init_config(auth_config.clone());
        true
    }
}
