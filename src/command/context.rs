use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use console_rpc::auth::{AuthBootstrapConfig, NoBranding, StaticLocation};
use console_rpc::bootstrap::{BootstrapOutcome, Bootstrapper, Collaborators, RpcClients};
use console_rpc::environment::{
    EnvironmentResolver, FileEnvironmentResolver, HttpEnvironmentResolver,
};
use console_rpc::interceptor::LoggingExhaustionPolicy;
use console_rpc::locale::TranslationCatalog;
use console_rpc::session::{self, SessionStore};

use crate::cli::{GlobalArgs, SessionAuthenticator, TerminalPrompt};

/// Open the session store in the configured cache directory.
pub fn open_store(globals: &GlobalArgs) -> Result<(Arc<SessionStore>, PathBuf)> {
    let cache_dir = session::cache_dir(globals.cache_dir.clone())?;
    let store = SessionStore::open(cache_dir.clone())
        .with_context(|| format!("Failed to open session in {:?}", cache_dir))?;
    Ok((Arc::new(store), cache_dir))
}

/// Everything a command needs to reach the API.
pub struct CommandContext {
    pub store: Arc<SessionStore>,
    cache_dir: PathBuf,
    pub authenticator: Arc<SessionAuthenticator>,
    pub bootstrapper: Bootstrapper,
}

impl CommandContext {
    pub fn new(globals: &GlobalArgs) -> Result<Self> {
        let origin = globals
            .origin
            .as_deref()
            .context("The console origin is required; pass --origin or set CONSOLE_ORIGIN")?;

        let (store, cache_dir) = open_store(globals)?;
        let catalog = Arc::new(TranslationCatalog::new(&globals.i18n_dir));

        let environment: Arc<dyn EnvironmentResolver> = match &globals.environment_file {
            Some(path) => Arc::new(FileEnvironmentResolver::new(path)),
            None => Arc::new(HttpEnvironmentResolver::new(origin, &globals.base_href)?),
        };

        let authenticator = Arc::new(SessionAuthenticator::new(store.clone(), cache_dir.clone()));

        let bootstrapper = Bootstrapper::new(Collaborators {
            environment,
            locale: catalog.clone(),
            authenticator: authenticator.clone(),
            prompt: Arc::new(TerminalPrompt::new(catalog)),
            org_context: store.clone(),
            exhaustion_policy: Arc::new(LoggingExhaustionPolicy::default()),
            location: Arc::new(StaticLocation::new(origin, &globals.base_href)),
            branding: Arc::new(NoBranding),
        });

        Ok(Self {
            store,
            cache_dir,
            authenticator,
            bootstrapper,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        self.bootstrapper
            .bootstrap()
            .await
            .context("Bootstrap failed")
    }

    /// Bootstrap and return the installed clients.
    pub async fn clients(&self) -> Result<Arc<RpcClients>> {
        self.bootstrap().await?;
        self.bootstrapper
            .clients()
            .context("The environment is missing the API URL or issuer; no clients available")
    }

    /// Bootstrap and return the auth configuration handed to the authenticator.
    pub async fn auth_config(&self) -> Result<AuthBootstrapConfig> {
        self.bootstrap().await?;
        self.authenticator
            .config()
            .context("The environment is missing the issuer; cannot log in")
    }
}
