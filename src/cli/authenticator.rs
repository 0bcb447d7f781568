use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use console_rpc::auth::{AuthBootstrapConfig, Authenticator, ReauthOutcome};
use console_rpc::session::SessionStore;

use crate::command::interactive_login;

/// Authenticator backed by the session file and the terminal login flow.
pub struct SessionAuthenticator {
    store: Arc<SessionStore>,
    cache_dir: PathBuf,
    config: RwLock<Option<AuthBootstrapConfig>>,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<SessionStore>, cache_dir: PathBuf) -> Self {
        Self {
            store,
            cache_dir,
            config: RwLock::new(None),
        }
    }

    /// Configuration of the last successful bootstrap.
    pub fn config(&self) -> Option<AuthBootstrapConfig> {
        self.config
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    fn init_config(&self, config: AuthBootstrapConfig) {
        debug!("Auth configured for issuer {}", config.issuer);
        *self.config.write().unwrap_or_else(|p| p.into_inner()) = Some(config);
    }

    async fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    async fn reauthenticate(&self) -> ReauthOutcome {
        let Some(config) = self.config() else {
            warn!("No auth configuration available; cannot log in again");
            return ReauthOutcome::Abandoned;
        };

        if let Err(e) = self.store.clear_token() {
            warn!("Failed to clear expired token: {}", e);
        }

        match interactive_login(&config, &self.store, &self.cache_dir).await {
            Ok(()) => ReauthOutcome::Completed,
            Err(e) => {
                error!("Login failed: {:#}", e);
                ReauthOutcome::Abandoned
            }
        }
    }
}
