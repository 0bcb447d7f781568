//! Interactive PKCE login against the configured OIDC issuer.
//!
//! The authorize URL is opened in a browser; after login the issuer
//! redirects to `redirect_uri` with `code` and `state` in the query. The
//! user pastes that URL back and the code is exchanged for a token.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};
use url::Url;

use crate::auth::AuthBootstrapConfig;

pub const AUTHORIZE_PATH: &str = "oauth/v2/authorize";
pub const TOKEN_PATH: &str = "oauth/v2/token";

/// OAuth state TTL in minutes
const STATE_TTL_MINUTES: u64 = 10;

const STATE_FILE: &str = "oauth-state.json";

/// Pending login, stored in oauth-state.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthState {
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
    pub creation_time: u64,
}

/// Successful token endpoint response
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Parameters the issuer appended to the redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a pasted redirect URL (or just its query string).
    pub fn parse(pasted: &str) -> Result<Self> {
        let pasted = pasted.trim();
        let query = match Url::parse(pasted) {
            Ok(url) => url.query().unwrap_or_default().to_string(),
            Err(_) => pasted.trim_start_matches('?').to_string(),
        };

        let mut params = Self {
            state: None,
            code: None,
            error: None,
            error_description: None,
        };
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "state" => params.state = value,
                "code" => params.code = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        Ok(params)
    }
}

/// OAuth flow manager
pub struct OAuthFlow {
    config: AuthBootstrapConfig,
    http: reqwest::Client,
    state_path: PathBuf,
}

impl OAuthFlow {
    pub fn new(config: AuthBootstrapConfig, state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create cache directory: {:?}", state_dir))?;

        Ok(Self {
            config,
            http: reqwest::Client::new(),
            state_path: state_dir.join(STATE_FILE),
        })
    }

    fn issuer_endpoint(&self, path: &str) -> Result<Url> {
        let base = format!("{}/", self.config.issuer.trim_end_matches('/'));
        Url::parse(&base)
            .and_then(|u| u.join(path))
            .with_context(|| format!("Invalid issuer URL: {}", self.config.issuer))
    }

    /// Generate base64url encoded random bytes
    fn generate_random_base64url(length: usize) -> String {
        let mut bytes = vec![0u8; length];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn code_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    fn current_time_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn create_oauth_state(&self) -> Result<OAuthState> {
        let code_verifier = Self::generate_random_base64url(32);
        let oauth_state = OAuthState {
            code_challenge: Self::code_challenge(&code_verifier),
            code_verifier,
            state: Self::generate_random_base64url(8),
            creation_time: Self::current_time_millis(),
        };

        let content = serde_json::to_string_pretty(&oauth_state)
            .context("Failed to serialize OAuth state")?;
        std::fs::write(&self.state_path, content)
            .with_context(|| format!("Failed to write OAuth state: {:?}", self.state_path))?;

        debug!("OAuth state saved to {:?}", self.state_path);
        Ok(oauth_state)
    }

    /// Pending state, if one exists and has not expired
    fn get_oauth_state(&self) -> Option<OAuthState> {
        let content = std::fs::read_to_string(&self.state_path).ok()?;

        let state: OAuthState = match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to parse OAuth state: {}", e);
                return None;
            }
        };

        let age_ms = Self::current_time_millis().saturating_sub(state.creation_time);
        if age_ms < STATE_TTL_MINUTES * 60 * 1000 {
            Some(state)
        } else {
            debug!("OAuth state expired");
            None
        }
    }

    fn remove_oauth_state(&self) {
        if self.state_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.state_path) {
                error!("Failed to remove OAuth state: {}", e);
            }
        }
    }

    fn generate_authorize_url(&self, state: &OAuthState) -> Result<String> {
        let mut url = self.issuer_endpoint(AUTHORIZE_PATH)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", &self.config.response_type)
            .append_pair("scope", &self.config.scope)
            .append_pair("code_challenge", &state.code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &state.state)
            .append_pair("prompt", "login");

        Ok(url.to_string())
    }

    /// Start the flow and return the authorization URL
    pub fn start_flow(&self) -> Result<String> {
        info!("Creating new OAuth session...");

        match self
            .create_oauth_state()
            .and_then(|state| self.generate_authorize_url(&state))
        {
            Ok(url) => Ok(url),
            Err(e) => {
                self.remove_oauth_state();
                Err(e)
            }
        }
    }

    /// Validate the pasted redirect and exchange its code for a token.
    pub async fn complete_flow(&self, pasted: &str) -> Result<TokenResponse> {
        let params = CallbackParams::parse(pasted)?;

        let oauth_state = self.get_oauth_state().context("No OAuth state found")?;
        // State is single-use
        self.remove_oauth_state();

        if params.state.as_deref() != Some(oauth_state.state.as_str()) {
            anyhow::bail!("Unknown state");
        }

        if let Some(error) = &params.error {
            let mut parts = vec![format!("({})", error)];
            if let Some(desc) = &params.error_description {
                parts.push(desc.clone());
            }
            anyhow::bail!("OAuth request failed: {}", parts.join(" "));
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .context("No code")?;

        self.exchange_code(code, &oauth_state.code_verifier).await
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenResponse> {
        let url = self.issuer_endpoint(TOKEN_PATH)?;
        info!("Exchanging authorization code at {}", url);

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(url.clone())
            .form(&form)
            .send()
            .await
            .with_context(|| {
                format!(
                    "If you have a firewall, please add \"{}\" to your allowlist.",
                    self.config.issuer
                )
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read token response")?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("({}) {}", e.error, desc),
                    None => format!("({})", e.error),
                })
                .unwrap_or(body);
            error!("Token exchange failed with {}: {}", status, detail);
            anyhow::bail!("Token exchange failed ({}): {}", status, detail);
        }

        let token: TokenResponse =
            serde_json::from_str(&body).context("Failed to parse token response")?;
        info!("Successfully retrieved access token");
        Ok(token)
    }
}
