//! Session storage.
//!
//! Persists the bearer token and the selected organization in
//! `session.json` under the cache directory. The in-memory copy is what the
//! interceptors read on every call; disk is only touched on changes.

use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::interceptor::OrgContextStore;

/// Environment variable that overrides the stored access token.
pub const ACCESS_TOKEN_ENV: &str = "CONSOLE_ACCESS_TOKEN";

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not determine home directory")]
    NoHomeDir,
    #[error("session I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize session data: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Session data structure stored in session.json
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
}

impl std::fmt::Debug for SessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionData")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("issuer", &self.issuer)
            .field("org_id", &self.org_id)
            .finish()
    }
}

/// Resolve the cache directory, defaulting to `~/.console-rpc`.
pub fn cache_dir(custom: Option<String>) -> Result<PathBuf, SessionError> {
    match custom {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(dirs::home_dir()
            .ok_or(SessionError::NoHomeDir)?
            .join(".console-rpc")),
    }
}

/// File-backed session store
pub struct SessionStore {
    session_path: PathBuf,
    data: RwLock<SessionData>,
}

impl SessionStore {
    /// Open (or create) the session store in `cache_dir`.
    pub fn open(cache_dir: PathBuf) -> Result<Self, SessionError> {
        std::fs::create_dir_all(&cache_dir).map_err(|source| SessionError::Io {
            path: cache_dir.clone(),
            source,
        })?;

        let session_path = cache_dir.join(SESSION_FILE);
        let data = Self::read_file(&session_path);

        Ok(Self {
            session_path,
            data: RwLock::new(data),
        })
    }

    /// Session store that never touches disk.
    pub fn in_memory(data: SessionData) -> Self {
        Self {
            session_path: PathBuf::new(),
            data: RwLock::new(data),
        }
    }

    pub fn session_path(&self) -> &PathBuf {
        &self.session_path
    }

    fn read_file(path: &PathBuf) -> SessionData {
        if !path.exists() {
            return SessionData::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<SessionData>(&content) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Ignoring invalid session file {:?}: {}", path, e);
                    SessionData::default()
                }
            },
            Err(e) => {
                warn!("Failed to read session file {:?}: {}", path, e);
                SessionData::default()
            }
        }
    }

    fn persist(&self, data: &SessionData) -> Result<(), SessionError> {
        if self.session_path.as_os_str().is_empty() {
            return Ok(());
        }

        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.session_path, content).map_err(|source| SessionError::Io {
            path: self.session_path.clone(),
            source,
        })?;
        debug!("Session saved to {:?}", self.session_path);
        Ok(())
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, SessionData> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a change and persist it. The guard is held until the file is
    /// written so disk always ends with the latest in-memory state.
    fn update(&self, apply: impl FnOnce(&mut SessionData)) -> Result<(), SessionError> {
        let mut data = self.write_guard();
        apply(&mut data);
        self.persist(&data)
    }

    pub fn snapshot(&self) -> SessionData {
        self.data
            .read()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Token from `CONSOLE_ACCESS_TOKEN`, falling back to the stored one.
    pub fn access_token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.is_empty() {
                return Some(token);
            }
        }
        self.snapshot().access_token.filter(|t| !t.is_empty())
    }

    pub fn is_logged_in(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn save_token(&self, access_token: &str, issuer: &str) -> Result<(), SessionError> {
        self.update(|data| {
            data.access_token = Some(access_token.to_string());
            data.issuer = Some(issuer.to_string());
        })?;
        info!("Session saved successfully");
        Ok(())
    }

    /// Drop the credential but keep the organization selection.
    pub fn clear_token(&self) -> Result<(), SessionError> {
        self.update(|data| data.access_token = None)
    }

    pub fn set_org(&self, org_id: &str) -> Result<(), SessionError> {
        self.update(|data| data.org_id = Some(org_id.to_string()))
    }

    pub fn clear_org(&self) -> Result<(), SessionError> {
        self.update(|data| data.org_id = None)
    }

    /// Remove the session file entirely.
    pub fn remove_session(&self) -> Result<(), SessionError> {
        let mut data = self.write_guard();
        *data = SessionData::default();
        if self.session_path.exists() {
            std::fs::remove_file(&self.session_path).map_err(|source| SessionError::Io {
                path: self.session_path.clone(),
                source,
            })?;
        }
        drop(data);
        info!("Session removed successfully");
        Ok(())
    }
}

impl OrgContextStore for SessionStore {
    fn current_org_id(&self) -> Option<String> {
        self.snapshot().org_id.filter(|id| !id.is_empty())
    }

    fn forget_org(&self) {
        if let Err(e) = self.clear_org() {
            warn!("Failed to clear organization selection: {}", e);
        }
    }
}
