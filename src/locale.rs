//! Active locale and translation bundles.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

/// Locale used when nothing better can be detected.
pub const DEFAULT_LOCALE: &str = "en";

/// Languages the console ships translations for.
pub const SUPPORTED_LOCALES: &[&str] = &[
    "bg", "cs", "de", "en", "es", "fr", "hu", "id", "it", "ja", "ko", "mk", "nl", "pl", "pt",
    "ro", "ru", "sv", "tr", "uk", "zh",
];

/// Environment variables consulted for the user's language, in priority order.
const LOCALE_ENV_VARS: &[&str] = &["LC_ALL", "LC_MESSAGES", "LANG"];

#[derive(Debug, Error)]
pub enum LocaleError {
    #[error("unsupported locale '{0}'")]
    Unsupported(String),
    #[error("failed to read translations for '{locale}' from {path:?}: {source}")]
    Read {
        locale: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("translations for '{locale}' are not valid JSON: {source}")]
    Parse {
        locale: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Provides the UI language and loads its translations.
#[async_trait]
pub trait LocaleSource: Send + Sync {
    /// Language detected from the user's environment, if any.
    fn detected_locale(&self) -> Option<String>;

    fn default_locale(&self) -> String {
        DEFAULT_LOCALE.to_string()
    }

    /// Language currently in use. Read on every outgoing call.
    fn active_locale(&self) -> String;

    /// Load translations for `locale` and make it the active language.
    async fn load(&self, locale: &str) -> Result<(), LocaleError>;
}

/// Reduce a POSIX locale such as `de_CH.UTF-8` to its language (`de`).
pub fn language_of(raw: &str) -> Option<String> {
    let lang = raw
        .split(['.', '@'])
        .next()?
        .split(['_', '-'])
        .next()?
        .trim()
        .to_ascii_lowercase();

    if lang.is_empty() || lang == "c" || lang == "posix" {
        return None;
    }
    Some(lang)
}

/// Translation bundles stored as `<dir>/<lang>.json`.
pub struct TranslationCatalog {
    dir: PathBuf,
    active: RwLock<String>,
    strings: RwLock<HashMap<String, serde_json::Value>>,
}

impl TranslationCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            active: RwLock::new(DEFAULT_LOCALE.to_string()),
            strings: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a dotted key (`ERRORS.EXHAUSTED.TITLE`) in the active bundle.
    pub fn translate(&self, key: &str) -> Option<String> {
        let active = self.active_locale();
        let strings = self.strings.read().ok()?;
        let mut node = strings.get(&active)?;
        for part in key.split('.') {
            node = node.get(part)?;
        }
        node.as_str().map(ToOwned::to_owned)
    }

    fn detect_from_env() -> Option<String> {
        LOCALE_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .filter_map(|raw| language_of(&raw))
            .find(|lang| SUPPORTED_LOCALES.contains(&lang.as_str()))
    }
}

#[async_trait]
impl LocaleSource for TranslationCatalog {
    fn detected_locale(&self) -> Option<String> {
        Self::detect_from_env()
    }

    fn active_locale(&self) -> String {
        self.active
            .read()
            .map(|l| l.clone())
            .unwrap_or_else(|_| DEFAULT_LOCALE.to_string())
    }

    async fn load(&self, locale: &str) -> Result<(), LocaleError> {
        if !SUPPORTED_LOCALES.contains(&locale) {
            return Err(LocaleError::Unsupported(locale.to_string()));
        }

        let path = self.dir.join(format!("{}.json", locale));
        debug!("Loading translations from {:?}", path);

        let content =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| LocaleError::Read {
                    locale: locale.to_string(),
                    path: path.clone(),
                    source,
                })?;
        let bundle: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| LocaleError::Parse {
                locale: locale.to_string(),
                source,
            })?;

        if let Ok(mut strings) = self.strings.write() {
            strings.insert(locale.to_string(), bundle);
        }
        if let Ok(mut active) = self.active.write() {
            *active = locale.to_string();
        }

        info!("Using locale '{}'", locale);
        Ok(())
    }
}
