use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use reqwest_middleware::{Middleware, Next};
use tracing::warn;

use crate::locale::LocaleSource;

pub const ACCEPT_LANGUAGE_HEADER: &str = "accept-language";

/// Sends the UI language so server-side messages come back translated.
pub struct I18nInterceptor {
    locale: Arc<dyn LocaleSource>,
}

impl I18nInterceptor {
    pub fn new(locale: Arc<dyn LocaleSource>) -> Self {
        Self { locale }
    }
}

#[async_trait]
impl Middleware for I18nInterceptor {
    async fn handle(
        &self,
        mut req: reqwest::Request,
        ext: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let locale = self.locale.active_locale();
        match HeaderValue::from_str(&locale) {
            Ok(value) => {
                req.headers_mut().insert(ACCEPT_LANGUAGE_HEADER, value);
            }
            Err(e) => warn!("Skipping unusable locale {:?}: {}", locale, e),
        }

        next.run(req, ext).await
    }
}
