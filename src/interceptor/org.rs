use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use reqwest_middleware::{Middleware, Next};
use tracing::{info, warn};

use crate::rpc::{status_message, RpcStatus};

/// Request metadata selecting the organization a call operates on.
pub const ORG_ID_HEADER: &str = "x-zitadel-orgid";

/// Message prefix the API uses when the selected organization is gone.
pub const ORG_NOT_FOUND_PREFIX: &str = "Organisation doesn't exist";

/// Holds the currently selected organization.
pub trait OrgContextStore: Send + Sync {
    fn current_org_id(&self) -> Option<String>;

    /// Drop the selection, e.g. because the organization no longer exists.
    fn forget_org(&self);
}

/// Pins each call to the selected organization, if any.
pub struct OrgInterceptor {
    store: Arc<dyn OrgContextStore>,
}

impl OrgInterceptor {
    pub fn new(store: Arc<dyn OrgContextStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Middleware for OrgInterceptor {
    async fn handle(
        &self,
        mut req: reqwest::Request,
        ext: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        if let Some(org_id) = self.store.current_org_id().filter(|id| !id.is_empty()) {
            match HeaderValue::from_str(&org_id) {
                Ok(value) => {
                    req.headers_mut().insert(ORG_ID_HEADER, value);
                }
                Err(e) => warn!("Skipping unusable organization id {:?}: {}", org_id, e),
            }
        }

        let response = next.run(req, ext).await?;

        let status = RpcStatus::of(&response);
        if matches!(status, RpcStatus::PermissionDenied | RpcStatus::NotFound) {
            let org_gone = status_message(response.headers())
                .map(|m| m.starts_with(ORG_NOT_FOUND_PREFIX))
                .unwrap_or(false);
            if org_gone {
                info!("Selected organization no longer exists, clearing selection");
                self.store.forget_org();
            }
        }

        Ok(response)
    }
}
