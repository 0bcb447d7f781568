use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::{Middleware, Next};
use tracing::{debug, warn};

use super::auth::ReauthTriggered;
use crate::rpc::{status_message, RpcStatus};

/// Details of a call the server rejected for exhausted quota.
#[derive(Debug, Clone)]
pub struct ExhaustionContext {
    pub method: String,
    pub message: Option<String>,
    pub instance_management_url: Option<String>,
    pub at: DateTime<Utc>,
}

/// Reacts to exhausted quota (notice, backoff banner, ...).
pub trait ExhaustionPolicy: Send + Sync {
    fn report_exhausted(&self, context: &ExhaustionContext);
}

/// Response extension marking a call the exhaustion unit recognized.
#[derive(Debug, Clone)]
pub struct Exhausted {
    pub instance_management_url: Option<String>,
}

/// Snapshot of the exhaustion unit's counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExhaustionState {
    /// Calls that produced a response
    pub observed_calls: u64,
    /// Calls rejected with `ResourceExhausted`
    pub exhausted_calls: u64,
    pub last_status: Option<RpcStatus>,
    /// Whether the last response had triggered a re-authentication
    pub last_reauth_triggered: bool,
    pub last_exhausted_at: Option<DateTime<Utc>>,
}

impl ExhaustionState {
    pub fn is_exhausted(&self) -> bool {
        self.last_status == Some(RpcStatus::ResourceExhausted)
    }
}

#[derive(Debug, Default)]
struct LastOutcome {
    status: Option<RpcStatus>,
    reauth_triggered: bool,
    exhausted_at: Option<DateTime<Utc>>,
}

/// Outermost unit: accounts for every outcome and flags exhausted quota.
pub struct ExhaustionInterceptor {
    policy: Arc<dyn ExhaustionPolicy>,
    instance_management_url: Option<String>,
    observed: AtomicU64,
    exhausted: AtomicU64,
    last: Mutex<LastOutcome>,
}

impl ExhaustionInterceptor {
    pub fn new(policy: Arc<dyn ExhaustionPolicy>, instance_management_url: Option<String>) -> Self {
        Self {
            policy,
            instance_management_url,
            observed: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            last: Mutex::new(LastOutcome::default()),
        }
    }

    pub fn state(&self) -> ExhaustionState {
        let last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        ExhaustionState {
            observed_calls: self.observed.load(Ordering::SeqCst),
            exhausted_calls: self.exhausted.load(Ordering::SeqCst),
            last_status: last.status,
            last_reauth_triggered: last.reauth_triggered,
            last_exhausted_at: last.exhausted_at,
        }
    }

    fn record(&self, method: &str, response: &mut reqwest::Response) {
        let status = RpcStatus::of(response);
        let reauth_triggered = response.extensions().get::<ReauthTriggered>().is_some();
        self.observed.fetch_add(1, Ordering::SeqCst);

        let exhausted_at = (status == RpcStatus::ResourceExhausted).then(Utc::now);
        {
            let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
            last.status = Some(status);
            last.reauth_triggered = reauth_triggered;
            if exhausted_at.is_some() {
                last.exhausted_at = exhausted_at;
            }
        }

        let Some(at) = exhausted_at else {
            return;
        };

        let total = self.exhausted.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("{} rejected for exhausted quota ({} so far)", method, total);

        self.policy.report_exhausted(&ExhaustionContext {
            method: method.to_string(),
            message: status_message(response.headers()),
            instance_management_url: self.instance_management_url.clone(),
            at,
        });
        response.extensions_mut().insert(Exhausted {
            instance_management_url: self.instance_management_url.clone(),
        });
    }
}

#[async_trait]
impl Middleware for ExhaustionInterceptor {
    async fn handle(
        &self,
        req: reqwest::Request,
        ext: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.url().path().to_string();
        let mut outcome = next.run(req, ext).await;

        // Transport failures carry no status and pass through untouched.
        if let Ok(response) = outcome.as_mut() {
            self.record(&method, response);
        }
        outcome
    }
}

/// Logs a warning the first time quota runs out in this process.
#[derive(Debug, Default)]
pub struct LoggingExhaustionPolicy {
    warned: AtomicBool,
}

impl ExhaustionPolicy for LoggingExhaustionPolicy {
    fn report_exhausted(&self, context: &ExhaustionContext) {
        if self.warned.swap(true, Ordering::SeqCst) {
            debug!("Quota still exhausted ({})", context.method);
            return;
        }

        warn!("⚠️  The instance has exhausted its quota; requests are being rejected.");
        if let Some(message) = &context.message {
            warn!("   {}", message);
        }
        match &context.instance_management_url {
            Some(url) => warn!("   Raise the limit at {}", url),
            None => warn!("   Contact your instance administrator."),
        }
    }
}
