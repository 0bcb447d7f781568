use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::{header, HeaderValue};
use reqwest_middleware::{Middleware, Next};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::{Authenticator, ReauthOutcome, SessionPrompt};
use crate::rpc::RpcStatus;

/// Response extension set when this call started or joined a re-authentication.
#[derive(Debug, Clone, Copy)]
pub struct ReauthTriggered {
    pub outcome: ReauthOutcome,
}

/// A call was held back by a re-authentication that the user abandoned.
#[derive(Debug, Error)]
#[error("session expired and re-authentication was abandoned")]
pub struct SessionExpired;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReauthPhase {
    Idle,
    InProgress,
    Finished(ReauthOutcome),
}

/// Attaches the bearer credential and runs the session-expired flow.
///
/// While a flow is running, new calls on the chain wait for it. Calls that
/// waited are sent with the fresh credential if the flow completed and fail
/// with [`SessionExpired`] if it was abandoned.
pub struct AuthInterceptor {
    authenticator: Arc<dyn Authenticator>,
    prompt: Arc<dyn SessionPrompt>,
    gate: watch::Sender<ReauthPhase>,
    flows_started: AtomicU64,
}

impl AuthInterceptor {
    pub fn new(authenticator: Arc<dyn Authenticator>, prompt: Arc<dyn SessionPrompt>) -> Self {
        let (gate, _) = watch::channel(ReauthPhase::Idle);
        Self {
            authenticator,
            prompt,
            gate,
            flows_started: AtomicU64::new(0),
        }
    }

    pub fn flows_started(&self) -> u64 {
        self.flows_started.load(Ordering::SeqCst)
    }

    /// Hold the call while a re-authentication is in progress.
    async fn wait_for_session(&self) -> Result<(), SessionExpired> {
        let mut rx = self.gate.subscribe();
        let mut waited = false;
        loop {
            let phase = *rx.borrow_and_update();
            match phase {
                ReauthPhase::InProgress => {
                    waited = true;
                    if rx.changed().await.is_err() {
                        return Ok(());
                    }
                }
                ReauthPhase::Finished(ReauthOutcome::Abandoned) if waited => {
                    return Err(SessionExpired);
                }
                _ => return Ok(()),
            }
        }
    }

    /// Start the flow, or join the one already running.
    async fn reauthenticate(&self) -> ReauthOutcome {
        let started = self.gate.send_if_modified(|phase| {
            if *phase == ReauthPhase::InProgress {
                false
            } else {
                *phase = ReauthPhase::InProgress;
                true
            }
        });

        if !started {
            debug!("Joining re-authentication already in progress");
            let mut rx = self.gate.subscribe();
            loop {
                if let ReauthPhase::Finished(outcome) = *rx.borrow_and_update() {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    return ReauthOutcome::Abandoned;
                }
            }
        }

        self.flows_started.fetch_add(1, Ordering::SeqCst);
        let mut flow = FlowGuard {
            gate: &self.gate,
            outcome: ReauthOutcome::Abandoned,
        };

        warn!("Session expired, asking to log in again");
        flow.outcome = if self.prompt.confirm_session_expired().await {
            self.authenticator.reauthenticate().await
        } else {
            ReauthOutcome::Abandoned
        };

        match flow.outcome {
            ReauthOutcome::Completed => info!("Re-authentication completed"),
            ReauthOutcome::Abandoned => warn!("Re-authentication abandoned"),
        }
        flow.outcome
    }
}

/// Publishes the flow's outcome even if the flow future is dropped midway.
struct FlowGuard<'a> {
    gate: &'a watch::Sender<ReauthPhase>,
    outcome: ReauthOutcome,
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        self.gate.send_replace(ReauthPhase::Finished(self.outcome));
    }
}

#[async_trait]
impl Middleware for AuthInterceptor {
    async fn handle(
        &self,
        mut req: reqwest::Request,
        ext: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        self.wait_for_session()
            .await
            .map_err(reqwest_middleware::Error::middleware)?;

        if let Some(token) = self.authenticator.access_token().await {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    req.headers_mut().insert(header::AUTHORIZATION, value);
                }
                Err(e) => warn!("Failed to build authorization header: {}", e),
            }
        }

        let mut response = next.run(req, ext).await?;

        if RpcStatus::of(&response) == RpcStatus::Unauthenticated {
            let outcome = self.reauthenticate().await;
            response
                .extensions_mut()
                .insert(ReauthTriggered { outcome });
        }

        Ok(response)
    }
}
