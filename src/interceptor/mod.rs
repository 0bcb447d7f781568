//! Interceptor pipeline shared by every RPC client of one bootstrap.
//!
//! Four units wrap each call, outermost first:
//!
//! ```text
//! Exhaustion -> Organization -> Authentication -> Localization -> transport
//! ```
//!
//! Request-side work runs top to bottom before the request is sent, outcome
//! handling runs bottom to top. Exhaustion therefore sees the outcome after
//! the authentication unit has reacted to it.
//!
//! The chain is created once per bootstrap and handed to the clients as an
//! `Arc`, so counters, the re-auth gate and the cached HTTP client are the
//! same object for all surfaces.

mod auth;
mod exhausted;
mod i18n;
mod org;

pub use auth::{AuthInterceptor, ReauthTriggered, SessionExpired};
pub use exhausted::{
    Exhausted, ExhaustionContext, ExhaustionInterceptor, ExhaustionPolicy, ExhaustionState,
    LoggingExhaustionPolicy,
};
pub use i18n::{I18nInterceptor, ACCEPT_LANGUAGE_HEADER};
pub use org::{OrgContextStore, OrgInterceptor, ORG_ID_HEADER, ORG_NOT_FOUND_PREFIX};

use std::sync::Arc;
use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware};
use tracing::debug;

use crate::auth::{Authenticator, SessionPrompt};
use crate::environment::EnvironmentConfig;
use crate::locale::LocaleSource;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default client version (from Cargo.toml)
const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Unit names in wrapping order.
pub const UNIT_ORDER: [&str; 4] = ["exhaustion", "org", "auth", "i18n"];

/// Collaborators the units depend on.
#[derive(Clone)]
pub struct ChainParts {
    pub exhaustion_policy: Arc<dyn ExhaustionPolicy>,
    pub org_context: Arc<dyn OrgContextStore>,
    pub authenticator: Arc<dyn Authenticator>,
    pub prompt: Arc<dyn SessionPrompt>,
    pub locale: Arc<dyn LocaleSource>,
}

/// The ordered interceptor units plus the HTTP client built from them.
pub struct InterceptorChain {
    exhaustion: Arc<ExhaustionInterceptor>,
    org: Arc<OrgInterceptor>,
    auth: Arc<AuthInterceptor>,
    i18n: Arc<I18nInterceptor>,
    http: ClientWithMiddleware,
}

impl InterceptorChain {
    /// Build the chain for `env` with the default transport.
    pub fn new(env: &EnvironmentConfig, parts: ChainParts) -> Result<Self, reqwest::Error> {
        let transport = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(format!("console-rpc/{}", DEFAULT_VERSION))
            .build()?;
        Ok(Self::with_transport(env, parts, transport))
    }

    /// Build the chain on top of an existing `reqwest::Client`.
    pub fn with_transport(
        env: &EnvironmentConfig,
        parts: ChainParts,
        transport: reqwest::Client,
    ) -> Self {
        let exhaustion = Arc::new(ExhaustionInterceptor::new(
            parts.exhaustion_policy,
            env.instance_management_url.clone(),
        ));
        let org = Arc::new(OrgInterceptor::new(parts.org_context));
        let auth = Arc::new(AuthInterceptor::new(parts.authenticator, parts.prompt));
        let i18n = Arc::new(I18nInterceptor::new(parts.locale));

        let http = ordered(&exhaustion, &org, &auth, &i18n)
            .into_iter()
            .fold(ClientBuilder::new(transport), |builder, unit| {
                builder.with_arc(unit)
            })
            .build();

        debug!("Interceptor chain assembled: {}", UNIT_ORDER.join(" -> "));
        Self {
            exhaustion,
            org,
            auth,
            i18n,
            http,
        }
    }

    /// The units in wrapping order, outermost first.
    pub fn units(&self) -> [Arc<dyn Middleware>; 4] {
        ordered(&self.exhaustion, &self.org, &self.auth, &self.i18n)
    }

    pub fn unit_names(&self) -> [&'static str; 4] {
        UNIT_ORDER
    }

    /// HTTP client that runs every request through the units.
    pub fn http(&self) -> &ClientWithMiddleware {
        &self.http
    }

    pub fn exhaustion_state(&self) -> ExhaustionState {
        self.exhaustion.state()
    }

    /// Number of re-authentication flows this chain has started.
    pub fn reauth_flows_started(&self) -> u64 {
        self.auth.flows_started()
    }
}

fn ordered(
    exhaustion: &Arc<ExhaustionInterceptor>,
    org: &Arc<OrgInterceptor>,
    auth: &Arc<AuthInterceptor>,
    i18n: &Arc<I18nInterceptor>,
) -> [Arc<dyn Middleware>; 4] {
    [exhaustion.clone(), org.clone(), auth.clone(), i18n.clone()]
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("units", &UNIT_ORDER)
            .field("exhaustion", &self.exhaustion.state())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use wiremock::matchers::any;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::testing::Fakes;
    use super::*;

    /// Records which headers were present when the request passed by.
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<(&'static str, Vec<String>)>>>,
    }

    #[async_trait]
    impl Middleware for Probe {
        async fn handle(
            &self,
            req: reqwest::Request,
            ext: &mut http::Extensions,
            next: reqwest_middleware::Next<'_>,
        ) -> reqwest_middleware::Result<reqwest::Response> {
            let mut seen: Vec<String> = [ORG_ID_HEADER, "authorization", ACCEPT_LANGUAGE_HEADER]
                .iter()
                .filter(|h| req.headers().contains_key(**h))
                .map(|h| h.to_string())
                .collect();
            seen.sort();
            self.log.lock().unwrap().push((self.name, seen));
            next.run(req, ext).await
        }
    }

    async fn ok_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_unit_order_is_fixed() {
        let fakes = Fakes::new(None, None);
        let chain = InterceptorChain::new(&EnvironmentConfig::default(), fakes.parts()).unwrap();
        assert_eq!(chain.unit_names(), ["exhaustion", "org", "auth", "i18n"]);
    }

    #[tokio::test]
    async fn test_request_side_effects_apply_in_order() {
        let server = ok_server().await;
        let fakes = Fakes::new(Some("org-1"), Some("token-1"));
        let chain = InterceptorChain::new(&EnvironmentConfig::default(), fakes.parts()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut builder = ClientBuilder::new(reqwest::Client::new());
        for (unit, name) in chain.units().into_iter().zip(UNIT_ORDER) {
            builder = builder.with_arc(unit).with(Probe {
                name,
                log: log.clone(),
            });
        }
        builder
            .build()
            .get(format!("{}/probe", server.uri()))
            .send()
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[0], ("exhaustion", vec![]));
        assert_eq!(log[1], ("org", vec![ORG_ID_HEADER.to_string()]));
        assert_eq!(
            log[2],
            (
                "auth",
                vec!["authorization".to_string(), ORG_ID_HEADER.to_string()]
            )
        );
        assert_eq!(
            log[3],
            (
                "i18n",
                vec![
                    ACCEPT_LANGUAGE_HEADER.to_string(),
                    "authorization".to_string(),
                    ORG_ID_HEADER.to_string()
                ]
            )
        );
        // Exhaustion only acts on the way back out.
        assert_eq!(chain.exhaustion_state().observed_calls, 1);
    }

    #[tokio::test]
    async fn test_chain_attaches_all_metadata() {
        let server = ok_server().await;
        let fakes = Fakes::new(Some("org-1"), Some("token-1"));
        let chain = InterceptorChain::new(&EnvironmentConfig::default(), fakes.parts()).unwrap();

        chain
            .http()
            .get(format!("{}/auth/v1/users/me", server.uri()))
            .send()
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let headers = &requests[0].headers;
        assert_eq!(headers.get(ORG_ID_HEADER).unwrap(), "org-1");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token-1");
        assert_eq!(headers.get(ACCEPT_LANGUAGE_HEADER).unwrap(), "de");
        assert_eq!(chain.exhaustion_state().observed_calls, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_sees_post_reauth_outcome() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let fakes = Fakes::new(None, Some("stale"));
        let chain = InterceptorChain::new(&EnvironmentConfig::default(), fakes.parts()).unwrap();

        let response = chain
            .http()
            .get(format!("{}/management/v1/orgs/me", server.uri()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 401);
        assert!(response.extensions().get::<ReauthTriggered>().is_some());
        assert_eq!(chain.reauth_flows_started(), 1);

        let state = chain.exhaustion_state();
        assert_eq!(state.observed_calls, 1);
        assert_eq!(state.exhausted_calls, 0);
        assert_eq!(state.last_status, Some(crate::rpc::RpcStatus::Unauthenticated));
        assert!(state.last_reauth_triggered);
    }
}
