use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::auth::{BrandingPolicy, StaticLocation};
use crate::environment::{
    EnvironmentConfig, EnvironmentError, EnvironmentResolver, StaticEnvironmentResolver,
};
use crate::interceptor::testing::{FakeAuth, FakeOrg, FakePrompt, RecordingPolicy};
use crate::interceptor::ORG_ID_HEADER;
use crate::locale::{LocaleError, LocaleSource};
use crate::rpc::Surface;

type Log = Arc<Mutex<Vec<String>>>;

struct RecordingLocale {
    detected: Option<&'static str>,
    fail: bool,
    log: Log,
}

#[async_trait]
impl LocaleSource for RecordingLocale {
    fn detected_locale(&self) -> Option<String> {
        self.detected.map(ToOwned::to_owned)
    }

    fn active_locale(&self) -> String {
        self.detected.unwrap_or("en").to_string()
    }

    async fn load(&self, locale: &str) -> Result<(), LocaleError> {
        self.log.lock().unwrap().push(format!("locale:{}", locale));
        if self.fail {
            return Err(LocaleError::Unsupported(locale.to_string()));
        }
        Ok(())
    }
}

/// Returns its configs in order; the first call can be slowed down.
struct ScriptedEnvironment {
    results: Mutex<Vec<Result<Option<EnvironmentConfig>, EnvironmentError>>>,
    first_delay: Option<Duration>,
    calls: AtomicUsize,
    log: Log,
}

#[async_trait]
impl EnvironmentResolver for ScriptedEnvironment {
    async fn resolve(&self) -> Result<Option<EnvironmentConfig>, EnvironmentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("environment".to_string());
        let result = self.results.lock().unwrap().remove(0);
        if call == 0 {
            if let Some(delay) = self.first_delay {
                tokio::time::sleep(delay).await;
            }
        }
        result
    }
}

struct CountingBranding {
    applied: AtomicUsize,
    log: Log,
}

impl BrandingPolicy for CountingBranding {
    fn apply_label_policy(&self) {
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("branding".to_string());
    }
}

struct Harness {
    auth: Arc<FakeAuth>,
    branding: Arc<CountingBranding>,
    environment: Arc<ScriptedEnvironment>,
    log: Log,
    bootstrapper: Bootstrapper,
}

struct HarnessBuilder {
    envs: Vec<Result<Option<EnvironmentConfig>, EnvironmentError>>,
    first_delay: Option<Duration>,
    detected: Option<&'static str>,
    locale_fails: bool,
    org_id: Option<&'static str>,
    token: Option<&'static str>,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            envs: Vec::new(),
            first_delay: None,
            detected: Some("de"),
            locale_fails: false,
            org_id: None,
            token: Some("token-1"),
        }
    }

    fn env(mut self, env: Result<Option<EnvironmentConfig>, EnvironmentError>) -> Self {
        self.envs.push(env);
        self
    }

    fn build(self) -> Harness {
        let log: Log = Arc::default();
        let auth = Arc::new(FakeAuth::with_token(self.token));
        let branding = Arc::new(CountingBranding {
            applied: AtomicUsize::new(0),
            log: log.clone(),
        });
        let environment = Arc::new(ScriptedEnvironment {
            results: Mutex::new(self.envs),
            first_delay: self.first_delay,
            calls: AtomicUsize::new(0),
            log: log.clone(),
        });

        let collaborators = Collaborators {
            environment: environment.clone(),
            locale: Arc::new(RecordingLocale {
                detected: self.detected,
                fail: self.locale_fails,
                log: log.clone(),
            }),
            authenticator: auth.clone(),
            prompt: Arc::new(FakePrompt::answering(false)),
            org_context: Arc::new(FakeOrg::with(self.org_id)),
            exhaustion_policy: Arc::new(RecordingPolicy::default()),
            location: Arc::new(StaticLocation::new("https://console.x", "/")),
            branding: branding.clone(),
        };

        Harness {
            auth,
            branding,
            environment,
            log,
            bootstrapper: Bootstrapper::new(collaborators),
        }
    }
}

fn complete_env(api: &str) -> EnvironmentConfig {
    EnvironmentConfig::new(api, "https://issuer.x", "client-1")
}

#[tokio::test]
async fn test_installs_three_clients_sharing_one_chain() {
    let h = HarnessBuilder::new()
        .env(Ok(Some(complete_env("https://api.x"))))
        .build();

    let outcome = h.bootstrapper.bootstrap().await.unwrap();
    assert!(matches!(outcome, BootstrapOutcome::Installed { attempt: 1, .. }));

    let clients = h.bootstrapper.clients().expect("clients installed");
    assert!(Arc::ptr_eq(clients.auth.chain(), clients.mgmt.chain()));
    assert!(Arc::ptr_eq(clients.mgmt.chain(), clients.admin.chain()));
    assert_eq!(clients.auth.base_url().as_str(), "https://api.x/");
    assert_eq!(clients.get(Surface::Management).surface(), Surface::Management);
    assert_eq!(clients.get(Surface::Admin).surface(), Surface::Admin);
    assert!(h.bootstrapper.auth().is_some());
    assert!(h.bootstrapper.mgmt().is_some());
    assert!(h.bootstrapper.admin().is_some());
}

#[tokio::test]
async fn test_steps_run_in_order() {
    let h = HarnessBuilder::new()
        .env(Ok(Some(complete_env("https://api.x"))))
        .build();

    h.bootstrapper.bootstrap().await.unwrap();

    let log = h.log.lock().unwrap().clone();
    assert_eq!(log, vec!["branding", "locale:de", "environment"]);
    assert_eq!(h.auth.configs.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_falls_back_to_default_locale() {
    let mut builder = HarnessBuilder::new().env(Ok(Some(complete_env("https://api.x"))));
    builder.detected = None;
    let h = builder.build();

    h.bootstrapper.bootstrap().await.unwrap();

    assert_eq!(h.log.lock().unwrap()[1], "locale:en");
}

#[tokio::test]
async fn test_hands_auth_config_to_authenticator() {
    let h = HarnessBuilder::new()
        .env(Ok(Some(complete_env("https://api.x"))))
        .build();

    let outcome = h.bootstrapper.bootstrap().await.unwrap();

    let configs = h.auth.configs.lock().unwrap().clone();
    assert_eq!(configs.len(), 1);
    let config = &configs[0];
    assert_eq!(config.redirect_uri, "https://console.x/auth/callback");
    assert_eq!(config.post_logout_redirect_uri, "https://console.x/signedout");
    assert_eq!(config.issuer, "https://issuer.x");
    assert_eq!(config.client_id, "client-1");
    assert_eq!(config.response_type, "code");
    assert!(config.oidc);
    assert!(!config.require_https);

    match outcome {
        BootstrapOutcome::Installed { auth_config, .. } => assert_eq!(&auth_config, config),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_api_creates_no_clients() {
    let mut env = complete_env("https://api.x");
    env.api = None;
    let h = HarnessBuilder::new().env(Ok(Some(env))).build();

    let outcome = h.bootstrapper.bootstrap().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::SkippedIncompleteEnvironment);
    assert!(h.bootstrapper.clients().is_none());
    assert!(h.auth.configs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_issuer_creates_no_clients() {
    let mut env = complete_env("https://api.x");
    env.issuer = Some("  ".to_string());
    let h = HarnessBuilder::new().env(Ok(Some(env))).build();

    let outcome = h.bootstrapper.bootstrap().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::SkippedIncompleteEnvironment);
    assert!(h.bootstrapper.mgmt().is_none());
    assert!(h.auth.configs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_absent_environment_creates_no_clients() {
    let h = HarnessBuilder::new().env(Ok(None)).build();

    let outcome = h.bootstrapper.bootstrap().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::SkippedIncompleteEnvironment);
    assert!(h.bootstrapper.clients().is_none());
}

#[tokio::test]
async fn test_incomplete_environment_keeps_previous_clients() {
    let mut incomplete = complete_env("https://api.x");
    incomplete.issuer = None;
    let h = HarnessBuilder::new()
        .env(Ok(Some(complete_env("https://api.x"))))
        .env(Ok(Some(incomplete)))
        .build();

    h.bootstrapper.bootstrap().await.unwrap();
    let first = h.bootstrapper.clients().unwrap();
    h.bootstrapper.bootstrap().await.unwrap();

    let current = h.bootstrapper.clients().unwrap();
    assert!(Arc::ptr_eq(&first, &current));
}

#[tokio::test]
async fn test_environment_error_propagates() {
    let h = HarnessBuilder::new()
        .env(Err(EnvironmentError::Closed))
        .build();

    let err = h.bootstrapper.bootstrap().await.unwrap_err();

    assert!(matches!(err, BootstrapError::Environment(EnvironmentError::Closed)));
    assert!(h.bootstrapper.clients().is_none());
    assert!(h.auth.configs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_locale_error_stops_before_environment() {
    let mut builder = HarnessBuilder::new().env(Ok(Some(complete_env("https://api.x"))));
    builder.locale_fails = true;
    let h = builder.build();

    let err = h.bootstrapper.bootstrap().await.unwrap_err();

    match err {
        BootstrapError::Locale { locale, .. } => assert_eq!(locale, "de"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.environment.calls.load(Ordering::SeqCst), 0);
    assert!(h.bootstrapper.clients().is_none());
}

#[tokio::test]
async fn test_invalid_api_url_is_reported() {
    let h = HarnessBuilder::new()
        .env(Ok(Some(complete_env("not a url"))))
        .build();

    let err = h.bootstrapper.bootstrap().await.unwrap_err();

    assert!(matches!(err, BootstrapError::InvalidBaseUrl(_)));
    assert!(h.bootstrapper.clients().is_none());
    assert!(h.auth.configs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_branding_applied_even_when_skipped() {
    let h = HarnessBuilder::new().env(Ok(None)).build();

    h.bootstrapper.bootstrap().await.unwrap();

    assert_eq!(h.branding.applied.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rebootstrap_replaces_clients_as_a_unit() {
    let h = HarnessBuilder::new()
        .env(Ok(Some(complete_env("https://api-one.x"))))
        .env(Ok(Some(complete_env("https://api-two.x"))))
        .build();

    h.bootstrapper.bootstrap().await.unwrap();
    let first = h.bootstrapper.clients().unwrap();
    let outcome = h.bootstrapper.bootstrap().await.unwrap();
    let second = h.bootstrapper.clients().unwrap();

    assert!(matches!(outcome, BootstrapOutcome::Installed { attempt: 2, .. }));
    assert_eq!(h.bootstrapper.attempts(), 2);
    assert_eq!(second.attempt, 2);
    assert!(!Arc::ptr_eq(first.chain(), second.chain()));
    assert!(Arc::ptr_eq(second.auth.chain(), second.mgmt.chain()));
    assert!(Arc::ptr_eq(second.mgmt.chain(), second.admin.chain()));
    assert_eq!(second.admin.base_url().as_str(), "https://api-two.x/");

    // Clients handed out earlier keep working against their own chain
    assert_eq!(first.mgmt.base_url().as_str(), "https://api-one.x/");
}

#[tokio::test]
async fn test_slower_older_bootstrap_is_discarded() {
    let mut builder = HarnessBuilder::new()
        .env(Ok(Some(complete_env("https://stale.x"))))
        .env(Ok(Some(complete_env("https://fresh.x"))));
    builder.first_delay = Some(Duration::from_millis(200));
    let h = builder.build();

    let (older, newer) = tokio::join!(h.bootstrapper.bootstrap(), async {
        // Let the first attempt claim its ticket before starting the second
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.bootstrapper.bootstrap().await
    });

    assert_eq!(older.unwrap(), BootstrapOutcome::Superseded { attempt: 1 });
    assert!(matches!(newer.unwrap(), BootstrapOutcome::Installed { attempt: 2, .. }));

    let clients = h.bootstrapper.clients().unwrap();
    assert_eq!(clients.attempt, 2);
    assert_eq!(clients.auth.base_url().as_str(), "https://fresh.x/");
    assert_eq!(h.auth.configs.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_calls_without_org_succeed_on_every_surface() {
    let server = MockServer::start().await;
    for prefix in ["auth/v1", "management/v1", "admin/v1"] {
        Mock::given(method("POST"))
            .and(path(format!("/{}/healthz", prefix)))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": prefix})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let h = HarnessBuilder::new()
        .env(Ok(Some(complete_env(&server.uri()))))
        .build();
    h.bootstrapper.bootstrap().await.unwrap();
    let clients = h.bootstrapper.clients().unwrap();

    for surface in Surface::ALL {
        let body: Value = clients
            .get(surface)
            .post("healthz", &json!({}))
            .await
            .unwrap();
        assert_eq!(body["ok"], surface.prefix());
    }

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests
        .iter()
        .all(|r| !r.headers.contains_key(ORG_ID_HEADER)));
}

#[tokio::test]
async fn test_static_resolver_drives_a_bootstrap() {
    let auth = Arc::new(FakeAuth::with_token(None));
    let bootstrapper = Bootstrapper::new(Collaborators {
        environment: Arc::new(StaticEnvironmentResolver::new(Some(complete_env(
            "https://api.x",
        )))),
        locale: Arc::new(crate::interceptor::testing::FakeLocale("fr")),
        authenticator: auth.clone(),
        prompt: Arc::new(FakePrompt::answering(true)),
        org_context: Arc::new(FakeOrg::default()),
        exhaustion_policy: Arc::new(RecordingPolicy::default()),
        location: Arc::new(StaticLocation::new("https://console.x", "/ui/")),
        branding: Arc::new(crate::auth::NoBranding),
    });

    bootstrapper.bootstrap().await.unwrap();

    let configs = auth.configs.lock().unwrap();
    assert_eq!(configs[0].redirect_uri, "https://console.x/ui/auth/callback");
}
