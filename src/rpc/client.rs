use std::str::FromStr;
use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use super::error::RpcError;
use super::status::{status_message, RpcStatus};
use crate::interceptor::{Exhausted, InterceptorChain, ReauthTriggered, SessionExpired};

/// API surfaces exposed by the console backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Auth,
    Management,
    Admin,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Auth, Surface::Management, Surface::Admin];

    /// Path prefix of the surface's HTTP mapping.
    pub fn prefix(&self) -> &'static str {
        match self {
            Surface::Auth => "auth/v1",
            Surface::Management => "management/v1",
            Surface::Admin => "admin/v1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Auth => "auth",
            Surface::Management => "mgmt",
            Surface::Admin => "admin",
        }
    }
}

impl FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auth" => Ok(Surface::Auth),
            "mgmt" | "management" => Ok(Surface::Management),
            "admin" => Ok(Surface::Admin),
            other => Err(format!(
                "unknown surface '{}', expected auth, mgmt or admin",
                other
            )),
        }
    }
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builds clients. Construction only binds; nothing is resolved or sent.
pub struct RpcClientFactory;

impl RpcClientFactory {
    pub fn make_client(
        surface: Surface,
        base_url: &str,
        chain: &Arc<InterceptorChain>,
    ) -> Result<RpcClient, RpcError> {
        // A trailing slash keeps any path of the base URL when joining.
        let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| RpcError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;

        Ok(RpcClient {
            surface,
            base_url,
            chain: Arc::clone(chain),
        })
    }
}

/// Client for one API surface.
#[derive(Clone)]
pub struct RpcClient {
    surface: Surface,
    base_url: Url,
    chain: Arc<InterceptorChain>,
}

impl RpcClient {
    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The interceptor chain this client sends through.
    pub fn chain(&self) -> &Arc<InterceptorChain> {
        &self.chain
    }

    fn build_url(&self, path: &str) -> Result<Url, RpcError> {
        let endpoint = format!("{}/{}", self.surface.prefix(), path.trim_start_matches('/'));
        self.base_url
            .join(&endpoint)
            .map_err(|e| RpcError::InvalidEndpoint(format!("{}: {}", endpoint, e)))
    }

    pub async fn get<Resp>(&self, path: &str) -> Result<Resp, RpcError>
    where
        Resp: DeserializeOwned,
    {
        self.unary::<(), Resp>(Method::GET, path, None).await
    }

    pub async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.unary(Method::POST, path, Some(body)).await
    }

    /// Send one request through the interceptor chain and decode the answer.
    pub async fn unary<Req, Resp>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Req>,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.build_url(path)?;
        let request_id = Uuid::new_v4().to_string();

        debug!("=== RPC Request ===");
        debug!("{} {} ({})", method, url, self.surface);

        let mut request = self
            .chain
            .http()
            .request(method, url.clone())
            .header("content-type", "application/json")
            .header("x-request-id", &request_id);

        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body).map_err(RpcError::Encode)?);
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = RpcStatus::of(&response);
        let http_status = response.status().as_u16();
        debug!("=== RPC Response ===");
        debug!("Status: {} ({:?})", http_status, status);

        if status.is_ok() {
            let bytes = response.bytes().await.map_err(RpcError::Body)?;
            let payload: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
            return serde_json::from_slice(payload).map_err(RpcError::Decode);
        }

        let exhausted = response.extensions().get::<Exhausted>().cloned();
        let reauth_triggered = response.extensions().get::<ReauthTriggered>().is_some();
        let header_message = status_message(response.headers());
        let body = response.text().await.unwrap_or_default();
        let message = header_message
            .or_else(|| body_message(&body))
            .unwrap_or_else(|| status.error_message().to_string());

        error!(
            "RPC {} failed with {:?} (request {}): {}",
            url.path(),
            status,
            request_id,
            message
        );

        Err(match (status, exhausted) {
            (_, Some(exhausted)) => RpcError::Exhausted {
                http_status,
                message,
                instance_management_url: exhausted.instance_management_url,
            },
            (RpcStatus::Unauthenticated, None) => RpcError::Unauthenticated {
                http_status,
                message,
                reauth_triggered,
            },
            (status, None) => RpcError::Status {
                status,
                http_status,
                message,
            },
        })
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("surface", &self.surface)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

fn transport_error(err: reqwest_middleware::Error) -> RpcError {
    let expired = matches!(
        &err,
        reqwest_middleware::Error::Middleware(inner) if inner.is::<SessionExpired>()
    );
    if expired {
        RpcError::SessionExpired
    } else {
        RpcError::Transport(err)
    }
}

/// Pull `message` out of a JSON error body.
fn body_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentConfig;
    use crate::interceptor::testing::Fakes;
    use crate::interceptor::ORG_ID_HEADER;
    use serde::Deserialize;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Me {
        id: String,
    }

    fn chain(fakes: &Fakes) -> Arc<InterceptorChain> {
        Arc::new(InterceptorChain::new(&EnvironmentConfig::default(), fakes.parts()).unwrap())
    }

    #[test]
    fn test_build_url_keeps_base_path() {
        let fakes = Fakes::new(None, None);
        let chain = chain(&fakes);

        let client = RpcClientFactory::make_client(Surface::Auth, "https://api.x", &chain).unwrap();
        assert_eq!(
            client.build_url("users/me").unwrap().as_str(),
            "https://api.x/auth/v1/users/me"
        );

        let client =
            RpcClientFactory::make_client(Surface::Admin, "https://x.io/api/", &chain).unwrap();
        assert_eq!(
            client.build_url("/instances/me").unwrap().as_str(),
            "https://x.io/api/admin/v1/instances/me"
        );
    }

    #[test]
    fn test_make_client_rejects_invalid_base() {
        let fakes = Fakes::new(None, None);
        assert!(matches!(
            RpcClientFactory::make_client(Surface::Auth, "not a url", &chain(&fakes)),
            Err(RpcError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_surface_parsing() {
        assert_eq!("mgmt".parse::<Surface>().unwrap(), Surface::Management);
        assert_eq!("Management".parse::<Surface>().unwrap(), Surface::Management);
        assert_eq!("admin".parse::<Surface>().unwrap(), Surface::Admin);
        assert!("billing".parse::<Surface>().is_err());
    }

    #[tokio::test]
    async fn test_call_without_org_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "u1"})))
            .mount(&server)
            .await;
        let fakes = Fakes::new(None, Some("token"));
        let client =
            RpcClientFactory::make_client(Surface::Auth, &server.uri(), &chain(&fakes)).unwrap();

        let me: Me = client.get("users/me").await.unwrap();

        assert_eq!(me, Me { id: "u1".to_string() });
        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get(ORG_ID_HEADER).is_none());
        assert!(requests[0].headers.get("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/management/v1/users/_search"))
            .and(body_json(serde_json::json!({"query": {"limit": 10}})))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let fakes = Fakes::new(Some("org-1"), Some("token"));
        let client =
            RpcClientFactory::make_client(Surface::Management, &server.uri(), &chain(&fakes))
                .unwrap();

        let result: serde_json::Value = client
            .post("users/_search", &serde_json::json!({"query": {"limit": 10}}))
            .await
            .unwrap();
        assert!(result.is_null());
    }

    #[tokio::test]
    async fn test_maps_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_json(
                serde_json::json!({"code": 8, "message": "quota exceeded"}),
            ))
            .mount(&server)
            .await;
        let fakes = Fakes::new(None, Some("token"));
        let client =
            RpcClientFactory::make_client(Surface::Admin, &server.uri(), &chain(&fakes)).unwrap();

        let err = client.get::<serde_json::Value>("instances/me").await.unwrap_err();

        match &err {
            RpcError::Exhausted { message, .. } => assert_eq!(message, "quota exceeded"),
            other => panic!("Expected Exhausted, got {:?}", other),
        }
        assert_eq!(err.status(), Some(RpcStatus::ResourceExhausted));
        assert_eq!(fakes.policy.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_maps_unauthenticated_after_reauth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let fakes = Fakes::new(None, Some("stale"));
        let client =
            RpcClientFactory::make_client(Surface::Auth, &server.uri(), &chain(&fakes)).unwrap();

        let err = client.get::<serde_json::Value>("users/me").await.unwrap_err();

        match err {
            RpcError::Unauthenticated {
                reauth_triggered, ..
            } => assert!(reauth_triggered),
            other => panic!("Expected Unauthenticated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).insert_header("grpc-message", "User%20not%20found"),
            )
            .mount(&server)
            .await;
        let fakes = Fakes::new(None, Some("token"));
        let client =
            RpcClientFactory::make_client(Surface::Management, &server.uri(), &chain(&fakes))
                .unwrap();

        let err = client.get::<serde_json::Value>("users/u9").await.unwrap_err();

        match err {
            RpcError::Status {
                status,
                http_status,
                message,
            } => {
                assert_eq!(status, RpcStatus::NotFound);
                assert_eq!(http_status, 404);
                assert_eq!(message, "User not found");
            }
            other => panic!("Expected Status, got {:?}", other),
        }
        assert_eq!(fakes.auth.reauth_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
