//! RPC client layer for the console's Auth, Management and Admin APIs.
//!
//! [`bootstrap::Bootstrapper`] brings the layer up: it loads the locale,
//! resolves the deployment environment, assembles the shared
//! [`interceptor::InterceptorChain`] and binds one [`rpc::RpcClient`] per
//! API surface to it. Every call then passes through the same four
//! interceptors (quota exhaustion, organization context, authentication
//! and localization).

pub mod auth;
pub mod bootstrap;
pub mod environment;
pub mod interceptor;
pub mod locale;
pub mod oauth;
pub mod rpc;
pub mod session;
