use thiserror::Error;

use super::status::RpcStatus;

/// Failure of a single RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest_middleware::Error),

    /// The call was held back while a re-authentication was abandoned.
    #[error("session expired; please log in again")]
    SessionExpired,

    #[error("authentication failed (HTTP {http_status}): {message}")]
    Unauthenticated {
        http_status: u16,
        message: String,
        /// Whether the call started or joined the re-authentication flow
        reauth_triggered: bool,
    },

    #[error("quota exhausted (HTTP {http_status}): {message}")]
    Exhausted {
        http_status: u16,
        message: String,
        instance_management_url: Option<String>,
    },

    #[error("{status:?} (HTTP {http_status}): {message}")]
    Status {
        status: RpcStatus,
        http_status: u16,
        message: String,
    },

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RpcError {
    /// Status code of the failed call, if the server produced one.
    pub fn status(&self) -> Option<RpcStatus> {
        match self {
            RpcError::Unauthenticated { .. } | RpcError::SessionExpired => {
                Some(RpcStatus::Unauthenticated)
            }
            RpcError::Exhausted { .. } => Some(RpcStatus::ResourceExhausted),
            RpcError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get a hint message for the user
    pub fn user_hint(&self) -> &'static str {
        match self.status() {
            Some(RpcStatus::Unauthenticated) => {
                "Your session has expired. Please run 'console-rpc login' to re-authenticate."
            }
            Some(RpcStatus::PermissionDenied) => {
                "Your account lacks the permission for this call. Check the selected organization."
            }
            Some(RpcStatus::ResourceExhausted) => {
                "The instance has exhausted its quota. Ask your administrator to raise it."
            }
            Some(RpcStatus::Unavailable) => {
                "The API is temporarily unavailable. Please try again later."
            }
            _ => "An unexpected error occurred. Please try again or contact support.",
        }
    }
}
