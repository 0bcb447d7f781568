//! RPC status codes carried by console API responses.
//!
//! The API gateway reports the canonical gRPC code in the `grpc-status`
//! header. Responses that lack it (proxies, load balancers) are classified
//! from the HTTP status instead.

use percent_encoding::percent_decode_str;
use reqwest::header::HeaderMap;

/// Header carrying the numeric gRPC status code.
pub const GRPC_STATUS_HEADER: &str = "grpc-status";

/// Header carrying the (percent-encoded) gRPC status message.
pub const GRPC_MESSAGE_HEADER: &str = "grpc-message";

/// Canonical gRPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RpcStatus {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl RpcStatus {
    /// Convert from i32 status code
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => RpcStatus::Ok,
            1 => RpcStatus::Cancelled,
            2 => RpcStatus::Unknown,
            3 => RpcStatus::InvalidArgument,
            4 => RpcStatus::DeadlineExceeded,
            5 => RpcStatus::NotFound,
            6 => RpcStatus::AlreadyExists,
            7 => RpcStatus::PermissionDenied,
            8 => RpcStatus::ResourceExhausted,
            9 => RpcStatus::FailedPrecondition,
            10 => RpcStatus::Aborted,
            11 => RpcStatus::OutOfRange,
            12 => RpcStatus::Unimplemented,
            13 => RpcStatus::Internal,
            14 => RpcStatus::Unavailable,
            15 => RpcStatus::DataLoss,
            16 => RpcStatus::Unauthenticated,
            _ => RpcStatus::Unknown,
        }
    }

    /// Classify an HTTP status when no `grpc-status` header is present.
    pub fn from_http_status(http_status: u16) -> Self {
        match http_status {
            200..=299 => RpcStatus::Ok,
            400 => RpcStatus::InvalidArgument,
            401 => RpcStatus::Unauthenticated,
            403 => RpcStatus::PermissionDenied,
            404 => RpcStatus::NotFound,
            409 => RpcStatus::AlreadyExists,
            412 => RpcStatus::FailedPrecondition,
            429 => RpcStatus::ResourceExhausted,
            499 => RpcStatus::Cancelled,
            501 => RpcStatus::Unimplemented,
            503 => RpcStatus::Unavailable,
            504 => RpcStatus::DeadlineExceeded,
            500..=599 => RpcStatus::Internal,
            _ => RpcStatus::Unknown,
        }
    }

    /// Determine the status of a response from its headers and HTTP status.
    pub fn from_response_parts(http_status: u16, headers: &HeaderMap) -> Self {
        headers
            .get(GRPC_STATUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i32>().ok())
            .map(Self::from_i32)
            .unwrap_or_else(|| Self::from_http_status(http_status))
    }

    /// Shorthand for classifying a received response.
    pub fn of(response: &reqwest::Response) -> Self {
        Self::from_response_parts(response.status().as_u16(), response.headers())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RpcStatus::Ok)
    }

    /// Short description used when the server sends no message.
    pub fn error_message(&self) -> &'static str {
        match self {
            RpcStatus::Ok => "Success",
            RpcStatus::Cancelled => "Request was cancelled",
            RpcStatus::Unknown => "Unknown error occurred",
            RpcStatus::InvalidArgument => "Invalid request",
            RpcStatus::DeadlineExceeded => "Request timed out",
            RpcStatus::NotFound => "Not found",
            RpcStatus::AlreadyExists => "Already exists",
            RpcStatus::PermissionDenied => "Permission denied",
            RpcStatus::ResourceExhausted => "Quota exhausted. Please wait and try again",
            RpcStatus::FailedPrecondition => "Precondition failed",
            RpcStatus::Aborted => "Request aborted",
            RpcStatus::OutOfRange => "Out of range",
            RpcStatus::Unimplemented => "Endpoint not implemented",
            RpcStatus::Internal => "Internal server error",
            RpcStatus::Unavailable => "Service temporarily unavailable",
            RpcStatus::DataLoss => "Data loss",
            RpcStatus::Unauthenticated => "Session expired. Please log in again",
        }
    }
}

impl std::fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error_message())
    }
}

/// Read the status message header, decoding the percent-encoding gRPC uses.
pub fn status_message(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(GRPC_MESSAGE_HEADER)?.to_str().ok()?;
    if raw.is_empty() {
        return None;
    }
    Some(percent_decode_str(raw).decode_utf8_lossy().into_owned())
}
