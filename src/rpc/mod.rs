//! RPC clients for the console API surfaces.
//!
//! Each surface (Auth, Management, Admin) gets its own [`RpcClient`], all of
//! them bound to the interceptor chain of the bootstrap that created them.

mod client;
mod error;
mod status;

pub use client::{RpcClient, RpcClientFactory, Surface};
pub use error::RpcError;
pub use status::{status_message, RpcStatus, GRPC_MESSAGE_HEADER, GRPC_STATUS_HEADER};
