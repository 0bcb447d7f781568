//! Bootstrap of the RPC client layer.
//!
//! The steps depend on each other and run strictly in order:
//!
//! ```text
//! label policy (fire and forget)
//! locale   -> load translations
//! environment -> validate (soft-fail if incomplete)
//! interceptor chain -> auth / mgmt / admin clients
//! auth configuration -> authentication subsystem
//! ```
//!
//! A bootstrap can be repeated (e.g. after a locale change); the newest
//! attempt's clients replace the previous ones as a unit.

mod orchestrator;
#[cfg(test)]
mod tests;

pub use orchestrator::{BootstrapError, BootstrapOutcome, Bootstrapper, Collaborators, RpcClients};
