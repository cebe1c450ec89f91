//! Session credential handling for the remote filter API.
//!
//! Credentials are produced once per run, either from material persisted by a previous run or
//! from cookies exported after an interactive browser login, and are read by every remote call.

/// Credential context, persisted material and anti-forgery token derivation
mod credentials;

pub use credentials::*;
