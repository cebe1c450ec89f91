//! Remote filter store integration
//!
//! This module provides the HTTP binding to the platform's danmaku filter endpoints and the
//! wire types they exchange. The sync engine talks to it through the [`FilterApi`] trait.

/// HTTP client for the filter endpoints
mod client;
/// Response envelopes, rule payloads and error types
mod types;

pub use client::{ClientConfig, FilterApi, RemoteFilterClient};
pub use types::*;
