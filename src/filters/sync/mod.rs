//! Rule Synchronization Module
//!
//! Uploads local filter rules to the remote store and keeps the local view of remote state
//! honest:
//!
//! - `engine`: the upload state machine; per-rule attempts, failure collection, retries, refresh.
//! - `events`: events emitted during an upload and the dispatcher that fans them out to handlers.
//! - `progress_tracker`: per-pass outcome counts and end-of-run statistics.
//! - `retry`: upload configuration and the linear backoff that drives retry passes.

/// Upload state machine
pub mod engine;
/// Event system for upload progress
pub mod events;
/// Tracks upload progress and statistics
pub mod progress_tracker;
/// Retry configuration and linear backoff
pub mod retry;

pub use engine::*;
pub use retry::SyncConfig;
