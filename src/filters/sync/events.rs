//! Event system for rule uploads.
//!
//! The engine emits an [`UploadEvent`] for every observable step of an upload: pass boundaries and
//! the outcome of each rule. Handlers registered on the [`EventDispatcher`] turn these into user
//! feedback or record them; none of them influence control flow.

use crate::filters::{FilterRule, FilterSyncError};

use std::time::Duration;
use tracing::{info, warn};

/// Events that occur while uploading rules
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A pass over a batch is starting
    PassStarted {
        pass: u32,
        batch_size: usize,
        interval: Duration,
    },
    /// The server accepted a rule
    RuleAccepted { pass: u32, rule: FilterRule },
    /// The server answered with a non-zero status
    RuleRejected {
        pass: u32,
        rule: FilterRule,
        raw_status: i64,
        message: Option<String>,
    },
    /// The request never produced a usable answer
    RuleFailed {
        pass: u32,
        rule: FilterRule,
        error: String,
    },
    /// A pass finished and the remote snapshot was refreshed
    PassCompleted {
        pass: u32,
        failed: usize,
        remote_count: usize,
    },
    /// The upload terminated
    UploadCompleted { passes: u32, failed: usize },
}

/// Trait for handling upload events.
#[async_trait::async_trait]
pub trait UploadEventHandler: Send + Sync {
    /// Handle an upload event.
    async fn handle(&mut self, event: &UploadEvent) -> Result<(), FilterSyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order. A failing handler is logged and does not stop
/// the others or the upload.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn UploadEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register_handler(&mut self, handler: Box<dyn UploadEventHandler>) {
        self.handlers.push(handler);
    }

    pub async fn dispatch(&mut self, event: &UploadEvent) {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}

/// Renders per-rule progress to the log.
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl UploadEventHandler for LoggingEventHandler {
    async fn handle(&mut self, event: &UploadEvent) -> Result<(), FilterSyncError> {
        match event {
            UploadEvent::PassStarted {
                pass,
                batch_size,
                interval,
            } => {
                info!(
                    "Pass {}: uploading {} rules with {} ms interval",
                    pass,
                    batch_size,
                    interval.as_millis()
                );
            }
            UploadEvent::RuleAccepted { rule, .. } => {
                info!("filter {} uploaded", rule);
            }
            UploadEvent::RuleRejected {
                rule,
                raw_status,
                message,
                ..
            } => {
                warn!(
                    "filter {} upload failed (code {}{})",
                    rule,
                    raw_status,
                    message
                        .as_deref()
                        .map(|m| format!(": {}", m))
                        .unwrap_or_default()
                );
            }
            UploadEvent::RuleFailed { rule, error, .. } => {
                warn!("filter {} upload failed: {}", rule, error);
            }
            UploadEvent::PassCompleted {
                pass,
                failed,
                remote_count,
            } => {
                info!(
                    "Pass {} finished: {} failed, {} rules on server",
                    pass, failed, remote_count
                );
            }
            UploadEvent::UploadCompleted { passes, failed } => {
                info!("Upload finished after {} passes, {} unresolved", passes, failed);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LoggingEventHandler"
    }
}
