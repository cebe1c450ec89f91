//! Progress tracking for rule uploads.
//!
//! `UploadProgressTracker` counts per-rule outcomes for one `upload_local` run, split by pass,
//! and produces an [`UploadStats`] summary once the run terminates.

use tracing::info;

/// Outcome counts for a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    pub attempted: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub errors: usize,
}

impl PassStats {
    pub fn failed(&self) -> usize {
        self.rejected + self.errors
    }
}

/// Service for tracking upload progress
#[derive(Debug, Clone, Default)]
pub struct UploadProgressTracker {
    /// Size of the first batch
    batch_size: usize,
    passes: Vec<PassStats>,
}

impl UploadProgressTracker {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            passes: Vec::new(),
        }
    }

    /// Open a new pass; subsequent records count towards it.
    pub fn start_pass(&mut self) {
        self.passes.push(PassStats::default());
    }

    fn current(&mut self) -> &mut PassStats {
        if self.passes.is_empty() {
            self.passes.push(PassStats::default());
        }
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }

    pub fn record_accepted(&mut self) {
        let pass = self.current();
        pass.attempted += 1;
        pass.accepted += 1;
    }

    pub fn record_rejected(&mut self) {
        let pass = self.current();
        pass.attempted += 1;
        pass.rejected += 1;
    }

    pub fn record_error(&mut self) {
        let pass = self.current();
        pass.attempted += 1;
        pass.errors += 1;
    }

    pub fn passes(&self) -> &[PassStats] {
        &self.passes
    }

    pub fn log_pass(&self) {
        if let Some(pass) = self.passes.last() {
            info!(
                "Pass {}: {} attempted, {} accepted, {} rejected, {} errors",
                self.passes.len(),
                pass.attempted,
                pass.accepted,
                pass.rejected,
                pass.errors
            );
        }
    }

    pub fn get_stats(&self) -> UploadStats {
        UploadStats {
            batch_size: self.batch_size,
            passes: self.passes.len(),
            calls: self.passes.iter().map(|p| p.attempted).sum(),
            accepted: self.passes.iter().map(|p| p.accepted).sum(),
            unresolved: self.passes.last().map(PassStats::failed).unwrap_or(0),
        }
    }
}

/// Statistics about one upload run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub batch_size: usize,
    pub passes: usize,
    /// Total add calls issued across all passes
    pub calls: usize,
    pub accepted: usize,
    pub unresolved: usize,
}

impl UploadStats {
    pub fn summary(&self) -> String {
        format!(
            "Uploaded {} of {} rules in {} passes ({} calls){}",
            self.accepted,
            self.batch_size,
            self.passes,
            self.calls,
            if self.unresolved == 0 {
                String::new()
            } else {
                format!(", {} unresolved", self.unresolved)
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_per_pass() {
        let mut tracker = UploadProgressTracker::new(3);
        tracker.start_pass();
        tracker.record_accepted();
        tracker.record_rejected();
        tracker.record_error();
        tracker.start_pass();
        tracker.record_accepted();
        tracker.record_rejected();

        assert_eq!(tracker.passes()[0].failed(), 2);
        assert_eq!(
            tracker.get_stats(),
            UploadStats {
                batch_size: 3,
                passes: 2,
                calls: 5,
                accepted: 2,
                unresolved: 1,
            }
        );
        assert_eq!(
            tracker.get_stats().summary(),
            "Uploaded 2 of 3 rules in 2 passes (5 calls), 1 unresolved"
        );
    }

    #[test]
    fn empty_run_has_no_passes() {
        let stats = UploadProgressTracker::new(0).get_stats();
        assert_eq!(stats.passes, 0);
        assert_eq!(stats.summary(), "Uploaded 0 of 0 rules in 0 passes (0 calls)");
    }
}
