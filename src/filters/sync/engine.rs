//! Rule upload engine.
//!
//! `SyncEngine` owns the [`RuleStore`] and a [`FilterApi`] implementation. It uploads local rules
//! one at a time, folds every per-rule failure into a failure list, and retries that shrinking
//! list with a linearly growing pause until it is empty or the retry budget is spent. Each pass
//! ends with a fetch so the store's remote view is always a real server snapshot.
//!
//! Calls are strictly sequential. The pause after each add call is unconditional and is the
//! only rate limiting applied to the remote service.

use crate::filters::sync::{
	events::{EventDispatcher, LoggingEventHandler, UploadEvent},
	progress_tracker::{UploadProgressTracker, UploadStats},
	retry::{LinearBackoff, SyncConfig},
};
use crate::filters::{FilterRule, FilterSyncError, RuleStore};
use crate::remote::{FilterApi, MutationOutcome};

use backoff::backoff::Backoff;
use std::time::Duration;
use tracing::{debug, info};

/// Lifecycle of an upload run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
	Idle,
	Uploading,
	Retrying,
	Done,
}

/// Coordinates uploads against the remote rule store.
pub struct SyncEngine<A: FilterApi> {
	api: A,
	store: RuleStore,
	dispatcher: EventDispatcher,
	config: SyncConfig,
	state: SyncState,
	last_stats: Option<UploadStats>,
}

impl<A: FilterApi> SyncEngine<A> {
	/// Create an engine that reports progress through the log.
	pub fn new(api: A, config: SyncConfig) -> Self {
		let mut dispatcher = EventDispatcher::new();
		dispatcher.register_handler(Box::new(LoggingEventHandler));
		Self::with_dispatcher(api, config, dispatcher)
	}

	pub fn with_dispatcher(api: A, config: SyncConfig, dispatcher: EventDispatcher) -> Self {
		Self {
			api,
			store: RuleStore::new(),
			dispatcher,
			config,
			state: SyncState::Idle,
			last_stats: None,
		}
	}

	pub fn api(&self) -> &A {
		&self.api
	}

	pub fn store(&self) -> &RuleStore {
		&self.store
	}

	pub fn store_mut(&mut self) -> &mut RuleStore {
		&mut self.store
	}

	#[cfg(test)]
	pub fn state(&self) -> SyncState {
		self.state
	}

	/// Statistics of the most recent `upload_local` run.
	pub fn last_stats(&self) -> Option<&UploadStats> {
		self.last_stats.as_ref()
	}

	fn set_state(&mut self, state: SyncState) {
		debug!("Upload state {:?} -> {:?}", self.state, state);
		self.state = state;
	}

	/// Replace the store's remote view with a fresh server snapshot.
	pub async fn fetch_remote(&mut self) -> Result<&[FilterRule], FilterSyncError> {
		let rules = self.api.fetch_all().await?;
		self.store.replace_remote(rules);
		Ok(self.store.remote())
	}

	/// Upload the store's local rules using the configured retry settings.
	pub async fn upload_pending(&mut self) -> Result<Vec<FilterRule>, FilterSyncError> {
		let rules = self.store.local().to_vec();
		let max_retries = self.config.max_retries;
		let initial_interval = self.config.initial_interval;
		self.upload_local(&rules, max_retries, initial_interval).await
	}

	/// Upload `rules` and return the ones the server never accepted.
	///
	/// Rules that already carry a remote id are not attempted. An empty batch issues no calls at
	/// all. Otherwise every pass over the current batch is followed by one fetch; a fetch error
	/// aborts the run and is returned. At most `max_retries + 1` passes are made.
	pub async fn upload_local(
		&mut self,
		rules: &[FilterRule],
		max_retries: u32,
		initial_interval: Duration,
	) -> Result<Vec<FilterRule>, FilterSyncError> {
		let batch: Vec<FilterRule> = rules.iter().filter(|r| !r.is_remote()).cloned().collect();

		if batch.is_empty() {
			info!("No local rules to upload");
			self.last_stats = Some(UploadStats::default());
			self.set_state(SyncState::Done);
			return Ok(Vec::new());
		}

		let mut tracker = UploadProgressTracker::new(batch.len());
		let mut backoff =
			LinearBackoff::new(initial_interval, self.config.interval_step, max_retries);

		self.set_state(SyncState::Uploading);
		let result = self.run_passes(batch, &mut backoff, &mut tracker).await;
		self.set_state(SyncState::Done);

		self.last_stats = Some(tracker.get_stats());

		let failed = result?;
		self.dispatcher
			.dispatch(&UploadEvent::UploadCompleted {
				passes: tracker.passes().len() as u32,
				failed: failed.len(),
			})
			.await;
		Ok(failed)
	}

	async fn run_passes(
		&mut self,
		batch: Vec<FilterRule>,
		backoff: &mut LinearBackoff,
		tracker: &mut UploadProgressTracker,
	) -> Result<Vec<FilterRule>, FilterSyncError> {
		let mut pass = 1;
		let mut failed = self.run_pass(pass, &batch, backoff.current(), tracker).await?;

		while !failed.is_empty() {
			let Some(interval) = backoff.next_backoff() else {
				break;
			};
			pass += 1;
			self.set_state(SyncState::Retrying);
			info!(
				"Retrying {} failed rules ({} retries left)",
				failed.len(),
				backoff.remaining()
			);
			failed = self.run_pass(pass, &failed, interval, tracker).await?;
		}

		Ok(failed)
	}

	/// One traversal of `batch` followed by a remote refresh.
	async fn run_pass(
		&mut self,
		pass: u32,
		batch: &[FilterRule],
		interval: Duration,
		tracker: &mut UploadProgressTracker,
	) -> Result<Vec<FilterRule>, FilterSyncError> {
		tracker.start_pass();
		self.dispatcher
			.dispatch(&UploadEvent::PassStarted {
				pass,
				batch_size: batch.len(),
				interval,
			})
			.await;

		let mut failed = Vec::new();
		for rule in batch {
			let event = match self.api.add_rule(&rule.category, &rule.pattern).await {
				Ok(outcome) if outcome.accepted => {
					tracker.record_accepted();
					UploadEvent::RuleAccepted {
						pass,
						rule: rule.clone(),
					}
				}
				Ok(outcome) => {
					tracker.record_rejected();
					failed.push(rule.clone());
					UploadEvent::RuleRejected {
						pass,
						rule: rule.clone(),
						raw_status: outcome.raw_status,
						message: outcome.message,
					}
				}
				Err(e) => {
					debug!("Add of {} failed (transport: {})", rule, e.is_transport());
					tracker.record_error();
					failed.push(rule.clone());
					UploadEvent::RuleFailed {
						pass,
						rule: rule.clone(),
						error: e.to_string(),
					}
				}
			};
			self.dispatcher.dispatch(&event).await;

			tokio::time::sleep(interval).await;
		}

		let remote_count = self.fetch_remote().await?.len();
		tracker.log_pass();
		self.dispatcher
			.dispatch(&UploadEvent::PassCompleted {
				pass,
				failed: failed.len(),
				remote_count,
			})
			.await;

		Ok(failed)
	}

	/// Add a single rule, falling back to the configured default category, then refresh.
	pub async fn add_rule(
		&mut self,
		category: Option<&str>,
		pattern: &str,
	) -> Result<MutationOutcome, FilterSyncError> {
		let category = category.unwrap_or(&self.config.default_category).to_string();
		let outcome = self.api.add_rule(&category, pattern).await?;
		info!(
			"Add {}:{} -> code {}",
			category, pattern, outcome.raw_status
		);
		self.fetch_remote().await?;
		Ok(outcome)
	}

	/// Delete a remote rule by id, then refresh.
	pub async fn delete_remote(&mut self, remote_id: u64) -> Result<MutationOutcome, FilterSyncError> {
		let outcome = self.api.delete_rule(remote_id).await?;
		info!("Delete {} -> code {}", remote_id, outcome.raw_status);
		self.fetch_remote().await?;
		Ok(outcome)
	}
}
