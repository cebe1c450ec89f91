use backoff::backoff::Backoff;
use std::time::Duration;

/// Configuration for rule uploads
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Extra passes allowed over the failed subset after the first pass.
	pub max_retries: u32,
	/// Pause after every add call during the first pass.
	pub initial_interval: Duration,
	/// Added to the pause before every retry pass.
	pub interval_step: Duration,
	/// Category used when a rule is added without one.
	pub default_category: String,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			max_retries: 0,
			initial_interval: Duration::from_millis(500),
			interval_step: Duration::from_millis(500),
			default_category: "0".to_string(),
		}
	}
}

/// Linearly growing per-item pause with a fixed retry budget.
///
/// Each call to `next_backoff` consumes one retry and returns the previous interval plus `step`.
/// Once the budget is spent it returns `None`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
	initial: Duration,
	step: Duration,
	max_retries: u32,
	current: Duration,
	remaining: u32,
}

impl LinearBackoff {
	pub fn new(initial: Duration, step: Duration, max_retries: u32) -> Self {
		Self {
			initial,
			step,
			max_retries,
			current: initial,
			remaining: max_retries,
		}
	}

	/// Interval of the pass currently in progress.
	pub fn current(&self) -> Duration {
		self.current
	}

	pub fn remaining(&self) -> u32 {
		self.remaining
	}
}

impl Backoff for LinearBackoff {
	fn next_backoff(&mut self) -> Option<Duration> {
		if self.remaining == 0 {
			return None;
		}
		self.remaining -= 1;
		self.current = self.current.saturating_add(self.step);
		Some(self.current)
	}

	fn reset(&mut self) {
		self.current = self.initial;
		self.remaining = self.max_retries;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn grows_linearly_until_budget_is_spent() {
		let ms = Duration::from_millis;
		let mut backoff = LinearBackoff::new(ms(500), ms(500), 2);

		assert_eq!(backoff.current(), ms(500));
		assert_eq!(backoff.next_backoff(), Some(ms(1000)));
		assert_eq!(backoff.next_backoff(), Some(ms(1500)));
		assert_eq!(backoff.next_backoff(), None);
		assert_eq!(backoff.current(), ms(1500));

		backoff.reset();
		assert_eq!(backoff.current(), ms(500));
		assert_eq!(backoff.remaining(), 2);
	}

	#[test]
	fn zero_retries_never_backs_off() {
		let mut backoff = LinearBackoff::new(Duration::ZERO, Duration::from_secs(1), 0);
		assert_eq!(backoff.next_backoff(), None);
	}
}
