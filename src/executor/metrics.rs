// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for executor activity.
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
	attempts: AtomicU64,
	retries: AtomicU64,
	refreshes: AtomicU64,
	failures: AtomicU64,
}
impl ExecutorMetrics {
	/// Returns the number of transport attempts issued.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of retries granted by the policy.
	pub fn retries(&self) -> u64 {
		self.retries.load(Ordering::Relaxed)
	}

	/// Returns the number of token refreshes triggered by unauthorized responses.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Returns the number of logical requests that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
