//! Retry decisions for a single logical request.
//!
//! [`RetryPolicy`] is pure: given the attempt counter, the outcome of the latest attempt, and
//! whether the request already consumed its token refresh, it answers whether to retry, whether
//! to refresh the token first, and how long to wait. Retries it grants come with a
//! [`RetryEvent`] describing the decision; emitting that event is the caller's job.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	config::RetryConfig,
	error::TransportError,
	http::{HttpResponse, OutboundRequest, StatusCode},
};

/// Outcome of one attempt, as seen by the policy.
#[derive(Clone, Copy, Debug)]
pub enum AttemptOutcome<'a> {
	/// The transport produced a response.
	Response(&'a HttpResponse),
	/// The transport failed before a response arrived.
	Error(&'a TransportError),
}
impl AttemptOutcome<'_> {
	/// Returns the response status, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Response(response) => Some(response.status().as_u16()),
			Self::Error(_) => None,
		}
	}
}

/// Why the policy refused another attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
	/// Retries are switched off.
	Disabled,
	/// The outcome is neither a transport error nor a retryable status.
	NotRetryable,
	/// The attempt ceiling was reached.
	Exhausted,
	/// The request already spent its token refresh.
	RefreshSpent,
}

/// Result of [`RetryPolicy::should_retry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryVerdict {
	/// Issue another attempt; `refresh` asks for a new token first.
	Retry {
		/// Invalidate the cached token and rebuild the request with a fresh one.
		refresh: bool,
	},
	/// Surface the latest outcome.
	Stop(StopReason),
}

/// Descriptive record of a granted retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryEvent {
	/// One-based number of the retry about to happen.
	pub retry_attempt: u32,
	/// Target URI without credentials or fragment.
	pub uri: String,
	/// Outbound body of the failed attempt.
	pub body: String,
	/// Status of the failed attempt, if it produced a response.
	pub status: Option<u16>,
	/// Transport failure text, if the attempt produced no response.
	pub error: Option<String>,
	/// Wait before the next attempt.
	pub delay: Duration,
	/// Whether the token is refreshed before the next attempt.
	pub refresh: bool,
}

/// Result of [`RetryPolicy::decide`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	/// Wait `delay`, optionally refresh the token, then attempt again.
	Retry {
		/// Wait before the next attempt.
		delay: Duration,
		/// Invalidate the cached token and rebuild the request with a fresh one.
		refresh: bool,
		/// Record to emit for this retry.
		event: RetryEvent,
	},
	/// Surface the latest outcome.
	Stop(StopReason),
}

/// Retry policy built once from [`RetryConfig`] and shared by every logical request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	enabled: bool,
	max_retries: u32,
	retry_statuses: BTreeSet<u16>,
	base_delay: Duration,
	max_delay: Duration,
	jitter: bool,
}
impl RetryPolicy {
	/// First backoff step; each further attempt doubles it.
	pub const BASE_DELAY: Duration = Duration::SECOND;

	/// Builds the policy described by `config`.
	pub fn from_config(config: &RetryConfig) -> Self {
		Self {
			enabled: config.incremental_retry_is_active,
			max_retries: config.max_retries,
			retry_statuses: config.retry_response_codes.clone(),
			base_delay: Self::BASE_DELAY,
			max_delay: config.max_delay(),
			jitter: config.retry_jitter,
		}
	}

	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self::from_config(&RetryConfig::default().with_retry_active(false))
	}

	/// Overrides the first backoff step.
	pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
		self.base_delay = if base_delay.is_negative() { Duration::ZERO } else { base_delay };

		self
	}

	/// Returns `true` when retries are switched on.
	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Returns the attempt ceiling.
	pub fn max_retries(&self) -> u32 {
		self.max_retries
	}

	/// Decides whether the attempt numbered `attempt` (zero-based) deserves a successor.
	pub fn should_retry(
		&self,
		attempt: u32,
		outcome: &AttemptOutcome<'_>,
		refreshed: bool,
	) -> RetryVerdict {
		if !self.enabled {
			return RetryVerdict::Stop(StopReason::Disabled);
		}

		let status = outcome.status();
		let retryable = match status {
			None => true,
			Some(code) => self.retry_statuses.contains(&code),
		};

		if !retryable {
			return RetryVerdict::Stop(StopReason::NotRetryable);
		}
		if attempt >= self.max_retries {
			return RetryVerdict::Stop(StopReason::Exhausted);
		}
		// A refreshed request gets its replay; anything after that is final.
		if refreshed && attempt > 0 {
			return RetryVerdict::Stop(StopReason::RefreshSpent);
		}

		let refresh = !refreshed
			&& attempt == self.max_retries - 1
			&& status == Some(StatusCode::UNAUTHORIZED.as_u16());

		RetryVerdict::Retry { refresh }
	}

	/// Wait before the attempt following `attempt`: `min(max_delay, base * 2^attempt)`.
	pub fn delay_before_next_attempt(&self, attempt: u32) -> Duration {
		let ceiling = self.backoff_ceiling(attempt);

		if !self.jitter || ceiling.is_zero() {
			return ceiling;
		}

		let ceiling_ms = ceiling.whole_milliseconds().clamp(0, i64::MAX as i128) as i64;
		let floor_ms = ceiling_ms / 2;

		Duration::milliseconds(rand::rng().random_range(floor_ms..=ceiling_ms))
	}

	/// Combines [`Self::should_retry`] and [`Self::delay_before_next_attempt`] and describes
	/// the retry for logging.
	pub fn decide(
		&self,
		attempt: u32,
		outcome: &AttemptOutcome<'_>,
		refreshed: bool,
		request: &OutboundRequest,
	) -> RetryDecision {
		match self.should_retry(attempt, outcome, refreshed) {
			RetryVerdict::Stop(reason) => RetryDecision::Stop(reason),
			RetryVerdict::Retry { refresh } => {
				let delay = self.delay_before_next_attempt(attempt);
				let event = RetryEvent {
					retry_attempt: attempt.saturating_add(1),
					uri: request.redacted_uri(),
					body: request.body_preview(),
					status: outcome.status(),
					error: match outcome {
						AttemptOutcome::Error(err) => Some(err.to_string()),
						AttemptOutcome::Response(_) => None,
					},
					delay,
					refresh,
				};

				RetryDecision::Retry { delay, refresh, event }
			},
		}
	}

	fn backoff_ceiling(&self, attempt: u32) -> Duration {
		let base_ms = u64::try_from(self.base_delay.whole_milliseconds()).unwrap_or(0);
		let max_ms = u64::try_from(self.max_delay.whole_milliseconds()).unwrap_or(u64::MAX);
		let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
		let delay_ms = base_ms.saturating_mul(factor).min(max_ms);

		Duration::milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from_config(&RetryConfig::default())
	}
}
