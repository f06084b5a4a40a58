//! Retry loop around one logical request.
//!
//! [`RequestExecutor::execute`] walks a small state machine:
//!
//! - Attempting: send the current request through the transport. A 2xx response ends the loop.
//! - EvaluatingRetry: ask the [`RetryPolicy`] about the failed attempt. A stop verdict ends the
//!   loop with an error carrying the attempt count.
//! - Refreshing: when the policy asks for it, forget the cached token, fetch a new one, and
//!   derive the next request with the new bearer header and the refresh marker.
//! - Delaying: wait the policy's delay on the calling task, bump the attempt counter, and loop.
//!
//! A failed token refresh aborts the loop at once; the refresh itself is never retried.

mod metrics;

pub use metrics::ExecutorMetrics;

// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::{HttpResponse, HttpTransport, OutboundRequest},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	retry::{AttemptOutcome, RetryDecision, RetryPolicy, StopReason},
	token::TokenProvider,
};

/// Per-request retry bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
	/// Zero-based number of the current attempt; incremented once per retry.
	pub attempt: u32,
	/// Whether this logical request already consumed its token refresh.
	pub refreshed: bool,
}
impl RetryState {
	/// Starts tracking `request`, honoring a refresh marker it may already carry.
	pub fn for_request(request: &OutboundRequest) -> Self {
		Self { attempt: 0, refreshed: request.is_refreshed() }
	}

	/// Returns the number of attempts issued so far, counting the current one.
	pub fn attempts(&self) -> u32 {
		self.attempt.saturating_add(1)
	}
}

/// Failed attempt, kept until the policy decides what to do with it.
#[derive(Debug)]
enum AttemptFailure {
	Response(HttpResponse),
	Transport(TransportError),
}
impl AttemptFailure {
	fn outcome(&self) -> AttemptOutcome<'_> {
		match self {
			Self::Response(response) => AttemptOutcome::Response(response),
			Self::Transport(err) => AttemptOutcome::Error(err),
		}
	}

	fn into_error(self, reason: StopReason, attempts: u32) -> Error {
		match (reason, self) {
			(StopReason::Exhausted | StopReason::RefreshSpent, Self::Response(response)) =>
				Error::RetriesExhausted {
					attempts,
					status: Some(response.status().as_u16()),
					source: None,
				},
			(StopReason::Exhausted | StopReason::RefreshSpent, Self::Transport(source)) =>
				Error::RetriesExhausted { attempts, status: None, source: Some(source) },
			(StopReason::Disabled | StopReason::NotRetryable, Self::Response(response)) =>
				Error::UpstreamHttp {
					status: response.status().as_u16(),
					attempts,
					body: String::from_utf8_lossy(response.body()).into_owned(),
				},
			(StopReason::Disabled | StopReason::NotRetryable, Self::Transport(source)) =>
				Error::RequestTransport { attempts, source },
		}
	}
}

/// Executes logical requests with bounded retries and a one-shot token refresh.
pub struct RequestExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	tokens: Arc<TokenProvider<T>>,
	policy: RetryPolicy,
	metrics: Arc<ExecutorMetrics>,
}
impl<T> RequestExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates an executor sharing `transport` and `tokens` with the rest of the client.
	pub fn new(transport: Arc<T>, tokens: Arc<TokenProvider<T>>, policy: RetryPolicy) -> Self {
		Self { transport, tokens, policy, metrics: Default::default() }
	}

	/// Returns the retry policy.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Returns the executor's counters.
	pub fn metrics(&self) -> &ExecutorMetrics {
		&self.metrics
	}

	/// Sends `request`, retrying per the policy, and returns the first 2xx response.
	///
	/// The caller attaches the initial `Authorization` header.
	pub async fn execute(&self, request: OutboundRequest) -> Result<HttpResponse> {
		const KIND: OperationKind = OperationKind::Request;

		let span = OperationSpan::new(KIND, "execute");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span.instrument(self.run(request)).await;

		match &result {
			Ok(_) => obs::record_operation_outcome(KIND, OperationOutcome::Success),
			Err(_) => {
				self.metrics.record_failure();
				obs::record_operation_outcome(KIND, OperationOutcome::Failure);
			},
		}

		result
	}

	async fn run(&self, request: OutboundRequest) -> Result<HttpResponse> {
		let mut state = RetryState::for_request(&request);
		let mut current = request;

		loop {
			self.metrics.record_attempt();

			let failure = match self.transport.send(current.to_http()?).await {
				Ok(response) if response.status().is_success() => return Ok(response),
				Ok(response) => AttemptFailure::Response(response),
				Err(err) => AttemptFailure::Transport(err),
			};

			match self.policy.decide(state.attempt, &failure.outcome(), state.refreshed, &current)
			{
				RetryDecision::Stop(reason) =>
					return Err(failure.into_error(reason, state.attempts())),
				RetryDecision::Retry { delay, refresh, event } => {
					obs::record_retry(&event);
					self.metrics.record_retry();

					if refresh {
						let token = self.tokens.refresh().await?;

						current = current.next_attempt(&token)?;
						state.refreshed = true;
						self.metrics.record_refresh();
					}
					if delay.is_positive() {
						tokio::time::sleep(delay.unsigned_abs()).await;
					}

					state.attempt += 1;
				},
			}
		}
	}
}
impl<T> Debug for RequestExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestExecutor")
			.field("policy", &self.policy)
			.field("metrics", &self.metrics)
			.finish()
	}
}
