// self
use crate::{_prelude::*, obs::OperationKind, retry::RetryEvent};

/// Future returned by [`OperationSpan::instrument`] with the `tracing` feature on.
#[cfg(feature = "tracing")]
pub type InstrumentedOperation<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`OperationSpan::instrument`]: the input future, untouched.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOperation<F> = F;

/// Span wrapping one token or request operation.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Opens a span for `kind`; `stage` names the call site.
	pub fn new(kind: OperationKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("now_client.operation", operation = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Attaches the span to `fut` so it is entered on every poll.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOperation<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits the `WARN` record for a granted retry.
pub fn record_retry(event: &RetryEvent) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			retry_attempt = event.retry_attempt,
			uri = %event.uri,
			body = %event.body,
			status = ?event.status,
			error = ?event.error,
			delay_ms = event.delay.whole_milliseconds() as u64,
			refresh = event.refresh,
			"Retrying request"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = event;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_retry_accepts_events_without_subscriber() {
		record_retry(&RetryEvent {
			retry_attempt: 1,
			uri: "https://instance.example.com/api".into(),
			body: String::new(),
			status: Some(503),
			error: None,
			delay: Duration::seconds(1),
			refresh: false,
		});
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OperationSpan::new(OperationKind::Request, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
