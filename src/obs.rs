//! Optional observability helpers for token and request operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `now_client.operation` with the `operation`
//!   and `stage` (call site) fields, plus a `WARN` record for every granted retry.
//! - Enable `metrics` to increment the `now_client_operation_total` counter for every
//!   attempt/success/failure, labeled by `operation` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
	/// Cache lookup followed, on a miss, by a password-grant request.
	TokenFetch,
	/// Cache invalidation followed by a password-grant request.
	TokenRefresh,
	/// One logical API request, including its retries.
	Request,
}
impl OperationKind {
	/// Label used in span fields and metric labels.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::TokenFetch => "token_fetch",
			OperationKind::TokenRefresh => "token_refresh",
			OperationKind::Request => "request",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationOutcome {
	/// Entry to a client helper.
	Attempt,
	/// The operation produced its value.
	Success,
	/// The operation returned an error.
	Failure,
}
impl OperationOutcome {
	/// Label used in span fields and metric labels.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationOutcome::Attempt => "attempt",
			OperationOutcome::Success => "success",
			OperationOutcome::Failure => "failure",
		}
	}
}
impl Display for OperationOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
