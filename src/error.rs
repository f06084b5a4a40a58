//! Client-level error types shared across the token provider, retry executor, and cache.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token cache failure; never retried.
	#[error("{0}")]
	Cache(
		#[from]
		#[source]
		crate::cache::CacheError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS) while calling the token endpoint.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token endpoint answered 200 but the payload is unusable.
	#[error(transparent)]
	MalformedTokenResponse(#[from] MalformedTokenResponse),

	/// Token endpoint rejected the password grant.
	#[error("Token endpoint rejected the request: {reason}.")]
	TokenEndpoint {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider- or client-supplied reason string.
		reason: String,
	},
	/// Upstream answered with a non-2xx status that no retry rule covers.
	#[error("Upstream responded with HTTP {status} after {attempts} attempt(s).")]
	UpstreamHttp {
		/// Final HTTP status code.
		status: u16,
		/// Attempts issued for the logical request.
		attempts: u32,
		/// Lossy UTF-8 rendering of the final response body.
		body: String,
	},
	/// Transport failed while retries were disabled or not applicable.
	#[error("Request failed at the transport layer after {attempts} attempt(s).")]
	RequestTransport {
		/// Attempts issued for the logical request.
		attempts: u32,
		/// Underlying transport failure.
		#[source]
		source: TransportError,
	},
	/// Retry ceiling reached (or the single refresh was already spent).
	#[error("Retries exhausted after {attempts} attempt(s).")]
	RetriesExhausted {
		/// Attempts issued for the logical request.
		attempts: u32,
		/// Status of the final attempt, if it produced a response.
		status: Option<u16>,
		/// Transport failure of the final attempt, if any.
		#[source]
		source: Option<TransportError>,
	},
}
impl Error {
	/// Returns the number of attempts issued when the error came from the request executor.
	pub fn attempts(&self) -> Option<u32> {
		match self {
			Self::UpstreamHttp { attempts, .. }
			| Self::RequestTransport { attempts, .. }
			| Self::RetriesExhausted { attempts, .. } => Some(*attempts),
			_ => None,
		}
	}

	/// Returns the HTTP status carried by the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::TokenEndpoint { status, .. } | Self::RetriesExhausted { status, .. } => *status,
			Self::UpstreamHttp { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Base URI or a derived endpoint cannot be parsed.
	#[error("Configured URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header value contains bytes HTTP does not allow.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeaderValue {
		/// Header name.
		name: String,
	},
	/// Retryable status code list contains an entry outside 100..=599.
	#[error("Retry response code `{value}` is not a valid HTTP status.")]
	InvalidStatusCode {
		/// Offending raw value.
		value: String,
	},
	/// Configuration document could not be deserialized.
	#[error("Configuration could not be parsed.")]
	Parse {
		/// Structured parsing failure naming the offending field.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be serialized.")]
	Body {
		/// Underlying serializer failure.
		#[source]
		source: serde_json::Error,
	},
}
/// Token endpoint payload problems.
#[derive(Debug, ThisError)]
pub enum MalformedTokenResponse {
	/// Response body is not the expected JSON document (e.g. `access_token` is missing).
	#[error("Token endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the upstream.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
