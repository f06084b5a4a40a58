//! Token cache contract and the built-in in-memory implementation.
//!
//! The cache owns expiry: a token returned by [`TokenCache::get`] is treated as valid by every
//! consumer, so implementations must never hand back an entry whose ttl has elapsed.

pub mod memory;

pub use memory::MemoryCache;

// self
use crate::{_prelude::*, auth::AccessToken};

/// Boxed future returned by [`TokenCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Key-value store holding named bearer tokens with an expiry.
pub trait TokenCache
where
	Self: Send + Sync,
{
	/// Returns the token stored under `key` unless it is missing or expired.
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<AccessToken>>;

	/// Stores `token` under `key` for `ttl`, replacing any previous value.
	fn put<'a>(&'a self, key: &'a str, token: AccessToken, ttl: Duration) -> CacheFuture<'a, ()>;

	/// Deletes the value stored under `key`, if any.
	fn forget<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}

/// Error type produced by [`TokenCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// The cache backend cannot be reached.
	#[error("Token cache is unavailable: {message}.")]
	Unavailable {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn cache_error_converts_into_client_error_with_source() {
		let cache_error = CacheError::Unavailable { message: "redis unreachable".into() };
		let client_error: Error = cache_error.clone().into();

		assert!(matches!(client_error, Error::Cache(_)));
		assert!(client_error.to_string().contains("redis unreachable"));

		let source = StdError::source(&client_error)
			.expect("Client error should expose the original cache error as its source.");

		assert_eq!(source.to_string(), cache_error.to_string());
	}
}
