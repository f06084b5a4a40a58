//! Cached access token provider.
//!
//! [`TokenProvider::get_token`] returns the cached bearer token when the cache still holds one
//! and otherwise performs a password grant, caching the result for `expires_in` seconds.
//! [`TokenProvider::refresh`] drops the cached value first and marks the grant request with the
//! refresh header. Concurrent callers are not coordinated: two requests refreshing at the same
//! time may both hit the token endpoint, and the last write wins in the cache.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	cache::TokenCache,
	config::ClientConfig,
	http::HttpTransport,
	oauth::PasswordGrantFacade,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
};

/// Obtains bearer tokens for the configured resource owner.
pub struct TokenProvider<T>
where
	T: ?Sized + HttpTransport,
{
	facade: PasswordGrantFacade<T>,
	cache: Arc<dyn TokenCache>,
	cache_key: String,
}
impl<T> TokenProvider<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a provider that caches tokens in `cache` and fetches them through `transport`.
	pub fn new(config: &ClientConfig, cache: Arc<dyn TokenCache>, transport: Arc<T>) -> Result<Self> {
		Ok(Self {
			facade: PasswordGrantFacade::from_config(config, transport)?,
			cache,
			cache_key: config.cache_key.clone(),
		})
	}

	/// Returns the key the token is cached under.
	pub fn cache_key(&self) -> &str {
		&self.cache_key
	}

	/// Returns the cached token or fetches and caches a new one.
	///
	/// `already_refreshed` adds the `X-Token-Refreshed` marker to the grant request.
	pub async fn get_token(&self, already_refreshed: bool) -> Result<AccessToken> {
		const KIND: OperationKind = OperationKind::TokenFetch;

		let span = OperationSpan::new(KIND, "get_token");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span.instrument(self.fetch(already_refreshed)).await;

		record_result(KIND, &result);

		result
	}

	/// Forgets the cached token and fetches a replacement flagged as a refresh.
	pub async fn refresh(&self) -> Result<AccessToken> {
		const KIND: OperationKind = OperationKind::TokenRefresh;

		let span = OperationSpan::new(KIND, "refresh");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.cache.forget(&self.cache_key).await?;

				self.fetch(true).await
			})
			.await;

		record_result(KIND, &result);

		result
	}

	async fn fetch(&self, already_refreshed: bool) -> Result<AccessToken> {
		if let Some(cached) = self.cache.get(&self.cache_key).await? {
			return Ok(cached);
		}

		let issued = self.facade.exchange_password(already_refreshed).await?;

		self.cache.put(&self.cache_key, issued.access_token.clone(), issued.expires_in).await?;

		Ok(issued.access_token)
	}
}
impl<T> Debug for TokenProvider<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenProvider")
			.field("facade", &self.facade)
			.field("cache_key", &self.cache_key)
			.finish()
	}
}

fn record_result<T>(kind: OperationKind, result: &Result<T>) {
	match result {
		Ok(_) => obs::record_operation_outcome(kind, OperationOutcome::Success),
		Err(_) => obs::record_operation_outcome(kind, OperationOutcome::Failure),
	}
}
