//! Authenticated client facade for the upstream API.

// self
use crate::{
	_prelude::*,
	cache::TokenCache,
	config::ClientConfig,
	error::ConfigError,
	executor::RequestExecutor,
	http::{HttpResponse, HttpTransport, Method, OutboundRequest},
	retry::RetryPolicy,
	token::TokenProvider,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestNowClient = NowClient<ReqwestTransport>;

/// Sends requests to the upstream API with a cached bearer token attached.
///
/// The client owns one [`TokenProvider`] and one [`RequestExecutor`] sharing the same transport
/// and token cache. Clone it freely; clones share every component.
pub struct NowClient<T>
where
	T: ?Sized + HttpTransport,
{
	base_uri: Url,
	tokens: Arc<TokenProvider<T>>,
	executor: Arc<RequestExecutor<T>>,
}
impl<T> NowClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		config: &ClientConfig,
		cache: Arc<dyn TokenCache>,
		transport: impl Into<Arc<T>>,
	) -> Result<Self> {
		config.validate()?;

		let transport = transport.into();
		let tokens = Arc::new(TokenProvider::new(config, cache, transport.clone())?);
		let policy = RetryPolicy::from_config(&config.http_client);
		let executor = Arc::new(RequestExecutor::new(transport, tokens.clone(), policy));

		Ok(Self { base_uri: config.credentials.base_uri.clone(), tokens, executor })
	}

	/// Returns the token provider.
	pub fn token_provider(&self) -> &TokenProvider<T> {
		&self.tokens
	}

	/// Returns the request executor.
	pub fn executor(&self) -> &RequestExecutor<T> {
		&self.executor
	}

	/// Builds a request for `path`, resolved against the configured base URI.
	pub fn request(&self, method: Method, path: &str) -> Result<OutboundRequest> {
		let url =
			self.base_uri.join(path).map_err(|source| ConfigError::InvalidUrl { source })?;

		Ok(OutboundRequest::new(method, url))
	}

	/// Attaches the current bearer token and executes `request` with retries.
	pub async fn send(&self, request: OutboundRequest) -> Result<HttpResponse> {
		let token = self.tokens.get_token(false).await?;
		let request = request.with_bearer(&token)?;

		self.executor.execute(request).await
	}

	/// Sends `GET path`.
	pub async fn get(&self, path: &str) -> Result<HttpResponse> {
		self.send(self.request(Method::GET, path)?).await
	}

	/// Sends `POST path` with a JSON body.
	pub async fn post_json<B>(&self, path: &str, body: &B) -> Result<HttpResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::POST, path)?.with_json(body)?).await
	}
}
#[cfg(feature = "reqwest")]
impl NowClient<ReqwestTransport> {
	/// Creates a client backed by a default reqwest transport.
	pub fn new(config: &ClientConfig, cache: Arc<dyn TokenCache>) -> Result<Self> {
		Self::with_transport(config, cache, ReqwestTransport::default())
	}
}
impl<T> Clone for NowClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			base_uri: self.base_uri.clone(),
			tokens: self.tokens.clone(),
			executor: self.executor.clone(),
		}
	}
}
impl<T> Debug for NowClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NowClient")
			.field("base_uri", &self.base_uri.as_str())
			.field("tokens", &self.tokens)
			.field("executor", &self.executor)
			.finish()
	}
}
