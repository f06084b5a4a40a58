//! Transport primitives shared by API calls and token exchanges.
//!
//! [`HttpTransport`] is the client's only dependency on an HTTP stack: both the retry executor
//! and the password-grant facade dispatch through it, so a custom transport (or a test double)
//! sees every request the client makes. [`OutboundRequest`] is the immutable request value the
//! executor replays across attempts.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
pub use oauth2::{
	HttpRequest, HttpResponse,
	http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::{ConfigError, TransportError},
};

/// Marker header set once a logical request has consumed its token refresh.
pub const TOKEN_REFRESHED_HEADER: &str = "x-token-refreshed";

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports.
///
/// Implementations must be `Send + Sync + 'static` so one transport can back the token
/// provider and the executor at the same time. Connection pooling, TLS, and timeouts are the
/// transport's business; a non-2xx response is a successful send.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request` and resolves once the full response body is available.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// A fresh slot backs each token request; the handle clears it before dispatching and stores
/// the status as soon as a response arrives.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Immutable outbound request replayed by the executor.
///
/// Retries never mutate a request in place: [`OutboundRequest::next_attempt`] derives a new
/// value, so each attempt's headers stay auditable.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
	method: Method,
	url: Url,
	headers: HeaderMap,
	body: Vec<u8>,
}
impl OutboundRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: Vec::new() }
	}

	/// Returns the HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Returns the target URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Returns the request headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Returns the raw request body.
	pub fn body(&self) -> &[u8] {
		&self.body
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self, ConfigError> {
		let value = HeaderValue::from_str(value)
			.map_err(|_| ConfigError::InvalidHeaderValue { name: name.to_string() })?;

		self.headers.insert(name, value);

		Ok(self)
	}

	/// Replaces the body with raw bytes.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn with_json<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(|source| ConfigError::Body { source })?;

		Ok(self.with_header(header::CONTENT_TYPE, "application/json")?.with_body(bytes))
	}

	/// Sets `Authorization: Bearer <token>`.
	pub fn with_bearer(self, token: &AccessToken) -> Result<Self, ConfigError> {
		self.with_header(header::AUTHORIZATION, &token.bearer())
	}

	/// Returns `true` once the refresh marker header carries a truthy value.
	pub fn is_refreshed(&self) -> bool {
		self.headers
			.get(TOKEN_REFRESHED_HEADER)
			.and_then(|value| value.to_str().ok())
			.map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true"))
			.unwrap_or(false)
	}

	/// Derives the next attempt after a token refresh: new bearer header plus refresh marker.
	pub fn next_attempt(&self, token: &AccessToken) -> Result<Self, ConfigError> {
		self.clone()
			.with_bearer(token)?
			.with_header(HeaderName::from_static(TOKEN_REFRESHED_HEADER), "true")
	}

	/// Renders the target as `scheme://host[:port]/path?query` with credentials and fragment
	/// removed.
	pub fn redacted_uri(&self) -> String {
		let mut url = self.url.clone();

		// Both setters only fail for cannot-be-a-base URLs, which carry no credentials.
		let _ = url.set_username("");
		let _ = url.set_password(None);

		url.set_fragment(None);

		url.into()
	}

	/// Lossy UTF-8 rendering of the body for log records.
	pub fn body_preview(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Builds the transport-level request for one attempt.
	pub fn to_http(&self) -> Result<HttpRequest, ConfigError> {
		let mut builder = oauth2::http::Request::builder()
			.method(self.method.clone())
			.uri(self.url.as_str());

		if let Some(headers) = builder.headers_mut() {
			headers.extend(self.headers.iter().map(|(name, value)| (name.clone(), value.clone())));
		}

		Ok(builder.body(self.body.clone())?)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let response = self.0.execute(request.try_into()?).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
