//! Password-grant facade over the `oauth2` crate.
//!
//! The facade owns a configured `oauth2` client and routes the actual HTTP exchange through the
//! client's [`HttpTransport`], so token requests and API requests share one stack. Each exchange
//! builds a [`TokenEndpointHandle`] carrying a fresh [`ResponseMetadataSlot`] (used to tell a
//! rejected grant from a malformed success payload) and the refresh marker flag.

pub use oauth2;

// crates.io
use oauth2::{
	AccessToken as OAuthAccessToken, AsyncHttpClient, AuthType, Client, ClientId, ClientSecret,
	EndpointNotSet, EndpointSet, HttpClientError, HttpRequest, HttpResponse, RefreshToken,
	RequestTokenError, ResourceOwnerPassword, ResourceOwnerUsername, Scope,
	StandardRevocableToken, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
	http::{HeaderName, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::ClientConfig,
	error::{ConfigError, MalformedTokenResponse, TransportError},
	http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot, TOKEN_REFRESHED_HEADER},
};

type PasswordGrantClient<HasTokenUrl = EndpointSet> = Client<
	BasicErrorResponse,
	PasswordTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	HasTokenUrl,
>;
type HandleFuture<'c> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, HttpClientError<TransportError>>> + 'c + Send>>;

/// Access token issued by the token endpoint together with its lifetime.
#[derive(Clone, Debug)]
pub struct IssuedToken {
	/// Bearer credential.
	pub access_token: AccessToken,
	/// Lifetime reported by `expires_in`.
	pub expires_in: Duration,
}

/// Token endpoint success payload.
///
/// Only `access_token` is required while parsing; `token_type` defaults to `Bearer` and a
/// missing `expires_in` is rejected later with a dedicated error.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PasswordTokenResponse {
	access_token: OAuthAccessToken,
	#[serde(default = "default_token_type")]
	token_type: BasicTokenType,
	#[serde(skip_serializing_if = "Option::is_none")]
	expires_in: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	refresh_token: Option<RefreshToken>,
	#[serde(skip)]
	scopes: Option<Vec<Scope>>,
}
impl TokenResponse for PasswordTokenResponse {
	type TokenType = BasicTokenType;

	fn access_token(&self) -> &OAuthAccessToken {
		&self.access_token
	}

	fn token_type(&self) -> &Self::TokenType {
		&self.token_type
	}

	fn expires_in(&self) -> Option<std::time::Duration> {
		self.expires_in.map(std::time::Duration::from_secs)
	}

	fn refresh_token(&self) -> Option<&RefreshToken> {
		self.refresh_token.as_ref()
	}

	fn scopes(&self) -> Option<&Vec<Scope>> {
		self.scopes.as_ref()
	}
}

/// [`AsyncHttpClient`] handle that dispatches token requests through an [`HttpTransport`].
pub struct TokenEndpointHandle<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	slot: ResponseMetadataSlot,
	refreshed: bool,
}
impl<T> TokenEndpointHandle<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a handle that records outcomes in `slot` and flags refresh-originated requests.
	pub fn new(transport: Arc<T>, slot: ResponseMetadataSlot, refreshed: bool) -> Self {
		Self { transport, slot, refreshed }
	}
}
impl<'c, T> AsyncHttpClient<'c> for TokenEndpointHandle<T>
where
	T: ?Sized + HttpTransport,
{
	type Error = HttpClientError<TransportError>;
	type Future = HandleFuture<'c>;

	fn call(&'c self, mut request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			if self.refreshed {
				request.headers_mut().insert(
					HeaderName::from_static(TOKEN_REFRESHED_HEADER),
					HeaderValue::from_static("true"),
				);
			}

			let response = self.transport.send(request).await.map_err(Box::new)?;

			self.slot.store(ResponseMetadata { status: Some(response.status().as_u16()) });

			Ok(response)
		})
	}
}

/// Password-grant client bound to one token endpoint and one resource owner.
pub struct PasswordGrantFacade<T>
where
	T: ?Sized + HttpTransport,
{
	oauth_client: PasswordGrantClient,
	username: ResourceOwnerUsername,
	password: ResourceOwnerPassword,
	transport: Arc<T>,
}
impl<T> PasswordGrantFacade<T>
where
	T: ?Sized + HttpTransport,
{
	/// Builds the facade from client configuration; credentials travel in the request body.
	pub fn from_config(config: &ClientConfig, transport: Arc<T>) -> Result<Self> {
		let token_url = TokenUrl::from_url(config.token_url()?);
		let credentials = &config.credentials;
		let oauth_client =
			PasswordGrantClient::<EndpointNotSet>::new(ClientId::new(credentials.client_id.clone()))
			.set_client_secret(ClientSecret::new(credentials.client_secret.clone()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url);

		Ok(Self {
			oauth_client,
			username: ResourceOwnerUsername::new(credentials.username.clone()),
			password: ResourceOwnerPassword::new(credentials.password.clone()),
			transport,
		})
	}

	/// Returns the token endpoint URL.
	pub fn token_url(&self) -> &str {
		self.oauth_client.token_uri().as_str()
	}

	/// Performs `grant_type=password`; `refreshed` adds the refresh marker header.
	pub async fn exchange_password(&self, refreshed: bool) -> Result<IssuedToken> {
		let slot = ResponseMetadataSlot::default();
		let handle = TokenEndpointHandle::new(self.transport.clone(), slot.clone(), refreshed);
		let response = self
			.oauth_client
			.exchange_password(&self.username, &self.password)
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(slot.take(), err))?;

		map_token_response(response)
	}
}
impl<T> Debug for PasswordGrantFacade<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PasswordGrantFacade")
			.field("token_url", &self.token_url())
			.field("username", &self.username.as_str())
			.finish()
	}
}

fn map_token_response(response: PasswordTokenResponse) -> Result<IssuedToken> {
	let expires_in = response.expires_in.ok_or(MalformedTokenResponse::MissingExpiresIn)?;
	let expires_in =
		i64::try_from(expires_in).map_err(|_| MalformedTokenResponse::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(MalformedTokenResponse::NonPositiveExpiresIn.into());
	}

	let expires_in = Duration::seconds(expires_in);

	// The cache stores an absolute expiry; it must stay representable.
	if OffsetDateTime::now_utc().checked_add(expires_in).is_none() {
		return Err(MalformedTokenResponse::ExpiresInOutOfRange.into());
	}

	Ok(IssuedToken {
		access_token: AccessToken::new(response.access_token.secret().to_owned()),
		expires_in,
	})
}

fn default_token_type() -> BasicTokenType {
	BasicTokenType::Bearer
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<TransportError>>,
) -> Error {
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(status, response),
		RequestTokenError::Request(error) => map_transport_error(status, error),
		RequestTokenError::Parse(source, _body) => match status {
			Some(code) if code != 200 => Error::TokenEndpoint {
				status,
				reason: format!("Token endpoint responded with HTTP {code}"),
			},
			_ => MalformedTokenResponse::Parse { source }.into(),
		},
		RequestTokenError::Other(message) => Error::TokenEndpoint { status, reason: message },
	}
}

fn map_server_response_error(status: Option<u16>, response: BasicErrorResponse) -> Error {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	Error::TokenEndpoint { status, reason }
}

fn map_transport_error(status: Option<u16>, err: HttpClientError<TransportError>) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => Error::Transport(*inner),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => Error::TokenEndpoint { status, reason: message },
		other => Error::TokenEndpoint {
			status,
			reason: format!("Unhandled HTTP client error variant: {other:?}"),
		},
	}
}
