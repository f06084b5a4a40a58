//! Shared fixtures for integration tests.

#![allow(dead_code)]

// std
use std::{collections::VecDeque, sync::Arc};
// crates.io
use parking_lot::Mutex;
// self
use now_client::{
	cache::MemoryCache,
	client::NowClient,
	config::{ClientConfig, Credentials, DEFAULT_TOKEN_PATH, RetryConfig},
	error::TransportError,
	http::{HeaderValue, HttpRequest, HttpResponse, HttpTransport, StatusCode, TransportFuture, header},
	url::Url,
};

pub const CLIENT_ID: &str = "client-id";
pub const CLIENT_SECRET: &str = "client-secret";
pub const USERNAME: &str = "integration.user";
pub const PASSWORD: &str = "integration-password";

/// Builds a configuration pointing at `base_uri` with retries driven by `retry`.
pub fn config(base_uri: &str, retry: RetryConfig) -> ClientConfig {
	let base_uri = Url::parse(base_uri).expect("Base URI fixture should parse.");

	ClientConfig::new(Credentials::new(base_uri, CLIENT_ID, CLIENT_SECRET, USERNAME, PASSWORD))
		.with_retry(retry)
}

/// Retry settings with zero backoff so scenarios run without waiting.
pub fn fast_retry(max_retries: u32, codes: impl IntoIterator<Item = u16>) -> RetryConfig {
	RetryConfig::default()
		.with_retry_active(true)
		.with_max_retries(max_retries)
		.with_retry_response_codes(codes)
		.with_max_delay_seconds(0)
}

/// One scripted answer for an API call.
#[derive(Clone, Debug)]
pub enum Step {
	Status(u16),
	Fail,
}

/// Request as observed by [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct SentRequest {
	pub path: String,
	pub authorization: Option<String>,
	pub refreshed_marker: Option<String>,
	pub body: String,
}
impl SentRequest {
	fn capture(request: &HttpRequest) -> Self {
		let header_text = |name: &str| {
			request.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
		};

		Self {
			path: request.uri().path().to_owned(),
			authorization: header_text("authorization"),
			refreshed_marker: header_text("x-token-refreshed"),
			body: String::from_utf8_lossy(request.body()).into_owned(),
		}
	}
}

/// In-process transport that replays scripted API answers and issues sequential tokens
/// (`token-1`, `token-2`, ...) from the token endpoint. Token payloads carry only
/// `access_token` and `expires_in`.
#[derive(Default)]
pub struct ScriptedTransport {
	steps: Mutex<VecDeque<Step>>,
	token_status: Mutex<Option<u16>>,
	issued: Mutex<u32>,
	sent: Mutex<Vec<SentRequest>>,
}
impl ScriptedTransport {
	pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
		Self { steps: Mutex::new(steps.into_iter().collect()), ..Self::default() }
	}

	/// Makes the token endpoint answer with `status` and an OAuth error body.
	pub fn reject_tokens(self, status: u16) -> Self {
		*self.token_status.lock() = Some(status);

		self
	}

	pub fn sent(&self) -> Vec<SentRequest> {
		self.sent.lock().clone()
	}

	pub fn api_calls(&self) -> Vec<SentRequest> {
		self.sent().into_iter().filter(|request| request.path != DEFAULT_TOKEN_PATH).collect()
	}

	pub fn token_calls(&self) -> Vec<SentRequest> {
		self.sent().into_iter().filter(|request| request.path == DEFAULT_TOKEN_PATH).collect()
	}

	fn token_response(&self) -> HttpResponse {
		let rejected = *self.token_status.lock();
		let (status, body) = match rejected {
			Some(status) => (status, r#"{"error":"invalid_client"}"#.to_owned()),
			None => {
				let mut issued = self.issued.lock();

				*issued += 1;

				(200, format!(r#"{{"access_token":"token-{}","expires_in":1800}}"#, *issued))
			},
		};

		json_response(status, body)
	}

	fn api_response(&self) -> Result<HttpResponse, TransportError> {
		let step = self.steps.lock().pop_front().unwrap_or(Step::Status(200));

		match step {
			Step::Status(status) => Ok(json_response(status, "{}".to_owned())),
			Step::Fail =>
				Err(TransportError::Io(std::io::Error::new(
					std::io::ErrorKind::ConnectionReset,
					"connection reset by peer",
				))),
		}
	}
}
impl HttpTransport for ScriptedTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let sent = SentRequest::capture(&request);
		let is_token_call = sent.path == DEFAULT_TOKEN_PATH;

		self.sent.lock().push(sent);

		let result = if is_token_call { Ok(self.token_response()) } else { self.api_response() };

		Box::pin(async move { result })
	}
}

/// Builds a client over `transport` with a fresh in-memory cache.
pub fn scripted_client(
	transport: Arc<ScriptedTransport>,
	retry: RetryConfig,
) -> (NowClient<ScriptedTransport>, Arc<MemoryCache>) {
	let cache = Arc::new(MemoryCache::default());
	let client =
		NowClient::with_transport(&config("https://instance.example.com", retry), cache.clone(), transport)
			.expect("Scripted client should build.");

	(client, cache)
}

fn json_response(status: u16, body: String) -> HttpResponse {
	let mut response = HttpResponse::new(body.into_bytes());

	*response.status_mut() = StatusCode::from_u16(status).expect("Scripted status should be valid.");
	response
		.headers_mut()
		.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

	response
}
