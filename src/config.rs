//! Client configuration: upstream credentials and the retry policy knobs.
//!
//! Every type deserializes with `serde`, so applications can embed them in whatever
//! configuration document they already load. [`ClientConfig::from_json`] is provided for the
//! common case and reports the offending field path on failure.

// crates.io
use serde::de::{self, Deserializer, SeqAccess, Visitor};
// self
use crate::{_prelude::*, error::ConfigError};

/// Token endpoint path used when none is configured.
pub const DEFAULT_TOKEN_PATH: &str = "/oauth_token.do";
/// Cache key used when none is configured.
pub const DEFAULT_CACHE_KEY: &str = "now_oauth_token";

/// Password-grant credentials and the upstream base URI.
#[derive(Clone, Deserialize)]
pub struct Credentials {
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret.
	pub client_secret: String,
	/// Resource-owner username.
	pub username: String,
	/// Resource-owner password.
	pub password: String,
	/// Base URI for the token endpoint and every API path.
	pub base_uri: Url,
}
impl Credentials {
	/// Creates credentials for the provided client + resource-owner pair.
	pub fn new(
		base_uri: Url,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			username: username.into(),
			password: password.into(),
			base_uri,
		}
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.field("base_uri", &self.base_uri.as_str())
			.finish()
	}
}

/// Retry policy configuration; every field is optional when deserializing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Enables the retry policy at all.
	pub incremental_retry_is_active: bool,
	/// Attempt ceiling: the number of retries allowed after the first attempt.
	pub max_retries: u32,
	/// Status codes that make a response retryable. Accepts `"500,401"` or `[500, 401]`.
	#[serde(deserialize_with = "deserialize_status_codes")]
	pub retry_response_codes: BTreeSet<u16>,
	/// Upper bound on the exponential backoff, in seconds.
	pub max_delay_between_retries_in_seconds: u64,
	/// Randomizes each delay within the upper half of its backoff step.
	pub retry_jitter: bool,
}
impl RetryConfig {
	/// Retries are disabled unless explicitly activated.
	pub const DEFAULT_INCREMENTAL_RETRY_IS_ACTIVE: bool = false;
	/// Default cap on the exponential backoff.
	pub const DEFAULT_MAX_DELAY_BETWEEN_RETRIES_IN_SECONDS: u64 = 60;
	/// Default attempt ceiling.
	pub const DEFAULT_MAX_RETRIES: u32 = 5;

	/// Turns the retry policy on or off.
	pub fn with_retry_active(mut self, active: bool) -> Self {
		self.incremental_retry_is_active = active;

		self
	}

	/// Overrides the attempt ceiling.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Replaces the retryable status code set.
	pub fn with_retry_response_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
		self.retry_response_codes = codes.into_iter().collect();

		self
	}

	/// Overrides the backoff cap.
	pub fn with_max_delay_seconds(mut self, seconds: u64) -> Self {
		self.max_delay_between_retries_in_seconds = seconds;

		self
	}

	/// Enables or disables delay jitter.
	pub fn with_jitter(mut self, jitter: bool) -> Self {
		self.retry_jitter = jitter;

		self
	}

	/// Returns the backoff cap as a [`Duration`].
	pub fn max_delay(&self) -> Duration {
		let seconds = i64::try_from(self.max_delay_between_retries_in_seconds).unwrap_or(i64::MAX);

		Duration::seconds(seconds)
	}

	/// Rejects status codes outside the HTTP range.
	pub fn validate(&self) -> Result<(), ConfigError> {
		match self.retry_response_codes.iter().find(|code| !(100..=599).contains(*code)) {
			Some(code) => Err(ConfigError::InvalidStatusCode { value: code.to_string() }),
			None => Ok(()),
		}
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			incremental_retry_is_active: Self::DEFAULT_INCREMENTAL_RETRY_IS_ACTIVE,
			max_retries: Self::DEFAULT_MAX_RETRIES,
			retry_response_codes: BTreeSet::new(),
			max_delay_between_retries_in_seconds: Self::DEFAULT_MAX_DELAY_BETWEEN_RETRIES_IN_SECONDS,
			retry_jitter: false,
		}
	}
}

/// Complete client configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ClientConfig {
	/// Upstream credentials.
	pub credentials: Credentials,
	/// Retry policy knobs.
	#[serde(default)]
	pub http_client: RetryConfig,
	/// Token endpoint path, resolved against the base URI.
	#[serde(default = "default_token_path")]
	pub token_path: String,
	/// Key under which the access token is cached.
	#[serde(default = "default_cache_key")]
	pub cache_key: String,
}
impl ClientConfig {
	/// Creates a configuration with default retry settings, token path, and cache key.
	pub fn new(credentials: Credentials) -> Self {
		Self {
			credentials,
			http_client: RetryConfig::default(),
			token_path: default_token_path(),
			cache_key: default_cache_key(),
		}
	}

	/// Parses a JSON configuration document.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Replaces the retry configuration.
	pub fn with_retry(mut self, retry: RetryConfig) -> Self {
		self.http_client = retry;

		self
	}

	/// Overrides the token endpoint path.
	pub fn with_token_path(mut self, path: impl Into<String>) -> Self {
		self.token_path = path.into();

		self
	}

	/// Overrides the cache key.
	pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
		self.cache_key = key.into();

		self
	}

	/// Resolves the token endpoint against the base URI.
	pub fn token_url(&self) -> Result<Url, ConfigError> {
		self.credentials
			.base_uri
			.join(&self.token_path)
			.map_err(|source| ConfigError::InvalidUrl { source })
	}

	/// Validates derived URLs and the retry policy.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.token_url()?;
		self.http_client.validate()
	}
}

/// Parses a comma-separated status code list such as `"500, 502,401"`.
pub fn parse_status_codes(raw: &str) -> Result<BTreeSet<u16>, ConfigError> {
	raw.split(',')
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.map(|value| {
			value
				.parse::<u16>()
				.ok()
				.filter(|code| (100..=599).contains(code))
				.ok_or_else(|| ConfigError::InvalidStatusCode { value: value.to_owned() })
		})
		.collect()
}

fn default_token_path() -> String {
	DEFAULT_TOKEN_PATH.into()
}

fn default_cache_key() -> String {
	DEFAULT_CACHE_KEY.into()
}

fn deserialize_status_codes<'de, D>(deserializer: D) -> Result<BTreeSet<u16>, D::Error>
where
	D: Deserializer<'de>,
{
	struct StatusCodes;
	impl<'de> Visitor<'de> for StatusCodes {
		type Value = BTreeSet<u16>;

		fn expecting(&self, f: &mut Formatter) -> FmtResult {
			f.write_str("a comma-separated string or a list of HTTP status codes")
		}

		fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
		where
			E: de::Error,
		{
			parse_status_codes(value).map_err(E::custom)
		}

		fn visit_unit<E>(self) -> Result<Self::Value, E>
		where
			E: de::Error,
		{
			Ok(BTreeSet::new())
		}

		fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
		where
			A: SeqAccess<'de>,
		{
			let mut codes = BTreeSet::new();

			while let Some(code) = seq.next_element::<u16>()? {
				codes.insert(code);
			}

			Ok(codes)
		}
	}

	deserializer.deserialize_any(StatusCodes)
}
