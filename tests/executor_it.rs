mod common;

// std
use std::sync::Arc;
// crates.io
use time::Duration;
// self
use common::{ScriptedTransport, Step, fast_retry, scripted_client};
use now_client::{
	auth::AccessToken,
	cache::TokenCache,
	config::{DEFAULT_CACHE_KEY, RetryConfig},
	error::Error,
	http::{HeaderName, Method, TOKEN_REFRESHED_HEADER},
};

#[tokio::test]
async fn refreshes_token_on_last_attempt_unauthorized_and_replays_once() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Status(500),
		Step::Status(500),
		Step::Status(401),
		Step::Status(200),
	]));
	let (client, cache) = scripted_client(transport.clone(), fast_retry(3, [500, 401]));
	let response =
		client.get("/api/now/table/incident").await.expect("Refreshed replay should succeed.");

	assert_eq!(response.status().as_u16(), 200);

	let api_calls = transport.api_calls();
	let token_calls = transport.token_calls();

	assert_eq!(api_calls.len(), 4);
	assert_eq!(token_calls.len(), 2);
	assert!(api_calls[..3].iter().all(|call| call.authorization.as_deref() == Some("Bearer token-1")));
	assert!(api_calls[..3].iter().all(|call| call.refreshed_marker.is_none()));
	assert_eq!(api_calls[3].authorization.as_deref(), Some("Bearer token-2"));
	assert_eq!(api_calls[3].refreshed_marker.as_deref(), Some("true"));
	assert_eq!(token_calls[0].refreshed_marker, None);
	assert_eq!(token_calls[1].refreshed_marker.as_deref(), Some("true"));

	let cached = cache
		.get(DEFAULT_CACHE_KEY)
		.await
		.expect("Cache read should succeed.")
		.expect("Refreshed token should be cached.");

	assert_eq!(cached.expose(), "token-2");

	let metrics = client.executor().metrics();

	assert_eq!(metrics.attempts(), 4);
	assert_eq!(metrics.retries(), 3);
	assert_eq!(metrics.refreshes(), 1);
	assert_eq!(metrics.failures(), 0);
}

#[tokio::test]
async fn unauthorized_after_refresh_exhausts_retries() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Status(500),
		Step::Status(500),
		Step::Status(401),
		Step::Status(401),
	]));
	let (client, _cache) = scripted_client(transport.clone(), fast_retry(3, [500, 401]));
	let err = client
		.get("/api/now/table/incident")
		.await
		.expect_err("A second unauthorized response should be final.");

	assert!(matches!(err, Error::RetriesExhausted { attempts: 4, status: Some(401), .. }));
	assert_eq!(transport.api_calls().len(), 4);
	assert_eq!(transport.token_calls().len(), 2);
	assert_eq!(client.executor().metrics().refreshes(), 1);
	assert_eq!(client.executor().metrics().failures(), 1);
}

#[tokio::test]
async fn already_refreshed_request_stops_after_its_replay() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Status(500),
		Step::Status(401),
		Step::Status(200),
	]));
	let (client, _cache) = scripted_client(transport.clone(), fast_retry(3, [500, 401]));
	let request = client
		.request(Method::GET, "/api/now/table/incident")
		.expect("Request should build.")
		.with_header(HeaderName::from_static(TOKEN_REFRESHED_HEADER), "true")
		.expect("Marker header should be valid.");
	let err = client.send(request).await.expect_err("The refresh guard should stop the loop.");

	assert!(matches!(err, Error::RetriesExhausted { attempts: 2, status: Some(401), .. }));
	assert_eq!(transport.api_calls().len(), 2);
	assert_eq!(transport.token_calls().len(), 1);
	assert_eq!(client.executor().metrics().refreshes(), 0);
}

#[tokio::test]
async fn disabled_retries_surface_the_first_failure() {
	let transport = Arc::new(ScriptedTransport::new([Step::Status(500), Step::Status(200)]));
	let (client, _cache) = scripted_client(
		transport.clone(),
		RetryConfig::default().with_retry_response_codes([500, 401]),
	);
	let err = client.get("/api/now/table/incident").await.expect_err("No retry should happen.");

	assert!(matches!(err, Error::UpstreamHttp { status: 500, attempts: 1, .. }));
	assert_eq!(transport.api_calls().len(), 1);

	let transport = Arc::new(ScriptedTransport::new([Step::Fail, Step::Status(200)]));
	let (client, _cache) = scripted_client(transport.clone(), RetryConfig::default());
	let err = client.get("/api/now/table/incident").await.expect_err("No retry should happen.");

	assert!(matches!(err, Error::RequestTransport { attempts: 1, .. }));
	assert_eq!(transport.api_calls().len(), 1);
}

#[tokio::test]
async fn unlisted_status_is_not_retried() {
	let transport = Arc::new(ScriptedTransport::new([Step::Status(404)]));
	let (client, _cache) = scripted_client(transport.clone(), fast_retry(5, [500]));
	let err = client.get("/api/now/table/missing").await.expect_err("404 is not retryable.");

	assert!(matches!(err, Error::UpstreamHttp { status: 404, attempts: 1, .. }));
	assert_eq!(err.attempts(), Some(1));
}

#[tokio::test]
async fn transport_failures_are_retried_until_success() {
	let transport =
		Arc::new(ScriptedTransport::new([Step::Fail, Step::Fail, Step::Status(200)]));
	let (client, _cache) = scripted_client(transport.clone(), fast_retry(5, Vec::new()));
	let response = client
		.post_json("/api/now/table/incident", &serde_json::json!({ "short_description": "disk full" }))
		.await
		.expect("Third attempt should succeed.");

	assert_eq!(response.status().as_u16(), 200);

	let api_calls = transport.api_calls();

	assert_eq!(api_calls.len(), 3);
	assert!(api_calls.iter().all(|call| call.body == r#"{"short_description":"disk full"}"#));
	assert_eq!(transport.token_calls().len(), 1);
}

#[tokio::test]
async fn transport_failures_exhaust_the_ceiling() {
	let transport = Arc::new(ScriptedTransport::new([Step::Fail, Step::Fail, Step::Fail]));
	let (client, _cache) = scripted_client(transport.clone(), fast_retry(2, Vec::new()));
	let err = client.get("/api/now/table/incident").await.expect_err("Every attempt fails.");

	assert!(matches!(err, Error::RetriesExhausted { attempts: 3, status: None, source: Some(_) }));
}

#[tokio::test]
async fn failed_refresh_aborts_the_retry_loop() {
	let transport =
		Arc::new(ScriptedTransport::new([Step::Status(401), Step::Status(200)]).reject_tokens(401));
	let (client, cache) = scripted_client(transport.clone(), fast_retry(1, [401]));

	cache
		.put(DEFAULT_CACHE_KEY, AccessToken::new("stale"), Duration::minutes(10))
		.await
		.expect("Seeding the cache should succeed.");

	let err = client.get("/api/now/table/incident").await.expect_err("Refresh should fail.");

	assert!(matches!(err, Error::TokenEndpoint { status: Some(401), .. }));
	assert_eq!(transport.api_calls().len(), 1);
	assert_eq!(transport.token_calls().len(), 1);
	assert!(cache.get(DEFAULT_CACHE_KEY).await.expect("Cache read should succeed.").is_none());
}

#[tokio::test]
async fn token_request_carries_password_grant_form() {
	let transport = Arc::new(ScriptedTransport::new([Step::Status(200)]));
	let (client, _cache) = scripted_client(transport.clone(), RetryConfig::default());

	client.get("/api/now/table/incident").await.expect("Request should succeed.");

	let token_calls = transport.token_calls();
	let body = &token_calls[0].body;

	assert!(body.contains("grant_type=password"));
	assert!(body.contains("username=integration.user"));
	assert!(body.contains("password=integration-password"));
	assert!(body.contains("client_id=client-id"));
	assert!(body.contains("client_secret=client-secret"));
}

#[tokio::test(start_paused = true)]
async fn waits_the_backoff_delay_between_attempts() {
	let transport = Arc::new(ScriptedTransport::new([
		Step::Status(500),
		Step::Status(500),
		Step::Status(200),
	]));
	let (client, _cache) = scripted_client(
		transport.clone(),
		RetryConfig::default()
			.with_retry_active(true)
			.with_max_retries(3)
			.with_retry_response_codes([500]),
	);
	let policy = client.executor().policy();
	let expected = (policy.delay_before_next_attempt(0) + policy.delay_before_next_attempt(1))
		.unsigned_abs();

	assert_eq!(expected, std::time::Duration::from_secs(3));

	let started = tokio::time::Instant::now();
	let response =
		client.get("/api/now/table/incident").await.expect("Third attempt should succeed.");
	let elapsed = started.elapsed();

	assert_eq!(response.status().as_u16(), 200);
	assert_eq!(transport.api_calls().len(), 3);
	assert!(elapsed >= expected, "Executor should wait {expected:?}, waited {elapsed:?}.");
	assert!(elapsed < expected + std::time::Duration::from_millis(100));
}
