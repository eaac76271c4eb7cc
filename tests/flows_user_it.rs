// std
use std::{
	io::{Read, Write},
	net::TcpStream,
	thread,
};
// crates.io
use httpmock::prelude::*;
// self
use feishu_broker::{
	_preludet::*,
	api,
	auth::{AuthorizationCode, UserCredential},
	browser::RecordingOpener,
	callback::CallbackError,
	store::MemoryStore,
};

const APP_BODY: &str = r#"{"code":0,"msg":"ok","app_access_token":"a-1","expire":7200}"#;

fn credential(access: &str, refresh: Option<&str>, expires_at: OffsetDateTime) -> UserCredential {
	let mut builder = UserCredential::builder().access_token(access).expires_at(expires_at);

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().expect("Test credential should build.")
}

fn seeded_store(credential: UserCredential) -> Arc<MemoryStore> {
	Arc::new(MemoryStore::with_credential(credential))
}

fn grant_body(access: &str, refresh: &str) -> String {
	serde_json::json!({
		"code": 0,
		"msg": "success",
		"data": {
			"access_token": access,
			"refresh_token": refresh,
			"expires_in": 7200,
			"refresh_expires_in": 2592000,
			"name": "Alice",
			"open_id": "ou_alice",
		},
	})
	.to_string()
}

/// Opener that plays the browser: it sends the redirect back to the callback listener with
/// `code` and, unless overridden, the state found in the authorize URL.
fn browser_delivering(code: Option<&'static str>, state: Option<&'static str>) -> RecordingOpener {
	RecordingOpener::with_hook(move |url: &Url| {
		let pairs = url.query_pairs().into_owned().collect::<HashMap<String, String>>();
		let redirect = Url::parse(&pairs["redirect_uri"]).expect("Redirect URI should parse.");
		let addr = format!(
			"{}:{}",
			redirect.host_str().expect("Redirect URI should have a host."),
			redirect.port().expect("Redirect URI should carry the bound port.")
		);
		let mut query = vec![format!("state={}", state.unwrap_or(pairs["state"].as_str()))];

		if let Some(code) = code {
			query.push(format!("code={code}"));
		}

		let request = format!(
			"GET {}?{} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n",
			redirect.path(),
			query.join("&")
		);

		thread::spawn(move || {
			let mut stream = TcpStream::connect(&addr).expect("Failed to connect to listener.");

			stream.write_all(request.as_bytes()).expect("Failed to send callback.");

			let mut response = String::new();
			let _ = stream.read_to_string(&mut response);
		});
	})
}

#[tokio::test]
async fn stored_valid_credential_is_returned_without_network() {
	let server = MockServer::start_async().await;
	let app_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::APP_ACCESS_TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(APP_BODY);
		})
		.await;
	let store = seeded_store(credential(
		"u-stored",
		Some("r-stored"),
		OffsetDateTime::now_utc() + Duration::hours(1),
	));
	let (broker, _, opener) =
		build_reqwest_test_broker_with_store(test_config(&server.base_url()), store);
	let held = broker.get_user_token().await.expect("Stored credential should be valid.");

	assert_eq!(held.access_token.expose(), "u-stored");

	let usable = broker.user_access_token().await.expect("Valid credential should be reused.");

	assert_eq!(usable.access_token.expose(), "u-stored");
	assert!(opener.opened().is_empty());

	app_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn expired_or_missing_credential_needs_authorization() {
	let server = MockServer::start_async().await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::REFRESH_ACCESS_TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(grant_body("u", "r"));
		})
		.await;
	let expired = seeded_store(credential(
		"u-old",
		Some("r-old"),
		OffsetDateTime::now_utc() - Duration::seconds(10),
	));
	let (broker, _, _) =
		build_reqwest_test_broker_with_store(test_config(&server.base_url()), expired);
	let err = broker.get_user_token().await.expect_err("Expired credential must not be returned.");

	assert!(err.is_needs_authorization(), "Unexpected error: {err:?}.");

	let (broker, _, _) = build_reqwest_test_broker(test_config(&server.base_url()));
	let err = broker.get_user_token().await.expect_err("Empty store must need authorization.");

	assert!(err.is_needs_authorization(), "Unexpected error: {err:?}.");

	refresh_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn interactive_authorization_persists_credential_for_next_run() {
	let server = MockServer::start_async().await;
	let app_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::APP_ACCESS_TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(APP_BODY);
		})
		.await;
	let exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(api::USER_ACCESS_TOKEN_PATH)
				.header("authorization", "Bearer a-1")
				.json_body(serde_json::json!({ "grant_type": "authorization_code", "code": "c-1" }));
			then.status(200)
				.header("content-type", "application/json")
				.body(grant_body("u-1", "r-1"));
		})
		.await;
	let config = test_config(&server.base_url());
	let (broker, store, _) = build_reqwest_test_broker(config.clone());
	let opener = Arc::new(browser_delivering(Some("c-1"), None));
	let broker = broker.with_opener(opener.clone());
	let issued = broker.interactive_authorize().await.expect("Authorization should complete.");

	assert_eq!(issued.access_token.expose(), "u-1");
	assert_eq!(issued.name(), Some("Alice"));
	assert_eq!(issued.open_id().map(|id| id.to_string()), Some("ou_alice".into()));
	assert!(!issued.is_expired());

	let opened = opener.opened();

	assert_eq!(opened.len(), 1);
	assert_eq!(opened[0].path(), api::AUTHORIZE_PATH);
	assert!(opened[0].query_pairs().any(|(key, value)| key == "app_id" && value == TEST_APP_ID));

	let persisted = store.snapshot().expect("Credential should be persisted.");

	assert_eq!(persisted.access_token.expose(), "u-1");
	assert_eq!(persisted.extra.get("refresh_expires_in"), Some(&serde_json::json!(2592000)));

	let (next_run, _, _) = build_reqwest_test_broker_with_store(config, store);
	let reloaded = next_run.get_user_token().await.expect("Next run should reuse the credential.");

	assert_eq!(reloaded.access_token.expose(), "u-1");

	app_mock.assert_calls_async(1).await;
	exchange_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn callback_with_foreign_state_is_rejected() {
	let server = MockServer::start_async().await;
	let exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::USER_ACCESS_TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(grant_body("u-1", "r-1"));
		})
		.await;
	let (broker, store, _) = build_reqwest_test_broker(test_config(&server.base_url()));
	let broker = broker.with_opener(Arc::new(browser_delivering(Some("c-1"), Some("forged"))));
	let err = broker.interactive_authorize().await.expect_err("Forged state must be rejected.");

	assert!(
		matches!(err, Error::Callback(CallbackError::StateMismatch)),
		"Unexpected error: {err:?}."
	);
	assert!(store.snapshot().is_none());

	exchange_mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn callback_without_code_is_rejected() {
	let server = MockServer::start_async().await;
	let (broker, store, _) = build_reqwest_test_broker(test_config(&server.base_url()));
	let broker = broker.with_opener(Arc::new(browser_delivering(None, None)));
	let err = broker.interactive_authorize().await.expect_err("Missing code must be rejected.");

	assert!(
		matches!(err, Error::Callback(CallbackError::MissingParameter { name: "code" })),
		"Unexpected error: {err:?}."
	);
	assert!(store.snapshot().is_none());
}

#[tokio::test]
async fn callback_wait_is_bounded() {
	let server = MockServer::start_async().await;
	let mut config = test_config(&server.base_url());

	config.callback_timeout = Duration::milliseconds(200);

	let (broker, _, opener) = build_reqwest_test_broker(config);
	let err = broker.interactive_authorize().await.expect_err("Silent browser must time out.");

	assert!(
		matches!(err, Error::Callback(CallbackError::TimedOut { .. })),
		"Unexpected error: {err:?}."
	);
	assert_eq!(opener.opened().len(), 1);
}

#[tokio::test]
async fn expired_credential_is_refreshed_without_browser() {
	let server = MockServer::start_async().await;
	let app_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::APP_ACCESS_TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(APP_BODY);
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(api::REFRESH_ACCESS_TOKEN_PATH)
				.header("authorization", "Bearer a-1")
				.json_body(
					serde_json::json!({ "grant_type": "refresh_token", "refresh_token": "r-old" }),
				);
			then.status(200)
				.header("content-type", "application/json")
				.body(grant_body("u-2", "r-2"));
		})
		.await;
	let store = seeded_store(credential(
		"u-old",
		Some("r-old"),
		OffsetDateTime::now_utc() - Duration::seconds(10),
	));
	let (broker, store, opener) =
		build_reqwest_test_broker_with_store(test_config(&server.base_url()), store);
	let refreshed = broker.user_access_token().await.expect("Refresh should succeed.");

	assert_eq!(refreshed.access_token.expose(), "u-2");
	assert!(opener.opened().is_empty());

	let persisted = store.snapshot().expect("Refreshed credential should be persisted.");

	assert_eq!(persisted.refresh_token.as_ref().map(|secret| secret.expose()), Some("r-2"));

	app_mock.assert_calls_async(1).await;
	refresh_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn failed_refresh_falls_back_to_authorization() {
	let server = MockServer::start_async().await;
	let _app_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::APP_ACCESS_TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(APP_BODY);
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::REFRESH_ACCESS_TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"code":20026,"msg":"refresh token expired"}"#);
		})
		.await;
	let exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::USER_ACCESS_TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(grant_body("u-new", "r-new"));
		})
		.await;
	let store = seeded_store(credential(
		"u-old",
		Some("r-old"),
		OffsetDateTime::now_utc() - Duration::seconds(10),
	));
	let (broker, _, _) =
		build_reqwest_test_broker_with_store(test_config(&server.base_url()), store);
	let opener = Arc::new(browser_delivering(Some("c-2"), None));
	let broker = broker.with_opener(opener.clone());
	let issued = broker.user_access_token().await.expect("Authorization should take over.");

	assert_eq!(issued.access_token.expose(), "u-new");
	assert_eq!(opener.opened().len(), 1);

	refresh_mock.assert_calls_async(1).await;
	exchange_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn refresh_without_refresh_token_needs_authorization() {
	let server = MockServer::start_async().await;
	let store =
		seeded_store(credential("u-old", None, OffsetDateTime::now_utc() - Duration::seconds(10)));
	let (broker, _, _) =
		build_reqwest_test_broker_with_store(test_config(&server.base_url()), store);
	let err = broker.refresh_user_token().await.expect_err("Refresh needs a refresh token.");

	assert!(err.is_needs_authorization(), "Unexpected error: {err:?}.");
}

#[tokio::test]
async fn exchange_code_persists_credential() {
	let server = MockServer::start_async().await;
	let _app_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::APP_ACCESS_TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(APP_BODY);
		})
		.await;
	let exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(api::USER_ACCESS_TOKEN_PATH)
				.json_body(serde_json::json!({ "grant_type": "authorization_code", "code": "c-9" }));
			then.status(200)
				.header("content-type", "application/json")
				.body(grant_body("u-9", "r-9"));
		})
		.await;
	let (broker, store, _) = build_reqwest_test_broker(test_config(&server.base_url()));
	let issued = broker
		.exchange_code(AuthorizationCode::new("c-9"))
		.await
		.expect("Code exchange should succeed.");

	assert_eq!(issued.access_token.expose(), "u-9");
	assert_eq!(
		store.snapshot().map(|persisted| persisted.access_token.expose().to_owned()),
		Some("u-9".into())
	);

	exchange_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_code_exchange_is_not_retried() {
	let server = MockServer::start_async().await;
	let _app_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::APP_ACCESS_TOKEN_PATH);
			then.status(200).header("content-type", "application/json").body(APP_BODY);
		})
		.await;
	let exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST).path(api::USER_ACCESS_TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"code":20003,"msg":"code not found"}"#);
		})
		.await;
	let (broker, store, _) = build_reqwest_test_broker(test_config(&server.base_url()));
	let err = broker
		.exchange_code(AuthorizationCode::new("c-stale"))
		.await
		.expect_err("Rejected code must fail.");

	assert_eq!(err.api_code(), Some(20003));
	assert!(store.snapshot().is_none());

	exchange_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn reset_forgets_credential_everywhere() {
	let store = seeded_store(credential(
		"u-stored",
		Some("r-stored"),
		OffsetDateTime::now_utc() + Duration::hours(1),
	));
	let (broker, store, _) =
		build_reqwest_test_broker_with_store(test_config("http://127.0.0.1:9"), store);

	broker.get_user_token().await.expect("Stored credential should load first.");
	broker.reset_user_token().await.expect("Reset should succeed.");

	assert!(store.snapshot().is_none());
	assert!(
		broker
			.get_user_token()
			.await
			.expect_err("Reset credential must not be returned.")
			.is_needs_authorization()
	);

	broker.reset_user_token().await.expect("Resetting an empty store should succeed.");
}
