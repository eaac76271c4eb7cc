//! Feishu/Lark Open Platform token broker: tenant and user credentials, a one-shot authorization
//! callback, persisted user tokens, and authenticated requests for terminal tooling.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod browser;
pub mod cache;
pub mod callback;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod retry;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		api::ReqwestTransportErrorMapper,
		auth::AppId,
		browser::{RecordingOpener, UrlOpener},
		config::BrokerConfig,
		flows::TokenBroker,
		http::ReqwestHttpClient,
		retry::RetryPolicy,
		store::{MemoryStore, SecretStore},
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = TokenBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Application identifier used by test configurations.
	pub const TEST_APP_ID: &str = "cli_test_app";
	/// Application secret used by test configurations.
	pub const TEST_APP_SECRET: &str = "test-app-secret";

	/// Builds a configuration pointing at `host` with an ephemeral callback port, a short
	/// callback timeout, a wait-free retry policy, and the response cache disabled.
	pub fn test_config(host: &str) -> BrokerConfig {
		BrokerConfig::builder(
			AppId::new(TEST_APP_ID).expect("Test application identifier should be valid."),
			TEST_APP_SECRET,
		)
		.host(Url::parse(host).expect("Test host should parse."))
		.redirect_uri(
			Url::parse("http://127.0.0.1:0/callback").expect("Test redirect URI should parse."),
		)
		.callback_timeout(Duration::seconds(5))
		.retry(RetryPolicy::without_wait(3))
		.disable_cache()
		.build()
		.expect("Test configuration should build.")
	}

	/// Constructs a [`TokenBroker`] backed by an in-memory secret store and a recording URL
	/// opener, using the reqwest transport.
	pub fn build_reqwest_test_broker(
		config: BrokerConfig,
	) -> (ReqwestTestBroker, Arc<MemoryStore>, Arc<RecordingOpener>) {
		let store_backend = Arc::new(MemoryStore::default());

		build_reqwest_test_broker_with_store(config, store_backend)
	}

	/// Same as [`build_reqwest_test_broker`] but reuses an existing store, emulating a second
	/// process run against the same persisted state.
	pub fn build_reqwest_test_broker_with_store(
		config: BrokerConfig,
		store_backend: Arc<MemoryStore>,
	) -> (ReqwestTestBroker, Arc<MemoryStore>, Arc<RecordingOpener>) {
		let store: Arc<dyn SecretStore> = store_backend.clone();
		let opener_backend = Arc::new(RecordingOpener::default());
		let opener: Arc<dyn UrlOpener> = opener_backend.clone();
		let broker = TokenBroker::with_http_client(
			config,
			store,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Test broker should build.")
		.with_opener(opener);

		(broker, store_backend, opener_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map as JsonMap, Value as JsonValue};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
#[cfg(feature = "cli")] use {clap as _, color_eyre as _, dotenvy as _, tracing_subscriber as _};
