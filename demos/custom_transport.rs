//! Demonstrates registering a custom HTTP client and mapper that emit non-reqwest errors.
//!
//! 1. Implement [`TokenHttpClient`] so the transport records [`ResponseMetadata`] via the provided
//!    [`ResponseMetadataSlot`], including the `X-Tt-Logid` value.
//! 2. Provide a [`TransportErrorMapper`] that understands both the transport error type and the
//!    captured metadata.
//! 3. Pass both to [`TokenBroker::with_http_client`].

// std
use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::Arc,
};
// crates.io
use color_eyre::Result;
use url::Url;
// self
use feishu_broker::{
	api::{
		TransportErrorMapper,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse},
	},
	auth::AppId,
	config::BrokerConfig,
	error::{Error, TransportError},
	flows::TokenBroker,
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::FlowKind,
	retry::RetryPolicy,
	store::{MemoryStore, SecretStore},
};

type MockBroker = TokenBroker<MockHttpClient, MockTransportErrorMapper>;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let store: Arc<dyn SecretStore> = Arc::new(MemoryStore::default());
	let config = BrokerConfig::builder(AppId::new("cli_demo")?, "demo-secret")
		.host(Url::parse("https://open.feishu.example")?)
		.retry(RetryPolicy::without_wait(2))
		.disable_cache()
		.build()?;
	let broker = MockBroker::with_http_client(
		config.clone(),
		Arc::clone(&store),
		MockHttpClient::success(),
		MockTransportErrorMapper,
	)?;
	let tenant = broker.get_tenant_token().await?;

	println!("Tenant token issued by the mock transport: {}.", tenant.value());

	let failing_broker = MockBroker::with_http_client(
		config.clone(),
		Arc::clone(&store),
		MockHttpClient { behavior: MockBehavior::TransportError(MockTransportError::DnsFailure {
			host: "open.feishu.example",
		}) },
		MockTransportErrorMapper,
	)?;

	match failing_broker.get_tenant_token().await {
		Ok(_) => println!("Mock transport unexpectedly succeeded."),
		Err(e) => println!("Transport error mapped by the broker: {e}."),
	}

	let rejecting_broker = MockBroker::with_http_client(
		config,
		store,
		MockHttpClient { behavior: MockBehavior::Rejected },
		MockTransportErrorMapper,
	)?;

	match rejecting_broker.get_app_token().await {
		Ok(_) => println!("Mock transport unexpectedly produced a token."),
		Err(e) => println!("Application error surfaced with code {:?}: {e}.", e.api_code()),
	}

	Ok(())
}

#[derive(Clone, Debug)]
enum MockTransportError {
	DnsFailure { host: &'static str },
}
impl Display for MockTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::DnsFailure { host } => write!(f, "DNS lookup failed for {host}"),
		}
	}
}
impl StdError for MockTransportError {}

#[derive(Clone)]
enum MockBehavior {
	Success,
	TransportError(MockTransportError),
	Rejected,
}

#[derive(Clone)]
struct MockHttpClient {
	behavior: MockBehavior,
}
impl MockHttpClient {
	fn success() -> Self {
		Self { behavior: MockBehavior::Success }
	}
}
impl TokenHttpClient for MockHttpClient {
	type Handle = MockHttpHandle;
	type TransportError = MockTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		MockHttpHandle { slot, behavior: self.behavior.clone() }
	}
}

struct MockHttpHandle {
	slot: ResponseMetadataSlot,
	behavior: MockBehavior,
}
impl<'a> AsyncHttpClient<'a> for MockHttpHandle {
	type Error = HttpClientError<MockTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, _request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();
		let behavior = self.behavior.clone();

		Box::pin(async move {
			slot.take();

			let body: &[u8] = match behavior {
				MockBehavior::Success =>
					br#"{"code":0,"msg":"ok","tenant_access_token":"t-mock","expire":7200}"#,
				MockBehavior::Rejected => br#"{"code":10003,"msg":"invalid param"}"#,
				MockBehavior::TransportError(error) => {
					// The oauth2 crate keeps the `Reqwest` variant name for any boxed transport error.
					return Err(HttpClientError::Reqwest(Box::new(error)));
				},
			};

			slot.store(ResponseMetadata {
				status: Some(200),
				retry_after: None,
				log_id: Some("20240101000000mock".into()),
			});

			Ok(HttpResponse::new(body.to_vec()))
		})
	}
}

#[derive(Clone, Default)]
struct MockTransportErrorMapper;
impl TransportErrorMapper<MockTransportError> for MockTransportErrorMapper {
	fn map_transport_error(
		&self,
		flow: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<MockTransportError>,
	) -> Error {
		let log_id = metadata.and_then(|meta| meta.log_id.as_deref()).unwrap_or("-");
		let message = match error {
			HttpClientError::Reqwest(inner) => format!("{flow} flow failed: {inner} (log id {log_id})"),
			HttpClientError::Other(text) => format!("{flow} flow failed: {text}"),
			_ => format!("{flow} flow failed"),
		};

		TransportError::Other { message }.into()
	}
}
