//! The [`TokenBroker`] and the flows it drives.
//!
//! Operations are split by credential kind: [`tenant`] covers the application-level bearers and
//! the JSAPI ticket, [`user`] the redirect authorization and persisted user credential, and
//! [`request`] the low-level and authenticated request primitives every other flow builds on.

pub mod request;
pub mod tenant;
pub mod user;

// crates.io
use oauth2::{AsyncHttpClient, HttpRequest};
// self
use crate::{
	_prelude::*,
	api::{RawResponse, TransportErrorMapper},
	auth::{TenantCredential, TokenSecret, UserCredential},
	browser::{SystemOpener, UrlOpener},
	cache::ResponseCache,
	config::BrokerConfig,
	http::{ResponseMetadataSlot, TokenHttpClient},
	obs::{self, FlowKind},
	store::SecretStore,
};
#[cfg(feature = "reqwest")]
use crate::{api::ReqwestTransportErrorMapper, http::ReqwestHttpClient};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenBroker = TokenBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Acquires, caches, and persists Open Platform credentials for one application.
///
/// Tenant and app bearers live in memory for the lifetime of the broker. The user credential is
/// read from the [`SecretStore`] on first use, replaced after every successful exchange or
/// refresh, and cleared only by [`TokenBroker::reset_user_token`].
pub struct TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Validated configuration.
	pub config: BrokerConfig,
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Backend persisting the user credential.
	pub store: Arc<dyn SecretStore>,
	/// Launcher for the authorization page.
	pub opener: Arc<dyn UrlOpener>,
	cache: Option<ResponseCache>,
	tenant: Mutex<Option<TenantCredential>>,
	app: Mutex<Option<TokenSecret>>,
	user: Mutex<UserSlot>,
}
impl<C, M> TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	///
	/// Fails when the configured response cache directory cannot be created.
	pub fn with_http_client(
		config: BrokerConfig,
		store: Arc<dyn SecretStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let cache = config.open_cache()?;

		Ok(Self {
			config,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			opener: Arc::new(SystemOpener),
			cache,
			tenant: Mutex::default(),
			app: Mutex::default(),
			user: Mutex::default(),
		})
	}

	/// Replaces the URL opener used by [`TokenBroker::interactive_authorize`].
	pub fn with_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
		self.opener = opener;

		self
	}

	/// Response cache in use, if enabled.
	pub fn response_cache(&self) -> Option<&ResponseCache> {
		self.cache.as_ref()
	}

	/// Sends one request and captures the raw response plus transport metadata.
	pub(crate) async fn execute(
		&self,
		kind: FlowKind,
		url: &Url,
		request: HttpRequest,
	) -> Result<RawResponse> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let method = request.method().to_string();
		let response = match handle.call(request).await {
			Ok(response) => response,
			Err(e) => {
				let meta = slot.take();

				obs::debug_exchange(kind, &method, url, meta.as_ref());

				return Err(self.transport_mapper.map_transport_error(kind, meta.as_ref(), e));
			},
		};
		let metadata = slot.take();

		obs::debug_exchange(kind, &method, url, metadata.as_ref());

		Ok(RawResponse {
			status: response.status().as_u16(),
			body: response.into_body(),
			metadata,
		})
	}
}
#[cfg(feature = "reqwest")]
impl TokenBroker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest-backed transport.
	pub fn new(config: BrokerConfig, store: Arc<dyn SecretStore>) -> Result<Self> {
		Self::with_http_client(
			config,
			store,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Debug for TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBroker")
			.field("app_id", &self.config.app_id)
			.field("host", &self.config.host.as_str())
			.field("cache_enabled", &self.cache.is_some())
			.field("tenant_token_held", &self.tenant.lock().is_some())
			.field("user_token_held", &self.user.lock().credential.is_some())
			.finish()
	}
}

/// In-memory view of the persisted user credential.
#[derive(Debug, Default)]
struct UserSlot {
	loaded: bool,
	credential: Option<UserCredential>,
}
