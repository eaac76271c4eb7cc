//! Low-level and authenticated request primitives.

// self
use crate::{
	_prelude::*,
	api::{self, TransportErrorMapper},
	cache::ResponseCache,
	flows::TokenBroker,
	http::TokenHttpClient,
	obs::{self, FlowKind},
};

impl<C, M> TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Sends a JSON request without the user bearer and inspects the response envelope.
	///
	/// Retryable failures are attempted again per [`BrokerConfig::retry`](crate::config::BrokerConfig::retry).
	pub async fn request(
		&self,
		method: &str,
		url: &Url,
		headers: &[(String, String)],
		body: Option<&JsonValue>,
	) -> Result<JsonValue> {
		obs::observe(
			FlowKind::Request,
			"request",
			self.send_with_retry(FlowKind::Request, method, url, headers, body),
		)
		.await
	}

	/// Sends a request carrying the user bearer and inspects the response envelope.
	///
	/// `query` pairs are appended to `url`; `headers` override the default `Authorization` and
	/// `Content-Type`. Successful `GET` responses go through the response cache. Fails with
	/// [`Error::NeedsAuthorization`] when no valid user credential is held; call
	/// [`TokenBroker::user_access_token`] first to authorize interactively.
	pub async fn authenticated_request(
		&self,
		method: &str,
		url: &Url,
		query: &[(String, String)],
		headers: &[(String, String)],
		body: Option<&JsonValue>,
	) -> Result<JsonValue> {
		const KIND: FlowKind = FlowKind::AuthenticatedRequest;

		obs::observe(KIND, "authenticated_request", async move {
			let user = self.get_user_token().await?;
			let mut url = url.clone();

			if !query.is_empty() {
				let mut pairs = url.query_pairs_mut();

				for (key, value) in query {
					pairs.append_pair(key, value);
				}
			}

			let headers = api::authenticated_headers(&user.access_token, headers);
			let cached = self
				.cache
				.as_ref()
				.filter(|_| method.eq_ignore_ascii_case("GET"))
				.map(|cache| (cache, ResponseCache::key(method, &url, body)));

			if let Some(hit) = cached.as_ref().and_then(|(cache, key)| cache.get(key)) {
				obs::debug_cache_hit(&url);

				return Ok(hit);
			}

			let request = api::build_request(method, &url, &headers, body)?;
			let value = self.execute(KIND, &url, request).await?.into_envelope()?;

			if let Some(Err(e)) = cached.as_ref().map(|(cache, key)| cache.put(key, &value)) {
				obs::warn_cache_write_failed(&url, &e);
			}

			Ok(value)
		})
		.await
	}

	/// Retried request primitive shared by the tenant, app, and ticket flows.
	pub(crate) async fn send_with_retry(
		&self,
		kind: FlowKind,
		method: &str,
		url: &Url,
		headers: &[(String, String)],
		body: Option<&JsonValue>,
	) -> Result<JsonValue> {
		self.config
			.retry
			.run(kind, move || async move {
				let request = api::build_request(method, url, headers, body)?;

				self.execute(kind, url, request).await?.into_envelope()
			})
			.await
	}
}
