//! HTTP seam for Open Platform calls.
//!
//! Every token endpoint and authenticated request goes through a [`TokenHttpClient`]. The broker
//! hands each call a fresh [`ResponseMetadataSlot`]; the transport fills it with the status,
//! `Retry-After` and `X-Tt-Logid` of the response so envelope checks, retries and debug logs can
//! use them even when the body is not JSON.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Request identifier header returned by the Open Platform; quote it when filing support tickets.
pub const LOG_ID_HEADER: &str = "x-tt-logid";

/// Transport used for Open Platform calls.
///
/// Swap in a custom implementation to route traffic through another HTTP stack or a test fake.
/// Handles must be `Send + Sync` and their futures `Send` so broker calls can run on any runtime
/// worker.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Error raised by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Per-call handle bound to one [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Returns a handle that writes response metadata into `slot`.
	///
	/// The handle clears the slot before sending and stores fresh metadata as soon as a response
	/// arrives, whatever its status.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Response facts kept alongside the decoded body.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// Transport status code.
	pub status: Option<u16>,
	/// `Retry-After` hint as a relative wait.
	pub retry_after: Option<Duration>,
	/// Value of the `X-Tt-Logid` response header.
	pub log_id: Option<String>,
}

/// Shared cell through which a transport handle reports [`ResponseMetadata`] for one call.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Replaces the recorded metadata.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Removes and returns the recorded metadata.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Default transport built on a shared [`ReqwestClient`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Uses `client` for all Open Platform calls, keeping its proxy and TLS settings.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = ReqwestHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ReqwestHandle { client: self.0.clone(), slot }
	}
}

/// Per-call reqwest handle returned by [`ReqwestHttpClient::with_metadata`].
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHandle {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ReqwestHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let request: reqwest::Request = request.try_into().map_err(Box::new)?;
			let response = self.client.execute(request).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().clone();

			self.slot.store(metadata_of(status.as_u16(), &headers));

			let body = response.bytes().await.map_err(Box::new)?;
			let mut out = HttpResponse::new(body.to_vec());

			*out.status_mut() = status;
			*out.headers_mut() = headers;

			Ok(out)
		})
	}
}

#[cfg(feature = "reqwest")]
fn metadata_of(status: u16, headers: &HeaderMap) -> ResponseMetadata {
	ResponseMetadata {
		status: Some(status),
		retry_after: parse_retry_after(headers),
		log_id: headers.get(LOG_ID_HEADER).and_then(|v| v.to_str().ok()).map(ToOwned::to_owned),
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}

	let wait = OffsetDateTime::parse(raw, &Rfc2822).ok()? - OffsetDateTime::now_utc();

	wait.is_positive().then_some(wait)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use reqwest::header::HeaderValue;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(7)));
	}

	#[test]
	fn retry_after_ignores_past_dates_and_garbage() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));

		assert_eq!(parse_retry_after(&headers), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(parse_retry_after(&headers), None);
	}

	#[test]
	fn metadata_captures_log_id_and_status() {
		let mut headers = HeaderMap::new();

		headers.insert(LOG_ID_HEADER, HeaderValue::from_static("20251110-feishu"));
		headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));

		let meta = metadata_of(429, &headers);

		assert_eq!(meta.status, Some(429));
		assert_eq!(meta.retry_after, Some(Duration::seconds(3)));
		assert_eq!(meta.log_id.as_deref(), Some("20251110-feishu"));
		assert!(metadata_of(200, &HeaderMap::new()).log_id.is_none());
	}

	#[test]
	fn metadata_slot_take_clears_value() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata {
			status: Some(200),
			retry_after: None,
			log_id: Some("20240101-abc".into()),
		});

		let meta = slot.take().expect("Stored metadata should be returned.");

		assert_eq!(meta.log_id.as_deref(), Some("20240101-abc"));
		assert!(slot.take().is_none());
	}
}
