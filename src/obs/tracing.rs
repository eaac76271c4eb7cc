// self
use crate::{_prelude::*, http::ResponseMetadata, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("feishu_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug event describing one upstream exchange.
pub fn debug_exchange(kind: FlowKind, method: &str, url: &Url, meta: Option<&ResponseMetadata>) {
	#[cfg(feature = "tracing")]
	{
		let status = meta.and_then(|m| m.status);
		let log_id = meta.and_then(|m| m.log_id.as_deref()).unwrap_or("-");

		tracing::debug!(flow = kind.as_str(), method, url = %url, ?status, log_id, "upstream exchange");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, method, url, meta);
	}
}

/// Emits a debug event when a response cache entry satisfies a request.
pub fn debug_cache_hit(url: &Url) {
	#[cfg(feature = "tracing")]
	tracing::debug!(url = %url, "served from response cache");
	#[cfg(not(feature = "tracing"))]
	let _ = url;
}

/// Emits a warning before the retry policy sleeps and tries again.
pub fn warn_retry(kind: FlowKind, attempt: u32, wait: Duration, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(flow = kind.as_str(), attempt, wait_ms = wait.whole_milliseconds() as u64, %error, "retrying request");
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, attempt, wait, error);
}

/// Emits a warning when a response could not be written to the cache.
pub fn warn_cache_write_failed(url: &Url, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(url = %url, %error, "failed to cache response");
	#[cfg(not(feature = "tracing"))]
	let _ = (url, error);
}

/// Emits a warning when a persisted snapshot cannot be decoded and is ignored.
pub fn warn_discarded_snapshot(origin: &str, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(origin, %error, "discarding unreadable user credential snapshot");
	#[cfg(not(feature = "tracing"))]
	let _ = (origin, error);
}

/// Emits a warning when the authorize URL could not be opened automatically.
pub fn warn_open_failed(url: &Url, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(url = %url, %error, "failed to open authorize URL; open it manually");
	#[cfg(not(feature = "tracing"))]
	let _ = (url, error);
}

/// Emits a warning when refreshing fails and the broker falls back to interactive authorization.
pub fn warn_refresh_fallback(error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(%error, "refreshing the user token failed; re-authorizing");
	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// Emits a warning when the callback listener stops serving with an I/O failure.
pub fn warn_callback_serve_failed(error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(%error, "authorization callback listener stopped");
	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// Emits an info event while the broker waits on the authorization callback.
pub fn info_awaiting_callback(url: &Url, redirect_uri: &Url) {
	#[cfg(feature = "tracing")]
	tracing::info!(authorize_url = %url, redirect_uri = %redirect_uri, "waiting for authorization callback");
	#[cfg(not(feature = "tracing"))]
	let _ = (url, redirect_uri);
}
