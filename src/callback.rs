//! One-shot local HTTP listener receiving the authorization redirect.
//!
//! [`CallbackListener::bind`] claims the redirect address before the browser is opened;
//! [`CallbackListener::spawn`] serves the redirect path on a background task until the first
//! request to it resolves a single-slot channel that [`PendingCallback::wait`] awaits with a
//! timeout. Requests to any other path get a 404 and leave the slot untouched.

// std
use std::{
	io,
	net::{IpAddr, Ipv4Addr, SocketAddr},
};
// crates.io
use axum::{
	Router,
	extract::{Query, State},
	http::StatusCode,
	routing::get,
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
// self
use crate::{_prelude::*, auth::AuthorizationCode, error::ConfigError, obs};

type Outcome = Result<CallbackParams, CallbackError>;

/// Failures of the callback listener and of the redirect it receives.
#[derive(Debug, ThisError)]
pub enum CallbackError {
	/// The redirect address could not be bound.
	#[error("Failed to bind the callback listener on {addr}.")]
	Bind {
		/// Address requested.
		addr: String,
		/// Underlying socket failure.
		#[source]
		source: io::Error,
	},
	/// The redirect lacked a required query parameter or carried an empty one.
	#[error("Callback is missing the `{name}` query parameter.")]
	MissingParameter {
		/// Parameter name.
		name: &'static str,
	},
	/// The `state` value does not match the one issued with the authorize URL.
	#[error("Callback state does not match the issued authorization request.")]
	StateMismatch,
	/// No callback arrived before the deadline.
	#[error("No authorization callback arrived within {after}.")]
	TimedOut {
		/// Deadline that elapsed.
		after: Duration,
	},
	/// The listener was cancelled or stopped before resolving.
	#[error("Authorization callback was cancelled.")]
	Cancelled,
	/// Socket failure while setting up the listener.
	#[error("Callback listener I/O failure.")]
	Io(#[from] io::Error),
}

/// Parameters delivered by a well-formed callback.
#[derive(Debug)]
pub struct CallbackParams {
	/// Single-use authorization code.
	pub code: AuthorizationCode,
	/// Opaque value echoed from the authorize URL.
	pub state: String,
}

/// A bound, not yet serving, callback listener.
#[derive(Debug)]
pub struct CallbackListener {
	listener: TcpListener,
	redirect_uri: Url,
}
impl CallbackListener {
	/// Binds the host and port of `redirect_uri`.
	///
	/// `localhost` binds the IPv4 loopback. Port `0` picks an ephemeral port, reflected by
	/// [`CallbackListener::redirect_uri`].
	pub async fn bind(redirect_uri: &Url) -> Result<Self> {
		let addr = socket_addr(redirect_uri)?;
		let listener = TcpListener::bind(addr)
			.await
			.map_err(|source| CallbackError::Bind { addr: addr.to_string(), source })?;
		let local = listener.local_addr().map_err(CallbackError::Io)?;
		let mut redirect_uri = redirect_uri.clone();

		if redirect_uri.port_or_known_default() != Some(local.port()) {
			redirect_uri.set_port(Some(local.port())).map_err(|_| {
				ConfigError::MissingRedirectHost { url: redirect_uri.to_string() }
			})?;
		}

		Ok(Self { listener, redirect_uri })
	}

	/// Redirect URI to embed in the authorize URL, with the bound port.
	pub fn redirect_uri(&self) -> &Url {
		&self.redirect_uri
	}

	/// Starts serving in the background until the redirect path receives one request.
	pub fn spawn(self) -> PendingCallback {
		let (tx, rx) = oneshot::channel();
		let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
		let Self { listener, redirect_uri } = self;
		let slot = RedirectSlot(Arc::new(Mutex::new(Some((tx, shutdown_tx)))));
		let app = Router::new()
			.route(redirect_uri.path(), get(receive_redirect))
			.fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
			.with_state(slot);
		let task = tokio::spawn(async move {
			let served = axum::serve(listener, app)
				.with_graceful_shutdown(async move {
					let _ = shutdown_rx.await;
				})
				.await;

			if let Err(e) = served {
				obs::warn_callback_serve_failed(&e);
			}
		});

		PendingCallback { rx, task }
	}
}

/// Handle to a listener waiting for its redirect.
///
/// Dropping the handle aborts the listener.
#[derive(Debug)]
pub struct PendingCallback {
	rx: oneshot::Receiver<Outcome>,
	task: JoinHandle<()>,
}
impl PendingCallback {
	/// Waits for the callback, failing with [`CallbackError::TimedOut`] after `timeout`.
	pub async fn wait(mut self, timeout: Duration) -> Outcome {
		match tokio::time::timeout(timeout.unsigned_abs(), &mut self.rx).await {
			Ok(Ok(outcome)) => outcome,
			Ok(Err(_)) => Err(CallbackError::Cancelled),
			Err(_) => Err(CallbackError::TimedOut { after: timeout }),
		}
	}

	/// Stops the listener without waiting.
	pub fn cancel(self) {
		self.task.abort();
	}
}
impl Drop for PendingCallback {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Result sender plus shutdown trigger, taken by the first redirect request.
#[derive(Clone)]
struct RedirectSlot(Arc<Mutex<Option<(oneshot::Sender<Outcome>, oneshot::Sender<()>)>>>);

#[derive(Debug, Deserialize)]
struct RedirectQuery {
	code: Option<String>,
	state: Option<String>,
}
impl RedirectQuery {
	fn into_params(self) -> Outcome {
		let code = non_empty(self.code).ok_or(CallbackError::MissingParameter { name: "code" })?;
		let state =
			non_empty(self.state).ok_or(CallbackError::MissingParameter { name: "state" })?;

		Ok(CallbackParams { code: AuthorizationCode::new(code), state })
	}
}

async fn receive_redirect(
	State(slot): State<RedirectSlot>,
	Query(query): Query<RedirectQuery>,
) -> (StatusCode, String) {
	let outcome = query.into_params();
	let response = match &outcome {
		Ok(params) => (StatusCode::OK, format!("Received access_token, state: {}", params.state)),
		Err(e) => (StatusCode::BAD_REQUEST, e.to_string()),
	};

	// The result is delivered before the response is written.
	if let Some((tx, shutdown)) = slot.0.lock().take() {
		let _ = tx.send(outcome);
		let _ = shutdown.send(());
	}

	response
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|value| !value.is_empty())
}

fn socket_addr(redirect_uri: &Url) -> Result<SocketAddr> {
	let missing_host = || ConfigError::MissingRedirectHost { url: redirect_uri.to_string() };
	let host = redirect_uri.host_str().ok_or_else(missing_host)?;
	let ip = if host.eq_ignore_ascii_case("localhost") {
		IpAddr::V4(Ipv4Addr::LOCALHOST)
	} else {
		host.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.map_err(|_| missing_host())?
	};
	let port = redirect_uri.port_or_known_default().ok_or_else(missing_host)?;

	Ok(SocketAddr::new(ip, port))
}
