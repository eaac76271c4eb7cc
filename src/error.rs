//! Broker-level error types shared across flows, stores, and the callback listener.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// No usable user credential is cached; run the interactive authorization flow.
	#[error("User authorization is required: {reason}.")]
	NeedsAuthorization {
		/// Broker-supplied reason string.
		reason: String,
	},
	/// Upstream reported a non-zero application status code.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Upstream answered with a non-200 transport status and no application status code.
	#[error("Upstream returned HTTP {status} without an application status code.")]
	Http {
		/// HTTP status code.
		status: u16,
		/// Truncated response body for diagnostics.
		body: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Response payload was missing fields or carried unexpected types.
	#[error("Response payload could not be decoded.")]
	Decode {
		/// Structured decoding failure, including the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Secret store or response cache failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Authorization callback failed, timed out, or was cancelled.
	#[error(transparent)]
	Callback(#[from] crate::callback::CallbackError),
}
impl Error {
	/// Returns `true` when the caller should run the interactive authorization flow.
	pub fn is_needs_authorization(&self) -> bool {
		matches!(self, Self::NeedsAuthorization { .. })
	}

	/// Returns `true` for failures the low-level request primitive may retry.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Api(_) | Self::Http { .. } | Self::Decode { .. } | Self::Transport(_))
	}

	/// Upstream backoff hint attached to the failure, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Http { retry_after, .. } => *retry_after,
			_ => None,
		}
	}

	/// Application status code carried by [`Error::Api`].
	pub fn api_code(&self) -> Option<i64> {
		match self {
			Self::Api(api) => Some(api.code),
			_ => None,
		}
	}
}

/// Application-level failure reported inside a response envelope.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Request failed: code={code}, msg={msg}.")]
pub struct ApiError {
	/// Application status code (`code` or `StatusCode` field).
	pub code: i64,
	/// Upstream message (`msg` field), empty when absent.
	pub msg: String,
}
impl ApiError {
	/// Code used when a successful transport response carries no application status code.
	pub const MISSING_CODE: i64 = -1;

	/// Creates an error for the provided code and message.
	pub fn new(code: i64, msg: impl Into<String>) -> Self {
		Self { code, msg: msg.into() }
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured or requested URL cannot be parsed.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Which URL failed validation.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A configured URL uses a scheme the broker cannot serve.
	#[error("The {field} URL must use {expected}: {url}.")]
	UnsupportedScheme {
		/// Which URL failed validation.
		field: &'static str,
		/// Accepted scheme(s).
		expected: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// The redirect URI has no host the callback listener can bind to.
	#[error("Redirect URI has no host: {url}.")]
	MissingRedirectHost {
		/// URL that failed validation.
		url: String,
	},
	/// Caller-supplied header name or value is invalid.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Application credentials are malformed.
	#[error("Application identifier is invalid.")]
	InvalidAppId(#[from] crate::auth::IdentifierError),
	/// The application secret is empty.
	#[error("Application secret cannot be empty.")]
	EmptyAppSecret,
	/// A required environment variable is unset.
	#[error("Environment variable `{name}` is not set.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds an unparsable value.
	#[error("Environment variable `{name}` has an invalid value: {value}.")]
	InvalidEnv {
		/// Variable name.
		name: &'static str,
		/// Raw value.
		value: String,
	},
	/// User credential could not be built from the token payload.
	#[error("Unable to build user credential.")]
	CredentialBuild(#[from] crate::auth::UserCredentialBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the upstream API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the upstream API.")]
	Io(#[from] std::io::Error),
	/// Transport-specific failure that only carries a message.
	#[error("HTTP client error occurred while calling the upstream API: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
