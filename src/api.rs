//! Open Platform endpoints, request construction, and response envelope inspection.
//!
//! Every upstream call goes through [`inspect_envelope`]: the JSON body carries an application
//! status code (`code`, or `StatusCode` on some gateways) that decides success independently of
//! the transport status.

pub use oauth2;

// crates.io
use oauth2::{
	HttpClientError, HttpRequest,
	http::{
		self, HeaderName, HeaderValue, Method,
		header::{AUTHORIZATION, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ApiError, ConfigError, TransportError},
	http::ResponseMetadata,
	obs::FlowKind,
};

/// Tenant access token endpoint for self-built apps.
pub const TENANT_ACCESS_TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";
/// App access token endpoint for self-built apps.
pub const APP_ACCESS_TOKEN_PATH: &str = "/open-apis/auth/v3/app_access_token/internal";
/// Browser-facing authorization page.
pub const AUTHORIZE_PATH: &str = "/open-apis/authen/v1/index";
/// Authorization code exchange endpoint.
pub const USER_ACCESS_TOKEN_PATH: &str = "/open-apis/authen/v1/access_token";
/// User token refresh endpoint.
pub const REFRESH_ACCESS_TOKEN_PATH: &str = "/open-apis/authen/v1/refresh_access_token";
/// JSAPI ticket endpoint.
pub const JSAPI_TICKET_PATH: &str = "/open-apis/jssdk/ticket/get";

/// Content type sent with every JSON request.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

const ERROR_BODY_LIMIT: usize = 512;

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		flow: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		flow: FlowKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(flow, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unknown transport failure"),
		}
	}
}

/// Raw upstream response before envelope inspection.
#[derive(Clone, Debug)]
pub struct RawResponse {
	/// Transport status code.
	pub status: u16,
	/// Response body bytes.
	pub body: Vec<u8>,
	/// Metadata captured by the transport handle.
	pub metadata: Option<ResponseMetadata>,
}
impl RawResponse {
	/// Applies [`inspect_envelope`] to this response.
	pub fn into_envelope(self) -> Result<JsonValue> {
		let retry_after = self.metadata.as_ref().and_then(|meta| meta.retry_after);

		inspect_envelope(self.status, retry_after, &self.body)
	}
}

/// Decides whether a response succeeded and returns its decoded JSON object.
///
/// A body starting with `{` is decoded as JSON; anything else counts as an empty object.
/// The application code is taken from `code`, falling back to `StatusCode`. Code `0` is success
/// whatever the transport status; any other code is [`Error::Api`]. Without a code, a non-200
/// transport status is [`Error::Http`] and a 200 is [`Error::Api`] with
/// [`ApiError::MISSING_CODE`].
pub fn inspect_envelope(
	status: u16,
	retry_after: Option<Duration>,
	body: &[u8],
) -> Result<JsonValue> {
	let value = if body.first() == Some(&b'{') {
		let de = &mut serde_json::Deserializer::from_slice(body);

		serde_path_to_error::deserialize::<_, JsonValue>(de)
			.map_err(|source| Error::Decode { source })?
	} else {
		JsonValue::Object(JsonMap::new())
	};

	match application_code(&value) {
		Some(0) => Ok(value),
		Some(code) => Err(ApiError::new(code, message(&value)).into()),
		None if status != 200 =>
			Err(Error::Http { status, body: truncated_body(body), retry_after }),
		None => Err(ApiError::new(ApiError::MISSING_CODE, message(&value)).into()),
	}
}

/// Decodes a typed payload, reporting the JSON path of the first mismatch.
pub fn decode<T>(value: JsonValue) -> Result<T>
where
	T: DeserializeOwned,
{
	serde_path_to_error::deserialize(value).map_err(|source| Error::Decode { source })
}

/// Builds an upstream request carrying an optional JSON body.
///
/// Headers are applied in order, so later pairs replace earlier ones with the same name.
pub fn build_request(
	method: &str,
	url: &Url,
	headers: &[(String, String)],
	body: Option<&JsonValue>,
) -> Result<HttpRequest> {
	let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
		.map_err(|e| ConfigError::from(http::Error::from(e)))?;
	let payload = match body {
		Some(value) => serde_json::to_vec(value).map_err(|e| TransportError::Other {
			message: format!("failed to encode request body: {e}"),
		})?,
		None => Vec::new(),
	};
	let mut request = http::Request::builder()
		.method(method)
		.uri(url.as_str())
		.body(payload)
		.map_err(ConfigError::from)?;
	let header_map = request.headers_mut();

	if body.is_some() {
		header_map.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
	}

	for (name, value) in headers {
		let header_name = HeaderName::from_bytes(name.as_bytes())
			.map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;
		let header_value = HeaderValue::from_str(value)
			.map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;

		header_map.insert(header_name, header_value);
	}

	Ok(request)
}

/// Merges caller headers over the bearer and JSON content-type defaults.
///
/// Header names compare case-insensitively; caller values win.
pub fn authenticated_headers(
	bearer: &TokenSecret,
	caller: &[(String, String)],
) -> Vec<(String, String)> {
	let mut merged = vec![
		(AUTHORIZATION.as_str().to_owned(), bearer.bearer()),
		(CONTENT_TYPE.as_str().to_owned(), JSON_CONTENT_TYPE.to_owned()),
	];

	for (name, value) in caller {
		merged.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
		merged.push((name.clone(), value.clone()));
	}

	merged
}

/// Joins an endpoint path onto the configured host.
pub fn endpoint(host: &Url, path: &str) -> Result<Url> {
	host.join(path).map_err(|source| ConfigError::InvalidUrl { field: "endpoint", source }.into())
}

/// Body of the tenant token response.
#[derive(Clone, Debug, Deserialize)]
pub struct TenantTokenResponse {
	/// Tenant bearer.
	pub tenant_access_token: String,
	/// Declared lifetime in seconds.
	#[serde(default)]
	pub expire: Option<i64>,
}

/// Body of the app token response.
#[derive(Clone, Debug, Deserialize)]
pub struct AppTokenResponse {
	/// App bearer.
	pub app_access_token: String,
	/// Declared lifetime in seconds.
	#[serde(default)]
	pub expire: Option<i64>,
}

/// Generic `{ "data": … }` wrapper used by the authen and jssdk endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct DataEnvelope<T> {
	/// Payload.
	pub data: T,
}

/// `data` object of the JSAPI ticket response.
#[derive(Clone, Debug, Deserialize)]
pub struct TicketData {
	/// Ticket value.
	#[serde(default)]
	pub ticket: String,
	/// Declared lifetime in seconds.
	#[serde(default)]
	pub expire_in: Option<i64>,
}

fn application_code(value: &JsonValue) -> Option<i64> {
	let code = |key| value.get(key).and_then(JsonValue::as_i64);

	code("code")
		.filter(|c| *c != ApiError::MISSING_CODE)
		.or_else(|| code("StatusCode"))
		.filter(|c| *c != ApiError::MISSING_CODE)
}

fn message(value: &JsonValue) -> String {
	value.get("msg").and_then(JsonValue::as_str).unwrap_or_default().to_owned()
}

fn truncated_body(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);

	match text.char_indices().nth(ERROR_BODY_LIMIT) {
		Some((idx, _)) => format!("{}…", &text[..idx]),
		None => text.into_owned(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(flow: FlowKind, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransportError::Other {
			message: format!("request timed out during the {flow} flow"),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	match meta.and_then(|value| value.status) {
		Some(status) => TransportError::Other { message: format!("{message} (HTTP {status})") },
		None => TransportError::Other { message: message.to_string() },
	}
	.into()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn zero_code_succeeds_regardless_of_transport_status() {
		let value = inspect_envelope(400, None, br#"{"code":0,"data":{"x":1}}"#)
			.expect("Code 0 should be success.");

		assert_eq!(value["data"]["x"], 1);
	}

	#[test]
	fn non_zero_code_fails_with_transport_200() {
		let err = inspect_envelope(200, None, br#"{"code":99991663,"msg":"invalid app"}"#)
			.expect_err("Non-zero code should fail.");

		assert_eq!(err.api_code(), Some(99991663));
		assert!(err.to_string().contains("invalid app"));
	}

	#[test]
	fn status_code_field_is_a_fallback() {
		assert!(inspect_envelope(200, None, br#"{"StatusCode":0}"#).is_ok());

		let err = inspect_envelope(200, None, br#"{"StatusCode":19001}"#)
			.expect_err("Non-zero StatusCode should fail.");

		assert_eq!(err.api_code(), Some(19001));
	}

	#[test]
	fn missing_code_depends_on_transport_status() {
		let err = inspect_envelope(502, Some(Duration::seconds(3)), b"Bad Gateway")
			.expect_err("Non-JSON 502 should fail.");

		match err {
			Error::Http { status, body, retry_after } => {
				assert_eq!(status, 502);
				assert_eq!(body, "Bad Gateway");
				assert_eq!(retry_after, Some(Duration::seconds(3)));
			},
			other => panic!("Unexpected error: {other:?}."),
		}

		let err = inspect_envelope(200, None, b"").expect_err("Empty 200 should fail.");

		assert_eq!(err.api_code(), Some(ApiError::MISSING_CODE));
	}

	#[test]
	fn malformed_json_reports_decode_error() {
		let err = inspect_envelope(200, None, b"{\"code\":").expect_err("Truncated JSON should fail.");

		assert!(matches!(err, Error::Decode { .. }));
	}

	#[test]
	fn decode_reports_missing_field_path() {
		let err = decode::<DataEnvelope<TicketData>>(serde_json::json!({ "code": 0 }))
			.expect_err("Missing data should fail.");

		assert!(matches!(err, Error::Decode { .. }));
	}

	#[test]
	fn caller_headers_override_defaults_case_insensitively() {
		let bearer = TokenSecret::new("u-1");
		let merged = authenticated_headers(&bearer, &[(
			"content-type".into(),
			"text/plain".into(),
		)]);

		assert_eq!(merged.len(), 2);
		assert!(merged.iter().any(|(k, v)| k == "authorization" && v == "Bearer u-1"));
		assert!(merged.iter().any(|(k, v)| k == "content-type" && v == "text/plain"));
	}

	#[test]
	fn build_request_rejects_invalid_headers_and_methods() {
		let url = Url::parse("https://open.feishu.cn/open-apis/ping").expect("URL should parse.");
		let err = build_request("GET", &url, &[("bad header".into(), "v".into())], None)
			.expect_err("Header with a space should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidHeader { .. })));
		assert!(build_request("NOT A METHOD", &url, &[], None).is_err());

		let request = build_request("post", &url, &[], Some(&serde_json::json!({ "a": 1 })))
			.expect("Valid request should build.");

		assert_eq!(request.method(), Method::POST);
		assert_eq!(request.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);
		assert_eq!(request.body(), br#"{"a":1}"#);
	}

	#[test]
	fn endpoint_joins_absolute_paths() {
		let host = Url::parse("https://open.feishu.cn").expect("Host should parse.");
		let url = endpoint(&host, TENANT_ACCESS_TOKEN_PATH).expect("Endpoint should join.");

		assert_eq!(url.as_str(), "https://open.feishu.cn/open-apis/auth/v3/tenant_access_token/internal");
	}
}
