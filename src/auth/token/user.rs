//! Persisted user credential, its lifecycle helpers, and builders.

// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::{
	_prelude::*,
	auth::{OpenId, TokenSecret},
};

/// Margin subtracted from the server-declared lifetime when stamping `expires_at`.
pub const EXPIRY_SAFETY_MARGIN: Duration = Duration::seconds(5);

/// Lifecycle status for a user credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is currently valid.
	Active,
	/// Token reached its `expires_at` instant.
	Expired,
}

/// Errors produced by [`UserCredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum UserCredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the server-declared lifetime is zero or negative.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}

/// User-level bearer obtained through the redirect authorization flow.
///
/// The JSON form is `{access_token, refresh_token, expires_in, expires_at, ...}` where every
/// field of the upstream payload the broker does not model (`name`, `open_id`,
/// `refresh_expires_in`, …) is kept in [`extra`](Self::extra) and written back untouched.
/// `expires_at` is a unix timestamp; fractional values written by other tools are accepted.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserCredential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the server issued one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Server-declared lifetime in seconds.
	#[serde(default)]
	pub expires_in: i64,
	/// Issue instant plus `expires_in` minus [`EXPIRY_SAFETY_MARGIN`].
	#[serde(with = "unix_seconds")]
	pub expires_at: OffsetDateTime,
	/// Passthrough fields from the token payload.
	#[serde(flatten)]
	pub extra: JsonMap<String, JsonValue>,
}
impl UserCredential {
	/// Returns a builder for constructing credentials.
	pub fn builder() -> UserCredentialBuilder {
		UserCredentialBuilder::default()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant >= self.expires_at { TokenStatus::Expired } else { TokenStatus::Active }
	}

	/// Returns `true` if the credential has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Returns `true` if the credential is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if a non-empty refresh token is available.
	pub fn has_refresh_token(&self) -> bool {
		self.refresh_token.as_ref().is_some_and(|secret| !secret.is_empty())
	}

	/// User display name from the passthrough payload.
	pub fn name(&self) -> Option<&str> {
		self.extra.get("name").and_then(JsonValue::as_str)
	}

	/// Per-application user identifier from the passthrough payload.
	pub fn open_id(&self) -> Option<OpenId> {
		self.extra.get("open_id").and_then(JsonValue::as_str).and_then(|raw| OpenId::new(raw).ok())
	}
}
impl Debug for UserCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UserCredential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("expires_at", &self.expires_at)
			.field("extra_fields", &self.extra.len())
			.finish()
	}
}

/// Builder for [`UserCredential`].
#[derive(Clone, Debug, Default)]
pub struct UserCredentialBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<i64>,
	extra: JsonMap<String, JsonValue>,
}
impl UserCredentialBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issue instant used with `expires_in` (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant, bypassing the safety margin.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the server-declared lifetime in seconds.
	pub fn expires_in(mut self, seconds: i64) -> Self {
		self.expires_in = Some(seconds);

		self
	}

	/// Adds a passthrough field.
	pub fn extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
		self.extra.insert(key.into(), value.into());

		self
	}

	/// Consumes the builder and produces a [`UserCredential`].
	pub fn build(self) -> Result<UserCredential, UserCredentialBuilderError> {
		let access_token =
			self.access_token.ok_or(UserCredentialBuilderError::MissingAccessToken)?;
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(seconds)) if seconds <= 0 =>
				return Err(UserCredentialBuilderError::NonPositiveExpiresIn),
			(None, Some(seconds)) => {
				let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);

				issued_at + Duration::seconds(seconds) - EXPIRY_SAFETY_MARGIN
			},
			(None, None) => return Err(UserCredentialBuilderError::MissingExpiry),
		};
		let mut extra = self.extra;

		extra.remove("expires_at");

		Ok(UserCredential {
			access_token,
			refresh_token: self.refresh_token,
			expires_in: self.expires_in.unwrap_or_default(),
			expires_at,
			extra,
		})
	}
}

/// `data` object returned by the code exchange and refresh endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct UserTokenGrant {
	/// Access token value.
	pub access_token: String,
	/// Refresh token value.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Lifetime in seconds.
	pub expires_in: i64,
	/// Remaining payload fields.
	#[serde(flatten)]
	pub extra: JsonMap<String, JsonValue>,
}
impl UserTokenGrant {
	/// Stamps `expires_at` relative to `issued_at` and produces the persisted credential.
	pub fn into_credential(
		self,
		issued_at: OffsetDateTime,
	) -> Result<UserCredential, UserCredentialBuilderError> {
		let mut builder = UserCredential::builder()
			.access_token(self.access_token)
			.issued_at(issued_at)
			.expires_in(self.expires_in);

		if let Some(refresh) = self.refresh_token.filter(|value| !value.is_empty()) {
			builder = builder.refresh_token(refresh);
		}

		builder.extra = self.extra;

		builder.build()
	}
}

mod unix_seconds {
	// self
	use super::*;

	pub(super) fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.unix_timestamp())
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
	where
		D: Deserializer<'de>,
	{
		let seconds = f64::deserialize(deserializer)?;

		if !seconds.is_finite() {
			return Err(D::Error::custom("expires_at must be a finite unix timestamp"));
		}

		OffsetDateTime::from_unix_timestamp(seconds.floor() as i64).map_err(D::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn builder_applies_safety_margin() {
		let credential = UserCredential::builder()
			.access_token("u-access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(7140)
			.build()
			.expect("Builder should accept a relative expiry.");

		assert_eq!(credential.expires_at, macros::datetime!(2025-01-01 01:58:55 UTC));
		assert_eq!(credential.expires_in, 7140);
	}

	#[test]
	fn builder_rejects_missing_fields() {
		assert_eq!(
			UserCredential::builder().expires_in(60).build().expect_err("Access token required."),
			UserCredentialBuilderError::MissingAccessToken
		);
		assert_eq!(
			UserCredential::builder().access_token("t").build().expect_err("Expiry required."),
			UserCredentialBuilderError::MissingExpiry
		);
		assert_eq!(
			UserCredential::builder()
				.access_token("t")
				.expires_in(0)
				.build()
				.expect_err("Zero lifetime must be rejected."),
			UserCredentialBuilderError::NonPositiveExpiresIn
		);
	}

	#[test]
	fn status_flips_at_expiry_instant() {
		let credential = UserCredential::builder()
			.access_token("t")
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Builder should accept an absolute expiry.");

		assert_eq!(credential.status_at(macros::datetime!(2025-01-01 00:59 UTC)), TokenStatus::Active);
		assert_eq!(credential.status_at(macros::datetime!(2025-01-01 01:00 UTC)), TokenStatus::Expired);
	}

	#[test]
	fn snapshot_accepts_fractional_expiry_and_keeps_passthrough_fields() {
		let raw = r#"{
			"access_token": "u-Q7JW",
			"refresh_token": "ur-oQ0m",
			"token_type": "Bearer",
			"expires_in": 7140,
			"expires_at": 1735693135.918,
			"name": "zhangsan",
			"open_id": "ou_caecc734",
			"refresh_expires_in": 2591940
		}"#;
		let credential: UserCredential =
			serde_json::from_str(raw).expect("Snapshot should deserialize.");

		assert_eq!(credential.access_token.expose(), "u-Q7JW");
		assert_eq!(credential.expires_at.unix_timestamp(), 1735693135);
		assert_eq!(credential.name(), Some("zhangsan"));
		assert_eq!(credential.open_id().map(String::from), Some("ou_caecc734".into()));
		assert!(credential.has_refresh_token());

		let written = serde_json::to_value(&credential).expect("Snapshot should serialize.");

		assert_eq!(written["expires_at"], 1735693135);
		assert_eq!(written["token_type"], "Bearer");
		assert_eq!(written["refresh_expires_in"], 2591940);
	}

	#[test]
	fn minimal_snapshot_deserializes() {
		let credential: UserCredential =
			serde_json::from_str(r#"{"access_token":"T","expires_at":10}"#)
				.expect("Minimal snapshot should deserialize.");

		assert!(credential.refresh_token.is_none());
		assert_eq!(credential.expires_in, 0);
		assert!(credential.is_expired());
	}

	#[test]
	fn grant_drops_server_supplied_expires_at() {
		let grant: UserTokenGrant = serde_json::from_str(
			r#"{"access_token":"u-1","refresh_token":"","expires_in":60,"expires_at":1,"sid":"x"}"#,
		)
		.expect("Grant should deserialize.");
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let credential = grant.into_credential(issued).expect("Grant should convert.");

		assert_eq!(credential.expires_at, issued + Duration::seconds(55));
		assert!(!credential.has_refresh_token());
		assert!(credential.extra.contains_key("sid"));
		assert!(!credential.extra.contains_key("expires_at"));
	}
}
