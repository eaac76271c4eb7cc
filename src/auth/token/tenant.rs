//! In-memory application and tenant credentials.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Application-wide bearer authenticating the app itself to the API.
///
/// Held in memory only and fetched fresh on each process run; `expire` is kept for diagnostics
/// but never consulted.
#[derive(Clone, Debug)]
pub struct TenantCredential {
	/// Bearer value (`tenant_access_token`).
	pub token: TokenSecret,
	/// Server-declared lifetime in seconds, when supplied.
	pub expire: Option<i64>,
	/// Instant the broker received the credential.
	pub fetched_at: OffsetDateTime,
}
impl TenantCredential {
	/// Wraps a freshly fetched tenant token.
	pub fn new(token: impl Into<String>, expire: Option<i64>) -> Self {
		Self { token: TokenSecret::new(token), expire, fetched_at: OffsetDateTime::now_utc() }
	}

	/// Raw bearer value. Callers must avoid logging this string.
	pub fn value(&self) -> &str {
		self.token.expose()
	}
}
