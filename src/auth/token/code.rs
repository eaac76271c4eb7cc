//! Single-use authorization code delivered by the redirect callback.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Authorization code minted by the consent page.
///
/// Not `Clone`; the exchange consumes the value.
#[derive(PartialEq, Eq)]
pub struct AuthorizationCode(TokenSecret);
impl AuthorizationCode {
	/// Wraps a code received from the callback.
	pub fn new(value: impl Into<String>) -> Self {
		Self(TokenSecret::new(value))
	}

	/// Consumes the code, returning the raw secret for the exchange request.
	pub fn into_secret(self) -> TokenSecret {
		self.0
	}
}
impl Debug for AuthorizationCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("AuthorizationCode(<redacted>)")
	}
}
