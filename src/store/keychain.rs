//! OS keychain-backed [`SecretStore`] (macOS Keychain, Windows Credential Manager, Secret
//! Service on Linux).

// crates.io
use keyring::{Entry, Error as KeyringError};
// self
use crate::{
	_prelude::*,
	auth::UserCredential,
	store::{self, SecretStore, StoreError, StoreFuture},
};

/// Keychain service name used by default.
pub const DEFAULT_SERVICE: &str = "feishu";
/// Keychain entry name used by default.
pub const DEFAULT_ENTRY: &str = "user_access_token_data";

/// Stores the credential JSON as a single keychain password.
#[derive(Clone, Debug)]
pub struct KeyringStore {
	service: String,
	entry: String,
}
impl KeyringStore {
	/// Targets a custom service/entry pair.
	pub fn new(service: impl Into<String>, entry: impl Into<String>) -> Self {
		Self { service: service.into(), entry: entry.into() }
	}

	fn entry(&self) -> Result<Entry, StoreError> {
		Entry::new(&self.service, &self.entry).map_err(|e| self.backend_error("open", e))
	}

	fn backend_error(&self, action: &str, e: KeyringError) -> StoreError {
		StoreError::Backend {
			message: format!("Failed to {action} keychain entry {}/{}: {e}", self.service, self.entry),
		}
	}

	fn load_now(&self) -> Result<Option<UserCredential>, StoreError> {
		match self.entry()?.get_password() {
			Ok(raw) => Ok(store::decode_snapshot(&format!("keychain {}", self.entry), &raw)),
			Err(KeyringError::NoEntry) => Ok(None),
			Err(e) => Err(self.backend_error("read", e)),
		}
	}

	fn save_now(&self, credential: &UserCredential) -> Result<(), StoreError> {
		let serialized = store::encode_snapshot(credential)?;

		self.entry()?.set_password(&serialized).map_err(|e| self.backend_error("write", e))
	}

	fn clear_now(&self) -> Result<(), StoreError> {
		match self.entry()?.delete_credential() {
			Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
			Err(e) => Err(self.backend_error("delete", e)),
		}
	}
}
impl Default for KeyringStore {
	fn default() -> Self {
		Self::new(DEFAULT_SERVICE, DEFAULT_ENTRY)
	}
}
impl SecretStore for KeyringStore {
	fn load(&self) -> StoreFuture<'_, Option<UserCredential>> {
		Box::pin(async move { self.load_now() })
	}

	fn save(&self, credential: UserCredential) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.save_now(&credential) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.clear_now() })
	}
}
