//! Storage contract and built-in backends for the persisted user credential.

pub mod file;
#[cfg(feature = "keyring")] pub mod keychain;
pub mod memory;

pub use file::FileStore;
#[cfg(feature = "keyring")] pub use keychain::KeyringStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::UserCredential};

/// Boxed future returned by [`SecretStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Backend holding the single persisted user credential.
pub trait SecretStore
where
	Self: Send + Sync,
{
	/// Loads the persisted credential, if present.
	///
	/// An unreadable snapshot loads as `None`.
	fn load(&self) -> StoreFuture<'_, Option<UserCredential>>;

	/// Persists or replaces the credential.
	fn save(&self, credential: UserCredential) -> StoreFuture<'_, ()>;

	/// Removes the persisted credential. Clearing an empty store succeeds.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`SecretStore`] implementations and the response cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Parses a persisted snapshot, logging and discarding unreadable values.
pub(crate) fn decode_snapshot(origin: &str, raw: &str) -> Option<UserCredential> {
	match serde_json::from_str(raw) {
		Ok(credential) => Some(credential),
		Err(e) => {
			crate::obs::warn_discarded_snapshot(origin, &e);

			None
		},
	}
}

/// Serializes a credential into its persisted JSON form.
pub(crate) fn encode_snapshot(credential: &UserCredential) -> Result<String, StoreError> {
	serde_json::to_string(credential).map_err(|e| StoreError::Serialization {
		message: format!("Failed to serialize user credential: {e}"),
	})
}
