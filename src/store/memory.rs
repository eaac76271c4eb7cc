//! In-memory [`SecretStore`] for tests and throwaway sessions.

// self
use crate::{
	_prelude::*,
	auth::UserCredential,
	store::{SecretStore, StoreFuture},
};

/// Keeps the credential in-process; nothing survives the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<UserCredential>>>);
impl MemoryStore {
	/// Creates a store seeded with `credential`.
	pub fn with_credential(credential: UserCredential) -> Self {
		Self(Arc::new(RwLock::new(Some(credential))))
	}

	/// Returns a copy of the stored credential without going through the async contract.
	pub fn snapshot(&self) -> Option<UserCredential> {
		self.0.read().clone()
	}
}
impl SecretStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<UserCredential>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn save(&self, credential: UserCredential) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(credential);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			slot.write().take();

			Ok(())
		})
	}
}
