//! File-backed [`SecretStore`] for hosts without a usable keychain.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::UserCredential,
	store::{self, SecretStore, StoreError, StoreFuture},
};

/// Persists the credential as a JSON file, replacing it atomically on each save.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
}
impl FileStore {
	/// Opens a store at the provided path, creating parent directories on demand.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		Ok(Self { path })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_now(&self) -> Result<Option<UserCredential>, StoreError> {
		if !self.path.exists() {
			return Ok(None);
		}

		let raw = fs::read_to_string(&self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", self.path.display()),
		})?;

		if raw.trim().is_empty() {
			return Ok(None);
		}

		Ok(store::decode_snapshot(&self.path.display().to_string(), &raw))
	}

	fn save_now(&self, credential: &UserCredential) -> Result<(), StoreError> {
		let serialized = store::encode_snapshot(credential)?;

		write_atomically(&self.path, serialized.as_bytes())
	}

	fn clear_now(&self) -> Result<(), StoreError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StoreError::Backend {
				message: format!("Failed to remove {}: {e}", self.path.display()),
			}),
		}
	}
}
impl SecretStore for FileStore {
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

pub(crate) fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

/// Writes `contents` to a sibling temp file, syncs it, then renames it over `path`.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
	ensure_parent_exists(path)?;

	let mut tmp_path = path.to_path_buf();

	tmp_path.set_extension("tmp");

	{
		let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
			message: format!("Failed to create {}: {e}", tmp_path.display()),
		})?;

		file.write_all(contents).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp_path.display()),
		})?;
		file.sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp_path.display()),
		})?;
	}

	fs::rename(&tmp_path, path).map_err(|e| StoreError::Backend {
		message: format!("Failed to replace {}: {e}", path.display()),
	})
}
