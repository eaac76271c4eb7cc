//! On-disk cache for successful authenticated `GET` responses.

// std
use std::{
	fs,
	path::{Path, PathBuf},
};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, store::StoreError};

/// Directory name appended to the platform cache directory.
pub const CACHE_DIR_NAME: &str = "feishu-request-cache";
/// Default time-to-live for cached responses.
pub const DEFAULT_TTL: Duration = Duration::seconds(300);

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
	#[serde(with = "time::serde::timestamp")]
	stored_at: OffsetDateTime,
	body: JsonValue,
}

/// File-per-entry response cache keyed by a digest of the request.
#[derive(Clone, Debug)]
pub struct ResponseCache {
	dir: PathBuf,
	ttl: Duration,
}
impl ResponseCache {
	/// Opens (creating on demand) a cache rooted at `dir`.
	pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, StoreError> {
		let dir = dir.into();

		fs::create_dir_all(&dir).map_err(|e| StoreError::Backend {
			message: format!("Failed to create cache directory {}: {e}", dir.display()),
		})?;

		Ok(Self { dir, ttl })
	}

	/// Platform default location, `<cache dir>/feishu-request-cache`.
	pub fn default_dir() -> Option<PathBuf> {
		dirs::cache_dir().map(|dir| dir.join(CACHE_DIR_NAME))
	}

	/// Root directory holding the entries.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Digest identifying a request by method, full URL, and body.
	pub fn key(method: &str, url: &Url, body: Option<&JsonValue>) -> String {
		let mut hasher = Sha256::new();

		hasher.update(method.to_ascii_uppercase().as_bytes());
		hasher.update([0]);
		hasher.update(url.as_str().as_bytes());
		hasher.update([0]);

		if let Some(body) = body {
			hasher.update(body.to_string().as_bytes());
		}

		URL_SAFE_NO_PAD.encode(hasher.finalize())
	}

	/// Returns a fresh entry for `key`, treating stale or unreadable entries as misses.
	pub fn get(&self, key: &str) -> Option<JsonValue> {
		self.get_at(key, OffsetDateTime::now_utc())
	}

	fn get_at(&self, key: &str, now: OffsetDateTime) -> Option<JsonValue> {
		let raw = fs::read(self.entry_path(key)).ok()?;
		let entry = serde_json::from_slice::<CacheEntry>(&raw).ok()?;

		(now - entry.stored_at < self.ttl).then_some(entry.body)
	}

	/// Stores `body` under `key`, replacing any previous entry.
	pub fn put(&self, key: &str, body: &JsonValue) -> Result<(), StoreError> {
		let entry = CacheEntry { stored_at: OffsetDateTime::now_utc(), body: body.clone() };
		let serialized = serde_json::to_vec(&entry).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize cache entry: {e}"),
		})?;

		crate::store::file::write_atomically(&self.entry_path(key), &serialized)
	}

	/// Removes every entry.
	pub fn clear(&self) -> Result<(), StoreError> {
		let entries = match fs::read_dir(&self.dir) {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to list {}: {e}", self.dir.display()),
				}),
		};

		for entry in entries.flatten() {
			let path = entry.path();

			if path.extension().is_some_and(|ext| ext == "json") {
				fs::remove_file(&path).map_err(|e| StoreError::Backend {
					message: format!("Failed to remove {}: {e}", path.display()),
				})?;
			}
		}

		Ok(())
	}

	fn entry_path(&self, key: &str) -> PathBuf {
		self.dir.join(format!("{key}.json"))
	}
}
