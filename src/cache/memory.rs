//! Thread-safe in-memory [`TokenCache`] implementation for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	cache::{CacheError, CacheFuture, TokenCache},
};

type CacheMap = Arc<RwLock<HashMap<String, CachedToken>>>;

#[derive(Clone, Debug)]
struct CachedToken {
	token: AccessToken,
	expires_at: OffsetDateTime,
}
impl CachedToken {
	fn is_live_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}
}

/// Thread-safe cache backend that keeps tokens in-process and evicts them lazily on read.
#[derive(Clone, Debug, Default)]
pub struct MemoryCache(CacheMap);
impl MemoryCache {
	/// Returns the absolute expiry recorded for `key`, ignoring whether it already elapsed.
	pub fn expires_at(&self, key: &str) -> Option<OffsetDateTime> {
		self.0.read().get(key).map(|entry| entry.expires_at)
	}

	/// Returns the number of stored entries, including expired ones not yet evicted.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn get_now(map: &CacheMap, key: &str, now: OffsetDateTime) -> Option<AccessToken> {
		{
			let guard = map.read();

			match guard.get(key) {
				Some(entry) if entry.is_live_at(now) => return Some(entry.token.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		Self::evict_expired(map, key, now)
	}

	// Re-reads under the write lock; a concurrent `put` may have stored a live token since.
	fn evict_expired(map: &CacheMap, key: &str, now: OffsetDateTime) -> Option<AccessToken> {
		let mut guard = map.write();

		match guard.get(key) {
			Some(entry) if entry.is_live_at(now) => Some(entry.token.clone()),
			Some(_) => {
				guard.remove(key);

				None
			},
			None => None,
		}
	}

	fn put_now(
		map: &CacheMap,
		key: &str,
		token: AccessToken,
		ttl: Duration,
		now: OffsetDateTime,
	) -> Result<(), CacheError> {
		let expires_at = now.checked_add(ttl).ok_or_else(|| CacheError::Backend {
			message: format!("ttl of {}s overflows the expiry timestamp", ttl.whole_seconds()),
		})?;

		map.write().insert(key.to_owned(), CachedToken { token, expires_at });

		Ok(())
	}
}
impl TokenCache for MemoryCache {
	fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<AccessToken>> {
		Box::pin(async move { Ok(Self::get_now(&self.0, key, OffsetDateTime::now_utc())) })
	}

	fn put<'a>(&'a self, key: &'a str, token: AccessToken, ttl: Duration) -> CacheFuture<'a, ()> {
		Box::pin(async move { Self::put_now(&self.0, key, token, ttl, OffsetDateTime::now_utc()) })
	}

	fn forget<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().remove(key);

			Ok(())
		})
	}
}
