//! Cache-aside service over a [`KeyValueStore`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::store::{KeyValueStore, StoreError};

/// Soft-failing cache facade.
///
/// Store faults never reach the caller: reads degrade to a miss, writes and
/// deletes report `false`, pattern invalidation reports what it managed to
/// remove. The service is TTL-agnostic and stores whatever expiry it is given.
#[derive(Debug, Clone)]
pub struct CacheService {
    store: Arc<dyn KeyValueStore>,
}

impl CacheService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying store, shared with other services owning their own keyspace.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Read and decode a cached value. `None` on miss or any store/decoding fault.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(Some(value)) => {
                debug!(name: "cache.hit", key = %key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(name: "cache.miss", key = %key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(name: "cache.get.failed", key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Encode and store a value with the given TTL. Returns `false` on any fault.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let result = match serde_json::to_string(value) {
            Ok(raw) => self.store.set(key, &raw, ttl).await,
            Err(e) => Err(StoreError::from(e)),
        };

        match result {
            Ok(()) => {
                debug!(name: "cache.set", key = %key, ttl_secs = ttl.as_secs(), "Cache entry stored");
                true
            }
            Err(e) => {
                warn!(name: "cache.set.failed", key = %key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Remove a key. Returns `true` only if something was deleted.
    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(name: "cache.delete.failed", key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    /// Delete every key matching `pattern`, one at a time.
    ///
    /// Not atomic: keys written concurrently may survive, and the count covers
    /// only the deletes that succeeded.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let keys = match self.store.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(name: "cache.invalidate.failed", pattern = %pattern, error = %e, "Cache key scan failed");
                return 0;
            }
        };

        let mut removed = 0;
        for key in &keys {
            match self.store.delete(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(name: "cache.invalidate.failed", key = %key, error = %e, "Cache delete failed during invalidation");
                }
            }
        }
        removed
    }
}
