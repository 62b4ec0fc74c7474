//! Key-value store abstraction and the in-process implementation.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Longest expiry any store honours; larger TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Errors raised by a [`KeyValueStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing service could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backing service rejected or failed the command.
    #[error("store command failed: {0}")]
    Command(String),

    /// A stored value could not be (de)serialized.
    #[error("malformed cache value: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Scoped async access to an external key-value cache.
///
/// Every call acquires whatever connection handle it needs and releases it
/// before returning, on success and failure alike. Implementations never
/// assume exclusive ownership of the keyspace.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Returns `true` if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Reset the expiry of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Keys matching a glob pattern (`*`, `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

fn deadline(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

/// In-process TTL store.
///
/// Expired entries are dropped lazily on access. Uses the tokio clock so
/// paused-time tests can advance past a TTL.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> R) -> R {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.with_entries(|entries| entries.values().filter(|e| e.is_live(now)).count())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self.with_entries(|entries| match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: deadline(Instant::now(), ttl),
        };
        self.with_entries(|entries| entries.insert(key.to_string(), entry));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self.with_entries(|entries| {
            entries
                .remove(key)
                .is_some_and(|entry| entry.is_live(now))
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self.with_entries(|entries| entries.get(key).is_some_and(|e| e.is_live(now))))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self.with_entries(|entries| match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = deadline(now, ttl);
                true
            }
            _ => false,
        }))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut keys: Vec<String> = self.with_entries(|entries| {
            entries.retain(|_, e| e.is_live(now));
            entries
                .keys()
                .filter(|k| glob_match(pattern, k))
                .cloned()
                .collect()
        });
        keys.sort();
        Ok(keys)
    }
}

/// Redis-style glob matching supporting `*` and `?`.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("search:*", "search:abc"));
        assert!(glob_match("*", ""));
        assert!(glob_match("user_list:?", "user_list:7"));
        assert!(glob_match("a*c*e", "abcde"));
        assert!(!glob_match("search:*", "trending:abc"));
        assert!(!glob_match("user_list:?", "user_list:77"));
        assert!(!glob_match("abc", "abcd"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.exists("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_clamps_huge_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::MAX).await.unwrap();
        assert!(store.expire("k", Duration::from_secs(u64::MAX)).await.unwrap());

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expire_extends_lifetime() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(5)).await.unwrap();

        assert!(store.expire("k", Duration::from_secs(60)).await.unwrap());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(store.exists("k").await.unwrap());

        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_keys_and_delete() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("search:1", "a", ttl).await.unwrap();
        store.set("search:2", "b", ttl).await.unwrap();
        store.set("trending:1", "c", ttl).await.unwrap();

        let keys = store.keys("search:*").await.unwrap();
        assert_eq!(keys, vec!["search:1".to_string(), "search:2".to_string()]);

        assert!(store.delete("search:1").await.unwrap());
        assert!(!store.delete("search:1").await.unwrap());
        assert_eq!(store.len(), 2);
    }
}
