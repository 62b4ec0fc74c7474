//! Cache-aside layer.
//!
//! - [`KeyValueStore`]: scoped async access to an external TTL store
//! - [`MemoryStore`]: in-process store used by default and in tests
//! - `RedisStore`: Redis backend (feature `redis`)
//! - [`CacheService`]: soft-failing cache facade used by tool handlers
//! - [`derive_key`]: deterministic `<prefix>:<hash>` keys

pub mod keys;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod service;
pub mod store;

pub use keys::derive_key;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use service::CacheService;
pub use store::{KeyValueStore, MAX_TTL, MemoryStore, StoreError};
