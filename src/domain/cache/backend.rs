//! Cache backend contract

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use super::Value;
use crate::domain::CacheError;

#[cfg(test)]
use mockall::automock;

/// `ttl` reply for a key that exists without an expiration
pub const TTL_NO_EXPIRY: i64 = -1;

/// `ttl` reply for a key that does not exist
pub const TTL_MISSING: i64 = -2;

/// Largest TTL, in seconds, any backend accepts
pub const MAX_TTL_SECS: u64 = i64::MAX as u64;

/// Storage engine behind a cache service.
///
/// Keys arrive already namespaced. A zero `ttl` means the entry never
/// expires. Failures of the underlying store are returned as
/// [`CacheError::Backend`] and never retried here.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// Gets a value; `None` on a miss
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Overwrites a value unconditionally
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Gets several values, one slot per key in input order
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, CacheError>;

    /// Sets several values at once.
    ///
    /// The TTL of every listed key is reset, including keys whose value did
    /// not change.
    async fn set_many(&self, entries: Vec<(String, Value)>, ttl: Duration)
    -> Result<(), CacheError>;

    /// Removes a key, returning the number of keys removed
    async fn delete(&self, key: &str) -> Result<i64, CacheError>;

    /// Removes several keys, returning the number of keys that existed
    async fn delete_many(&self, keys: &[String]) -> Result<i64, CacheError>;

    /// Applies a new TTL; a zero TTL removes the expiration.
    /// Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Seconds remaining, or [`TTL_NO_EXPIRY`] / [`TTL_MISSING`]
    async fn ttl(&self, key: &str) -> Result<i64, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every key starting with `prefix` (all keys when empty).
    ///
    /// Matching is a plain string prefix: clearing `"a"` also removes
    /// `"ab:x"`. Tenants sharing a store need prefixes that are not
    /// prefixes of each other, e.g. ending every prefix with `:`.
    async fn clear(&self, prefix: &str) -> Result<String, CacheError>;

    /// Checks that the store is reachable through this handle
    async fn ping(&self) -> Result<(), CacheError>;

    /// Releases the handle; later calls fail with [`CacheError::Closed`]
    async fn close(&self) -> Result<(), CacheError>;
}
