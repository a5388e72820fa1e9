//! In-memory cache backend using moka

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache as MokaCache;

use super::clock::{Clock, SystemClock};
use crate::domain::cache::{CacheBackend, TTL_MISSING, TTL_NO_EXPIRY, Value};
use crate::domain::CacheError;

/// Entry stored in moka
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// Expiration timestamp (millis from the backend clock), `None` = persistent
    expires_at: Option<u64>,
}

impl CacheEntry {
    fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Thread-safe in-process backend.
///
/// Entries live in a moka cache without moka-level expiry; each entry keeps
/// its own deadline, evaluated against the backend clock and dropped lazily
/// when touched. Clones share the same store, which is how several services
/// can sit on one map. Closing is per handle: other clones keep working and
/// the data lives until the last handle is dropped.
#[derive(Debug)]
pub struct InMemoryBackend {
    cache: MokaCache<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl InMemoryBackend {
    /// Creates an empty backend on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty backend evaluating expiry against `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: MokaCache::builder().build(),
            clock,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> Result<usize, CacheError> {
        self.ensure_open()?;
        let now = self.now();

        Ok(self
            .cache
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Closed);
        }

        Ok(())
    }

    /// Deadline for `ttl` from now; saturates instead of wrapping
    fn expires_at(&self, ttl: Duration) -> Option<u64> {
        if ttl.is_zero() {
            return None;
        }

        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        Some(self.now().saturating_add(millis))
    }

    /// Looks up a live entry, evicting it first if it has expired
    fn live(&self, key: &str, now: u64) -> Option<CacheEntry> {
        let entry = self.cache.get(key)?;

        if entry.is_expired(now) {
            self.cache.invalidate(key);
            return None;
        }

        Some(entry)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for InMemoryBackend {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            clock: Arc::clone(&self.clock),
            closed: AtomicBool::new(self.closed.load(Ordering::SeqCst)),
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.ensure_open()?;

        Ok(self.live(key, self.now()).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_open()?;

        let entry = CacheEntry {
            value,
            expires_at: self.expires_at(ttl),
        };

        self.cache.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, CacheError> {
        self.ensure_open()?;
        let now = self.now();

        Ok(keys
            .iter()
            .map(|key| self.live(key, now).map(|entry| entry.value))
            .collect())
    }

    async fn set_many(
        &self,
        entries: Vec<(String, Value)>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.ensure_open()?;
        let expires_at = self.expires_at(ttl);

        for (key, value) in entries {
            self.cache.insert(key, CacheEntry { value, expires_at });
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<i64, CacheError> {
        self.ensure_open()?;
        let now = self.now();

        match self.cache.remove(key) {
            Some(entry) if !entry.is_expired(now) => Ok(1),
            _ => Ok(0),
        }
    }

    async fn delete_many(&self, keys: &[String]) -> Result<i64, CacheError> {
        self.ensure_open()?;
        let now = self.now();

        let deleted = keys
            .iter()
            .filter_map(|key| self.cache.remove(key))
            .filter(|entry| !entry.is_expired(now))
            .count();

        Ok(deleted as i64)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let now = self.now();
        let expires_at = self.expires_at(ttl);

        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(|current| match current {
                Some(entry) if entry.value().is_expired(now) => Op::Remove,
                Some(entry) => {
                    let mut updated = entry.into_value();
                    updated.expires_at = expires_at;
                    Op::Put(updated)
                }
                None => Op::Nop,
            });

        Ok(matches!(result, CompResult::ReplacedWith(_)))
    }

    async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        self.ensure_open()?;
        let now = self.now();

        match self.live(key, now) {
            None => Ok(TTL_MISSING),
            Some(CacheEntry {
                expires_at: None, ..
            }) => Ok(TTL_NO_EXPIRY),
            Some(CacheEntry {
                expires_at: Some(at),
                ..
            }) => {
                // Rounded to the nearest second, like Redis
                let remaining = at - now;
                let secs = remaining.saturating_add(500) / 1000;
                Ok(i64::try_from(secs).unwrap_or(i64::MAX))
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;

        Ok(self.live(key, self.now()).is_some())
    }

    async fn clear(&self, prefix: &str) -> Result<String, CacheError> {
        self.ensure_open()?;

        if prefix.is_empty() {
            self.cache.invalidate_all();
        } else {
            let matching: Vec<Arc<String>> = self
                .cache
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, _)| key)
                .collect();

            for key in matching {
                self.cache.invalidate(key.as_str());
            }
        }

        Ok("OK".to_string())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(CacheError::Closed);
        }

        Ok(())
    }
}
