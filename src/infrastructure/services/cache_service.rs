//! Prefix-aware cache service

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::cache::{CacheBackend, Value, MAX_TTL_SECS};
use crate::domain::CacheError;
use crate::infrastructure::cache::{Backend, BackendFactory, CacheSettings};

/// Public cache surface.
///
/// Every key is prefixed before it reaches the backend, so two services with
/// different prefixes can share one physical store. TTLs are in seconds and
/// zero means no expiration.
///
/// Primitive values (integers, bools, strings) go through [`get`](Self::get)
/// and [`set`](Self::set). Structs and maps go through
/// [`get_struct`](Self::get_struct) and [`set_struct`](Self::set_struct),
/// which store JSON text. TTLs above [`MAX_TTL_SECS`] are refused with
/// [`CacheError::Validation`].
///
/// The prefix is matched as a plain string, so tenants sharing a store
/// need prefixes that are not prefixes of one another (`"a:"` and `"ab:"`,
/// not `"a"` and `"ab"`).
#[derive(Debug)]
pub struct CacheService<B: CacheBackend = Backend> {
    backend: B,
    prefix: String,
}

impl CacheService<Backend> {
    /// Builds the configured backend and wraps it
    pub async fn from_settings(settings: &CacheSettings) -> Result<Self, CacheError> {
        let backend = BackendFactory::new().create(settings).await?;
        Ok(Self::with_prefix(backend, settings.prefix.clone()))
    }
}

impl<B: CacheBackend> CacheService<B> {
    /// Creates a service without a key prefix
    pub fn new(backend: B) -> Self {
        Self::with_prefix(backend, "")
    }

    /// Creates a service that prefixes every key with `prefix`
    pub fn with_prefix(backend: B, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn namespaced_all(&self, keys: &[&str]) -> Vec<String> {
        keys.iter().map(|key| self.namespaced(key)).collect()
    }

    /// Gets a primitive value; `None` on a miss
    pub async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.backend.get(&self.namespaced(key)).await
    }

    /// Gets a primitive value decoded into `T`
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key).await? {
            Some(value) => value.decode().map(Some),
            None => Ok(None),
        }
    }

    /// Stores a primitive value.
    ///
    /// Anything that does not serialize to an integer, bool or string is
    /// rejected with [`CacheError::UnsupportedValue`] before the backend is
    /// touched.
    pub async fn set<V>(&self, key: &str, value: &V, ttl_secs: u64) -> Result<(), CacheError>
    where
        V: Serialize + ?Sized,
    {
        let ttl = ttl_duration(ttl_secs)?;
        let value = Value::from_serializable(value)?;
        self.backend.set(&self.namespaced(key), value, ttl).await
    }

    /// Gets a struct stored with [`set_struct`](Self::set_struct); `None` on a miss
    pub async fn get_struct<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let data = match self.get(key).await? {
            Some(Value::Str(data)) => data,
            Some(other) => {
                return Err(CacheError::serialization(format!(
                    "expected JSON text under '{}', found {} value",
                    key,
                    other.kind()
                )));
            }
            None => return Ok(None),
        };

        let value = serde_json::from_str(&data)?;
        Ok(Some(value))
    }

    /// Stores a struct (or map) as JSON text
    pub async fn set_struct<V>(&self, key: &str, value: &V, ttl_secs: u64) -> Result<(), CacheError>
    where
        V: Serialize + ?Sized,
    {
        let ttl = ttl_duration(ttl_secs)?;
        let json = serde_json::to_value(value)?;
        if !json.is_object() {
            return Err(CacheError::unsupported_value(json_kind(&json)));
        }

        let data = serde_json::to_string(&json)?;
        self.backend
            .set(&self.namespaced(key), Value::Str(data), ttl)
            .await
    }

    /// Gets several primitive values, one slot per key in input order
    pub async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Value>>, CacheError> {
        self.backend.get_many(&self.namespaced_all(keys)).await
    }

    /// Stores several primitive values.
    ///
    /// All values are validated before anything is written. Every listed key
    /// gets `ttl_secs`, including keys whose value is unchanged.
    pub async fn set_many<V>(&self, keys: &[&str], values: &[V], ttl_secs: u64) -> Result<(), CacheError>
    where
        V: Serialize,
    {
        if keys.len() != values.len() {
            return Err(CacheError::validation(format!(
                "set_many got {} keys and {} values",
                keys.len(),
                values.len()
            )));
        }

        let ttl = ttl_duration(ttl_secs)?;

        let entries = keys
            .iter()
            .zip(values)
            .map(|(key, value)| Ok((self.namespaced(key), Value::from_serializable(value)?)))
            .collect::<Result<Vec<_>, CacheError>>()?;

        self.backend.set_many(entries, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<i64, CacheError> {
        self.backend.delete(&self.namespaced(key)).await
    }

    pub async fn delete_many(&self, keys: &[&str]) -> Result<i64, CacheError> {
        self.backend.delete_many(&self.namespaced_all(keys)).await
    }

    /// Sets a new TTL on an existing key; zero removes the expiration
    pub async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        let ttl = ttl_duration(ttl_secs)?;
        self.backend.expire(&self.namespaced(key), ttl).await
    }

    /// Seconds remaining; `-1` without expiration, `-2` when missing
    pub async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        self.backend.ttl(&self.namespaced(key)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.backend.exists(&self.namespaced(key)).await
    }

    /// Removes every key under this service's prefix
    pub async fn clear(&self) -> Result<String, CacheError> {
        self.backend.clear(&self.prefix).await
    }

    /// Checks that the backend is reachable
    pub async fn ping(&self) -> Result<(), CacheError> {
        self.backend.ping().await
    }

    /// Releases this service's backend handle; later calls fail with
    /// [`CacheError::Closed`]. Services holding other clones of an
    /// in-memory backend keep working.
    pub async fn close(&self) -> Result<(), CacheError> {
        self.backend.close().await
    }
}

pub(crate) fn ttl_duration(ttl_secs: u64) -> Result<Duration, CacheError> {
    if ttl_secs > MAX_TTL_SECS {
        return Err(CacheError::validation(format!(
            "TTL of {}s exceeds the maximum of {}s",
            ttl_secs, MAX_TTL_SECS
        )));
    }

    Ok(Duration::from_secs(ttl_secs))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "none",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "sequence",
        serde_json::Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde::Deserialize;

    use super::*;
    use crate::domain::cache::{MockCacheBackend, TTL_MISSING};
    use crate::infrastructure::cache::{InMemoryBackend, ManualClock};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        age: u32,
        tags: Vec<String>,
    }

    fn profile() -> Profile {
        Profile {
            name: "alice".to_string(),
            age: 30,
            tags: vec!["admin".to_string()],
        }
    }

    fn service_with_clock() -> (CacheService<InMemoryBackend>, ManualClock) {
        let clock = ManualClock::starting_at(0);
        let backend = InMemoryBackend::with_clock(Arc::new(clock.clone()));
        (CacheService::with_prefix(backend, "test:"), clock)
    }

    #[tokio::test]
    async fn test_score_scenario() {
        let (cache, clock) = service_with_clock();

        cache.set("score", &42, 60).await.unwrap();
        assert_eq!(cache.get("score").await.unwrap(), Some(Value::Int(42)));

        clock.advance(Duration::from_secs(61));

        assert!(!cache.exists("score").await.unwrap());
        assert!(cache.get("score").await.unwrap().is_none());
        assert_eq!(cache.ttl("score").await.unwrap(), TTL_MISSING);
    }

    #[tokio::test]
    async fn test_primitive_round_trips() {
        let (cache, _clock) = service_with_clock();

        cache.set("int", &-7i32, 60).await.unwrap();
        cache.set("uint", &7u64, 60).await.unwrap();
        cache.set("bool", &true, 60).await.unwrap();
        cache.set("string", "hello", 60).await.unwrap();

        assert_eq!(cache.get("int").await.unwrap(), Some(Value::Int(-7)));
        assert_eq!(cache.get("uint").await.unwrap(), Some(Value::Uint(7)));
        assert_eq!(cache.get("bool").await.unwrap(), Some(Value::Bool(true)));
        assert_eq!(cache.get("string").await.unwrap(), Some(Value::from("hello")));

        assert_eq!(cache.get_as::<i32>("int").await.unwrap(), Some(-7));
        assert_eq!(cache.get_as::<String>("string").await.unwrap(), Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_get_miss() {
        let (cache, _clock) = service_with_clock();

        assert!(cache.get("absent").await.unwrap().is_none());
        assert!(cache.get_as::<i64>("absent").await.unwrap().is_none());
        assert!(cache.get_struct::<Profile>("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_rejects_non_primitive() {
        let mut backend = MockCacheBackend::new();
        backend.expect_set().never();

        let cache = CacheService::new(backend);

        let err = cache.set("k", &1.5f64, 60).await.unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedValue { ref kind } if kind == "f64"));

        let err = cache.set("k", &profile(), 60).await.unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedValue { ref kind } if kind == "Profile"));
    }

    #[tokio::test]
    async fn test_struct_round_trip() {
        let (cache, _clock) = service_with_clock();

        cache.set_struct("profile", &profile(), 60).await.unwrap();

        let loaded: Option<Profile> = cache.get_struct("profile").await.unwrap();
        assert_eq!(loaded, Some(profile()));
    }

    #[tokio::test]
    async fn test_struct_stored_as_json_text() {
        let (cache, _clock) = service_with_clock();

        cache.set_struct("profile", &profile(), 0).await.unwrap();

        let raw = cache.backend().get("test:profile").await.unwrap().unwrap();
        let text = raw.as_str().unwrap();
        let decoded: Profile = serde_json::from_str(text).unwrap();
        assert_eq!(decoded, profile());
    }

    #[tokio::test]
    async fn test_set_struct_accepts_maps_and_references() {
        let (cache, _clock) = service_with_clock();

        let mut map = HashMap::new();
        map.insert("a".to_string(), 1);
        cache.set_struct("map", &map, 60).await.unwrap();

        let value = profile();
        let reference = &value;
        cache.set_struct("ref", &reference, 60).await.unwrap();

        let loaded: Option<HashMap<String, i32>> = cache.get_struct("map").await.unwrap();
        assert_eq!(loaded, Some(map));
    }

    #[tokio::test]
    async fn test_set_struct_rejects_primitives() {
        let (cache, _clock) = service_with_clock();

        let err = cache.set_struct("k", &5, 60).await.unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedValue { ref kind } if kind == "number"));

        let err = cache.set_struct("k", &vec![1, 2], 60).await.unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedValue { ref kind } if kind == "sequence"));

        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_struct_decode_error() {
        let (cache, _clock) = service_with_clock();

        cache.set("broken", "{not json", 60).await.unwrap();

        let err = cache.get_struct::<Profile>("broken").await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_get_struct_over_primitive_entry() {
        let (cache, _clock) = service_with_clock();

        cache.set("n", &1, 60).await.unwrap();

        let err = cache.get_struct::<Profile>("n").await.unwrap_err();
        assert!(matches!(err, CacheError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_many_operations() {
        let (cache, _clock) = service_with_clock();

        cache
            .set_many(&["a", "b", "c"], &[Value::Int(1), Value::from("two"), Value::Bool(false)], 60)
            .await
            .unwrap();

        let values = cache.get_many(&["c", "missing", "a", "b"]).await.unwrap();
        assert_eq!(
            values,
            vec![
                Some(Value::Bool(false)),
                None,
                Some(Value::Int(1)),
                Some(Value::from("two"))
            ]
        );

        let deleted = cache.delete_many(&["a", "b", "missing"]).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(cache.delete("c").await.unwrap(), 1);
        assert_eq!(cache.delete("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_many_validates_before_writing() {
        let (cache, _clock) = service_with_clock();

        let err = cache.set_many(&["a", "b"], &[1.0f64, 2.0], 60).await.unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedValue { .. }));

        let err = cache.set_many(&["a", "b"], &[1], 60).await.unwrap_err();
        assert!(matches!(err, CacheError::Validation { .. }));

        assert!(!cache.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_and_ttl() {
        let (cache, clock) = service_with_clock();

        cache.set("k", &1, 0).await.unwrap();
        assert_eq!(cache.ttl("k").await.unwrap(), -1);

        assert!(cache.expire("k", 10).await.unwrap());
        assert_eq!(cache.ttl("k").await.unwrap(), 10);

        clock.advance(Duration::from_secs(10));
        assert!(!cache.expire("k", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_prefix_isolation() {
        let backend = InMemoryBackend::new();
        let tenant_a = CacheService::with_prefix(backend.clone(), "a:");
        let tenant_b = CacheService::with_prefix(backend.clone(), "b:");

        tenant_a.set("user", "alice", 0).await.unwrap();
        tenant_b.set("user", "bob", 0).await.unwrap();

        assert_eq!(tenant_a.get("user").await.unwrap(), Some(Value::from("alice")));
        assert_eq!(tenant_b.get("user").await.unwrap(), Some(Value::from("bob")));
        assert!(backend.exists("a:user").await.unwrap());

        assert_eq!(tenant_a.clear().await.unwrap(), "OK");

        assert!(!tenant_a.exists("user").await.unwrap());
        assert!(tenant_b.exists("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_prefix_is_plain_string_match() {
        let backend = InMemoryBackend::new();
        let short = CacheService::with_prefix(backend.clone(), "a");
        let long = CacheService::with_prefix(backend.clone(), "ab");

        long.set("user", "bob", 0).await.unwrap();
        short.clear().await.unwrap();
        assert!(!long.exists("user").await.unwrap());

        let short = CacheService::with_prefix(backend.clone(), "a:");
        let long = CacheService::with_prefix(backend.clone(), "ab:");

        long.set("user", "bob", 0).await.unwrap();
        short.clear().await.unwrap();
        assert!(long.exists("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_rejected() {
        let backend = InMemoryBackend::new();
        let cache = CacheService::new(backend.clone());

        let err = cache.set("k", &1, u64::MAX).await.unwrap_err();
        assert!(err.is_validation());
        assert!(!backend.exists("k").await.unwrap());

        let err = cache.set_many(&["a"], &[Value::Int(1)], u64::MAX).await.unwrap_err();
        assert!(err.is_validation());
        assert!(!backend.exists("a").await.unwrap());

        cache.set("kept", &1, 60).await.unwrap();
        let err = cache.expire("kept", u64::MAX).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(cache.ttl("kept").await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_largest_ttls_are_stored() {
        let cache = CacheService::new(InMemoryBackend::new());

        cache.set("far", &1, u64::MAX / 1000).await.unwrap();
        cache.set("max", &2, MAX_TTL_SECS).await.unwrap();

        assert_eq!(cache.get_as::<i64>("far").await.unwrap(), Some(1));
        assert_eq!(cache.get_as::<i64>("max").await.unwrap(), Some(2));
        assert!(cache.ttl("max").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_close_leaves_other_services_open() {
        let backend = InMemoryBackend::new();
        let tenant_a = CacheService::with_prefix(backend.clone(), "a:");
        let tenant_b = CacheService::with_prefix(backend.clone(), "b:");

        tenant_a.set("user", "alice", 0).await.unwrap();
        tenant_a.close().await.unwrap();

        assert!(matches!(tenant_a.get("user").await, Err(CacheError::Closed)));
        assert!(tenant_b.ping().await.is_ok());
        tenant_b.set("user", "bob", 0).await.unwrap();
        assert_eq!(tenant_b.get("user").await.unwrap(), Some(Value::from("bob")));
        assert!(backend.exists("a:user").await.unwrap());
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_get()
            .returning(|_| Err(CacheError::backend("connection refused")));

        let cache = CacheService::new(backend);

        let err = cache.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Backend { .. }));

        let err = cache.get_struct::<Profile>("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_delete()
            .withf(|key| key.to_string() == "ns:item")
            .returning(|_| Ok(1));

        let cache = CacheService::with_prefix(backend, "ns:");

        assert_eq!(cache.delete("item").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_from_settings_memory() {
        let settings = CacheSettings::memory().with_prefix("app:");
        let cache = CacheService::from_settings(&settings).await.unwrap();

        assert_eq!(cache.prefix(), "app:");

        cache.set("k", &1, 0).await.unwrap();
        assert_eq!(cache.get_as::<i64>("k").await.unwrap(), Some(1));

        cache.close().await.unwrap();
        assert!(matches!(cache.get("k").await, Err(CacheError::Closed)));
    }
}
