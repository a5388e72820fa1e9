//! Redis cache backend

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use redis::{RedisWrite, ToRedisArgs};

use crate::domain::cache::{CacheBackend, Value};
use crate::domain::CacheError;

const DEFAULT_PORT: u16 = 6379;

/// Configuration for the Redis backend
#[derive(Debug, Clone)]
pub struct RedisBackendConfig {
    /// `host` or `host:port`
    pub host: String,
    pub password: Option<String>,
    /// Logical database index
    pub db: i64,
    /// Timeout for establishing a connection
    pub connection_timeout: Duration,
    /// Timeout for a single command round trip
    pub response_timeout: Duration,
}

impl Default for RedisBackendConfig {
    fn default() -> Self {
        Self {
            host: format!("127.0.0.1:{}", DEFAULT_PORT),
            password: None,
            db: 0,
            connection_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisBackendConfig {
    /// Creates a new configuration for the given `host[:port]`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    fn connection_info(&self) -> Result<ConnectionInfo, CacheError> {
        let (host, port) = match self.host.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    CacheError::configuration(format!("Invalid Redis port in '{}'", self.host))
                })?;
                (host.to_string(), port)
            }
            None => (self.host.clone(), DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(CacheError::configuration("Redis host must not be empty"));
        }

        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        })
    }
}

/// Redis-backed cache.
///
/// Each operation maps onto one Redis command (or one MULTI block for bulk
/// writes). Connection loss and timeouts surface as
/// [`CacheError::Backend`]; reconnection is left to the `ConnectionManager`.
/// Values read back are always [`Value::Str`], Redis's native form.
pub struct RedisBackend {
    connection: Mutex<Option<ConnectionManager>>,
    config: RedisBackendConfig,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("host", &self.config.host)
            .field("db", &self.config.db)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisBackend {
    /// Connects and verifies the server answers `PING`
    pub async fn connect(config: RedisBackendConfig) -> Result<Self, CacheError> {
        let client = Client::open(config.connection_info()?)
            .map_err(|e| CacheError::backend(format!("Failed to create Redis client: {}", e)))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connection_timeout)
            .set_response_timeout(config.response_timeout);

        let connection = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to connect to Redis: {}", e)))?;

        let backend = Self {
            connection: Mutex::new(Some(connection)),
            config,
        };

        backend.ping().await?;

        tracing::info!(
            host = %backend.config.host,
            db = backend.config.db,
            "Connected to Redis cache backend"
        );

        Ok(backend)
    }

    pub fn config(&self) -> &RedisBackendConfig {
        &self.config
    }

    fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| CacheError::backend("Redis connection lock poisoned"))?;

        guard.clone().ok_or(CacheError::Closed)
    }

    /// Whole seconds for Redis; sub-second TTLs round up to one second.
    /// Anything past `i64::MAX` is refused, as Redis reads a negative
    /// EXPIRE as a delete.
    fn ttl_secs(ttl: Duration) -> Result<i64, CacheError> {
        i64::try_from(ttl.as_secs().max(1)).map_err(|_| {
            CacheError::validation(format!("TTL of {}s exceeds the Redis range", ttl.as_secs()))
        })
    }
}

/// Escapes glob metacharacters so a prefix matches literally in `SCAN MATCH`
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);

    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

impl ToRedisArgs for Value {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            Value::Int(v) => v.write_redis_args(out),
            Value::Uint(v) => v.write_redis_args(out),
            Value::Bool(v) => out.write_arg(if *v { b"1" } else { b"0" }),
            Value::Str(v) => v.write_redis_args(out),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection()?;

        let result: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to get key '{}': {}", key, e)))?;

        Ok(result.map(Value::Str))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection()?;

        let result: redis::RedisResult<()> = if ttl.is_zero() {
            conn.set(key, &value).await
        } else {
            let secs = Self::ttl_secs(ttl)?;
            conn.set_ex(key, &value, secs.unsigned_abs()).await
        };

        result.map_err(|e| CacheError::backend(format!("Failed to set key '{}': {}", key, e)))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection()?;

        let results: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to get keys: {}", e)))?;

        Ok(results.into_iter().map(|v| v.map(Value::Str)).collect())
    }

    async fn set_many(
        &self,
        entries: Vec<(String, Value)>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }

        let secs = if ttl.is_zero() {
            None
        } else {
            Some(Self::ttl_secs(ttl)?)
        };

        let mut conn = self.connection()?;

        // MSET drops existing TTLs; the EXPIREs reapply one TTL to every key
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("MSET");
        for (key, value) in &entries {
            pipe.arg(key).arg(value);
        }
        pipe.ignore();

        if let Some(secs) = secs {
            for (key, _) in &entries {
                pipe.cmd("EXPIRE").arg(key).arg(secs).ignore();
            }
        }

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to set keys: {}", e)))
    }

    async fn delete(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.connection()?;

        conn.del(key)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to delete key '{}': {}", key, e)))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<i64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection()?;

        conn.del(keys)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to delete keys: {}", e)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        if ttl.is_zero() {
            let mut conn = self.connection()?;

            // PERSIST answers 0 for a key without TTL, so existence is read
            // in the same transaction
            let (existed,): (bool,) = redis::pipe()
                .atomic()
                .cmd("EXISTS")
                .arg(key)
                .cmd("PERSIST")
                .arg(key)
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    CacheError::backend(format!("Failed to persist key '{}': {}", key, e))
                })?;

            return Ok(existed);
        }

        let secs = Self::ttl_secs(ttl)?;
        let mut conn = self.connection()?;

        conn.expire(key, secs)
            .await
            .map_err(|e| {
                CacheError::backend(format!("Failed to update TTL for key '{}': {}", key, e))
            })
    }

    async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.connection()?;

        // -2 for a missing key, -1 for no TTL
        conn.ttl(key)
            .await
            .map_err(|e| CacheError::backend(format!("Failed to get TTL for key '{}': {}", key, e)))
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection()?;

        conn.exists(key).await.map_err(|e| {
            CacheError::backend(format!("Failed to check existence of key '{}': {}", key, e))
        })
    }

    async fn clear(&self, prefix: &str) -> Result<String, CacheError> {
        let mut conn = self.connection()?;

        if prefix.is_empty() {
            return redis::cmd("FLUSHDB")
                .query_async::<String>(&mut conn)
                .await
                .map_err(|e| CacheError::backend(format!("Failed to flush database: {}", e)));
        }

        let pattern = format!("{}*", glob_escape(prefix));
        let mut cursor = 0u64;
        let mut deleted = 0i64;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    CacheError::backend(format!(
                        "Failed to scan keys with prefix '{}': {}",
                        prefix, e
                    ))
                })?;

            if !keys.is_empty() {
                let removed: i64 = conn
                    .del(&keys)
                    .await
                    .map_err(|e| CacheError::backend(format!("Failed to delete keys: {}", e)))?;
                deleted += removed;
            }

            cursor = next_cursor;

            if cursor == 0 {
                break;
            }
        }

        tracing::debug!(prefix = %prefix, deleted, "Cleared prefixed Redis keys");

        Ok("OK".to_string())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection()?;

        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| CacheError::backend(format!("Failed to ping Redis: {}", e)))
    }

    async fn close(&self) -> Result<(), CacheError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| CacheError::backend("Redis connection lock poisoned"))?;

        match guard.take() {
            Some(_) => Ok(()),
            None => Err(CacheError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance on 127.0.0.1:6379 and
    // use db 15 to stay out of the way. Run with: cargo test -- --ignored

    async fn test_backend() -> RedisBackend {
        RedisBackend::connect(RedisBackendConfig::new("127.0.0.1:6379").with_db(15))
            .await
            .unwrap()
    }

    #[test]
    fn test_connection_info_with_port() {
        let info = RedisBackendConfig::new("cache.internal:6380")
            .with_password("secret")
            .with_db(3)
            .connection_info()
            .unwrap();

        assert!(matches!(info.addr, ConnectionAddr::Tcp(ref host, 6380) if host == "cache.internal"));
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password, Some("secret".to_string()));
    }

    #[test]
    fn test_connection_info_default_port() {
        let info = RedisBackendConfig::new("localhost").connection_info().unwrap();

        assert!(matches!(info.addr, ConnectionAddr::Tcp(ref host, 6379) if host == "localhost"));
        assert_eq!(info.redis.password, None);
    }

    #[test]
    fn test_connection_info_invalid_port() {
        let result = RedisBackendConfig::new("localhost:abc").connection_info();
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_glob_escape() {
        assert_eq!(glob_escape("app:"), "app:");
        assert_eq!(glob_escape("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_ttl_secs_rounds_up_subsecond() {
        assert_eq!(RedisBackend::ttl_secs(Duration::from_millis(200)).unwrap(), 1);
        assert_eq!(RedisBackend::ttl_secs(Duration::from_secs(60)).unwrap(), 60);
    }

    #[test]
    fn test_ttl_secs_never_goes_negative() {
        let max = Duration::from_secs(i64::MAX as u64);
        assert_eq!(RedisBackend::ttl_secs(max).unwrap(), i64::MAX);

        let err = RedisBackend::ttl_secs(Duration::from_secs(u64::MAX)).unwrap_err();
        assert!(matches!(err, CacheError::Validation { .. }));

        let err = RedisBackend::ttl_secs(Duration::from_secs(i64::MAX as u64 + 1)).unwrap_err();
        assert!(matches!(err, CacheError::Validation { .. }));
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_set_and_get() {
        let backend = test_backend().await;

        backend
            .set("cachekit:test:key1", Value::Int(42), Duration::from_secs(60))
            .await
            .unwrap();

        let result = backend.get("cachekit:test:key1").await.unwrap();
        assert_eq!(result, Some(Value::Str("42".to_string())));
        assert_eq!(result.unwrap().decode::<i64>().unwrap(), 42);

        backend.delete("cachekit:test:key1").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_ttl_sentinels() {
        let backend = test_backend().await;

        backend
            .set("cachekit:test:persist", Value::Bool(true), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(backend.ttl("cachekit:test:persist").await.unwrap(), -1);
        assert_eq!(backend.ttl("cachekit:test:missing").await.unwrap(), -2);
        assert!(backend.expire("cachekit:test:persist", Duration::ZERO).await.unwrap());

        backend.delete("cachekit:test:persist").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_bulk_operations() {
        let backend = test_backend().await;

        backend
            .set_many(
                vec![
                    ("cachekit:test:m1".to_string(), Value::Int(1)),
                    ("cachekit:test:m2".to_string(), Value::from("two")),
                ],
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let keys = vec![
            "cachekit:test:m1".to_string(),
            "cachekit:test:missing".to_string(),
            "cachekit:test:m2".to_string(),
        ];
        let values = backend.get_many(&keys).await.unwrap();
        assert_eq!(
            values,
            vec![Some(Value::from("1")), None, Some(Value::from("two"))]
        );

        assert!(backend.ttl("cachekit:test:m2").await.unwrap() > 50);
        assert_eq!(backend.delete_many(&keys).await.unwrap(), 2);
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_clear_prefix() {
        let backend = test_backend().await;

        backend
            .set("cachekit:clear:a", Value::Int(1), Duration::ZERO)
            .await
            .unwrap();
        backend
            .set("cachekit:keep", Value::Int(2), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(backend.clear("cachekit:clear:").await.unwrap(), "OK");
        assert!(!backend.exists("cachekit:clear:a").await.unwrap());
        assert!(backend.exists("cachekit:keep").await.unwrap());

        backend.delete("cachekit:keep").await.unwrap();
        backend.close().await.unwrap();
        assert!(matches!(backend.get("x").await, Err(CacheError::Closed)));
    }
}
