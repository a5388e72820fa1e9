//! Backend selection from settings

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::in_memory::InMemoryBackend;
use super::redis::{RedisBackend, RedisBackendConfig};
use crate::domain::cache::{CacheBackend, Value};
use crate::domain::CacheError;

/// Supported backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum BackendKind {
    /// In-process map
    #[default]
    Memory,
    /// Remote Redis server
    Redis,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" | "in_memory" | "inmemory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            _ => Err(CacheError::configuration(format!(
                "Unknown cache backend: {}. Valid backends: memory, redis",
                s
            ))),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Cache settings as read from configuration.
///
/// Field names follow the flat `cache_*` keys so a settings table can be
/// shared with other components of an application.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    #[serde(rename = "cache_backend")]
    pub backend: BackendKind,
    /// Prepended to every key; isolates tenants sharing one store
    #[serde(rename = "cache_prefix")]
    pub prefix: String,
    /// Redis `host[:port]`
    #[serde(rename = "cache_host")]
    pub host: String,
    #[serde(rename = "cache_password")]
    pub password: Option<String>,
    #[serde(rename = "cache_db")]
    pub db: i64,
    #[serde(rename = "cache_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    #[serde(rename = "cache_response_timeout_secs")]
    pub response_timeout_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            prefix: String::new(),
            host: "127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
            connection_timeout_secs: 5,
            response_timeout_secs: 5,
        }
    }
}

impl CacheSettings {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn redis(host: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Redis,
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    fn redis_config(&self) -> RedisBackendConfig {
        let mut config = RedisBackendConfig::new(self.host.clone())
            .with_db(self.db)
            .with_connection_timeout(Duration::from_secs(self.connection_timeout_secs))
            .with_response_timeout(Duration::from_secs(self.response_timeout_secs));

        if let Some(password) = &self.password {
            config = config.with_password(password.clone());
        }

        config
    }
}

/// The backend a cache service owns: exactly one of the two known stores
#[derive(Debug)]
pub enum Backend {
    Memory(InMemoryBackend),
    Redis(RedisBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Memory(_) => BackendKind::Memory,
            Backend::Redis(_) => BackendKind::Redis,
        }
    }
}

impl From<InMemoryBackend> for Backend {
    fn from(backend: InMemoryBackend) -> Self {
        Backend::Memory(backend)
    }
}

impl From<RedisBackend> for Backend {
    fn from(backend: RedisBackend) -> Self {
        Backend::Redis(backend)
    }
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Backend::Memory($backend) => $call,
            Backend::Redis($backend) => $call,
        }
    };
}

#[async_trait]
impl CacheBackend for Backend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        dispatch!(self, b => b.get(key).await)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        dispatch!(self, b => b.set(key, value, ttl).await)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>, CacheError> {
        dispatch!(self, b => b.get_many(keys).await)
    }

    async fn set_many(
        &self,
        entries: Vec<(String, Value)>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        dispatch!(self, b => b.set_many(entries, ttl).await)
    }

    async fn delete(&self, key: &str) -> Result<i64, CacheError> {
        dispatch!(self, b => b.delete(key).await)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<i64, CacheError> {
        dispatch!(self, b => b.delete_many(keys).await)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        dispatch!(self, b => b.expire(key, ttl).await)
    }

    async fn ttl(&self, key: &str) -> Result<i64, CacheError> {
        dispatch!(self, b => b.ttl(key).await)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        dispatch!(self, b => b.exists(key).await)
    }

    async fn clear(&self, prefix: &str) -> Result<String, CacheError> {
        dispatch!(self, b => b.clear(prefix).await)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        dispatch!(self, b => b.ping().await)
    }

    async fn close(&self) -> Result<(), CacheError> {
        dispatch!(self, b => b.close().await)
    }
}

/// Builds backends from settings
#[derive(Debug, Default)]
pub struct BackendFactory;

impl BackendFactory {
    pub fn new() -> Self {
        Self
    }

    /// Creates the configured backend; a Redis backend must answer `PING`
    pub async fn create(&self, settings: &CacheSettings) -> Result<Backend, CacheError> {
        tracing::debug!(backend = %settings.backend, "Creating cache backend");

        match settings.backend {
            BackendKind::Memory => Ok(Backend::Memory(InMemoryBackend::new())),
            BackendKind::Redis => {
                let backend = RedisBackend::connect(settings.redis_config()).await?;
                Ok(Backend::Redis(backend))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("in_memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("redis".parse::<BackendKind>().unwrap(), BackendKind::Redis);
        assert_eq!("REDIS".parse::<BackendKind>().unwrap(), BackendKind::Redis);
    }

    #[test]
    fn test_backend_kind_from_str_invalid() {
        let result = "memcached".parse::<BackendKind>();
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Memory.to_string(), "memory");
        assert_eq!(BackendKind::Redis.to_string(), "redis");
    }

    #[test]
    fn test_settings_deserialize_flat_keys() {
        let json = serde_json::json!({
            "cache_backend": "redis",
            "cache_prefix": "shop:",
            "cache_host": "10.0.0.5:6380",
            "cache_password": "pw",
            "cache_db": 2
        });

        let settings: CacheSettings = serde_json::from_value(json).unwrap();

        assert_eq!(settings.backend, BackendKind::Redis);
        assert_eq!(settings.prefix, "shop:");
        assert_eq!(settings.host, "10.0.0.5:6380");
        assert_eq!(settings.password.as_deref(), Some("pw"));
        assert_eq!(settings.db, 2);
        assert_eq!(settings.connection_timeout_secs, 5);
    }

    #[test]
    fn test_settings_defaults_to_memory() {
        let settings: CacheSettings = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(settings, CacheSettings::memory());
    }

    #[test]
    fn test_redis_config_from_settings() {
        let settings = CacheSettings::redis("cache:6379")
            .with_password("secret")
            .with_db(4);

        let config = settings.redis_config();

        assert_eq!(config.host, "cache:6379");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.db, 4);
        assert_eq!(config.response_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_factory_create_memory() {
        let factory = BackendFactory::new();

        let backend = factory.create(&CacheSettings::memory()).await.unwrap();
        assert_eq!(backend.kind(), BackendKind::Memory);

        backend
            .set("test", Value::from("value"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            backend.get("test").await.unwrap(),
            Some(Value::from("value"))
        );
        assert!(backend.ping().await.is_ok());

        backend.close().await.unwrap();
        assert!(matches!(backend.ping().await, Err(CacheError::Closed)));
    }
}
