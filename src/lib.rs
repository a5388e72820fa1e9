//! cachekit
//!
//! A small caching facade with two interchangeable backends:
//! - an in-process map with lazy TTL expiry
//! - a Redis server reached through a managed connection
//!
//! On top of the facade, [`Memoized`] turns a fallible async computation
//! into one whose successful results are cached under deterministic,
//! versioned keys.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::cache::{
    make_cache_key, CacheBackend, KeyBuilder, Value, KEY_SEPARATOR, MAX_TTL_SECS, TTL_MISSING,
    TTL_NO_EXPIRY,
};
pub use domain::CacheError;
pub use infrastructure::cache::{
    Backend, BackendFactory, BackendKind, CacheSettings, Clock, InMemoryBackend, ManualClock,
    RedisBackend, RedisBackendConfig, SystemClock,
};
pub use infrastructure::services::{
    CacheService, MemoizeError, MemoizeOptions, Memoized, PrimitiveResult, ResultShape,
};

/// Shorthand for the facade over the configured backend
pub type Cache<B = Backend> = CacheService<B>;
