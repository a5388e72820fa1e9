//! Memoization of fallible async computations on top of [`CacheService`]

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::cache_service::CacheService;
use crate::domain::cache::{CacheBackend, KeyBuilder, MAX_TTL_SECS};
use crate::domain::CacheError;

/// Error returned by a memoized call
#[derive(Debug, Error)]
pub enum MemoizeError<E> {
    /// Key derivation, lookup or store failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The wrapped computation failed; nothing was cached
    #[error("Computation failed: {0}")]
    Computation(E),
}

impl<E> MemoizeError<E> {
    pub fn is_cache(&self) -> bool {
        matches!(self, Self::Cache(_))
    }

    /// Returns the computation's own error, if that is what failed
    pub fn into_computation(self) -> Option<E> {
        match self {
            Self::Computation(err) => Some(err),
            Self::Cache(_) => None,
        }
    }
}

/// How results are kept in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Integers, bools and strings, stored natively
    Primitive,
    /// Structs and maps, stored as JSON text
    Struct,
}

mod sealed {
    pub trait Sealed {}
}

/// Result types that [`CacheService::memoize`] stores natively: integers,
/// bools, strings and options of those. Anything else goes through
/// [`CacheService::memoize_struct`].
pub trait PrimitiveResult: Serialize + DeserializeOwned + sealed::Sealed {}

macro_rules! primitive_result {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl PrimitiveResult for $ty {}
        )*
    };
}

primitive_result!(i8, i16, i32, i64, u8, u16, u32, u64, bool, String);

impl<T: PrimitiveResult> sealed::Sealed for Option<T> {}
impl<T: PrimitiveResult> PrimitiveResult for Option<T> {}

/// Options for wrapping a computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoizeOptions {
    /// Stable name of the computation; the first key segment
    pub identity: String,
    /// Zero keeps results until evicted
    pub ttl_secs: u64,
    /// Bump to invalidate every result computed by an older implementation
    pub version: i64,
}

impl MemoizeOptions {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ttl_secs: 0,
            version: 0,
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }
}

impl<B: CacheBackend> CacheService<B> {
    /// Wraps `f` so its primitive results are cached per argument list
    pub fn memoize<F, A, T, Fut, E>(
        self: &Arc<Self>,
        options: MemoizeOptions,
        f: F,
    ) -> Result<Memoized<B, F, A, T>, CacheError>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        A: Serialize,
        T: PrimitiveResult,
    {
        Memoized::new(Arc::clone(self), options, ResultShape::Primitive, f)
    }

    /// Wraps `f` so its struct results are cached per argument list
    pub fn memoize_struct<F, A, T, Fut, E>(
        self: &Arc<Self>,
        options: MemoizeOptions,
        f: F,
    ) -> Result<Memoized<B, F, A, T>, CacheError>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        A: Serialize,
        T: Serialize + DeserializeOwned,
    {
        Memoized::new(Arc::clone(self), options, ResultShape::Struct, f)
    }
}

/// A computation whose successful results are served from the cache.
///
/// Failed computations and results that serialize to null are never stored.
/// Concurrent misses for the same key each run the computation; the last
/// write wins.
pub struct Memoized<B: CacheBackend, F, A, T> {
    cache: Arc<CacheService<B>>,
    keys: KeyBuilder,
    ttl_secs: u64,
    shape: ResultShape,
    f: F,
    _marker: PhantomData<fn(A) -> T>,
}

impl<B: CacheBackend, F, A, T> fmt::Debug for Memoized<B, F, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("identity", &self.keys.identity())
            .field("version", &self.keys.version())
            .field("ttl_secs", &self.ttl_secs)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

impl<B, F, A, T, Fut, E> Memoized<B, F, A, T>
where
    B: CacheBackend,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    A: Serialize,
    T: Serialize + DeserializeOwned,
{
    fn new(
        cache: Arc<CacheService<B>>,
        options: MemoizeOptions,
        shape: ResultShape,
        f: F,
    ) -> Result<Self, CacheError> {
        if options.identity.trim().is_empty() {
            return Err(CacheError::invalid_computation(
                "memoized computation needs a non-empty identity",
            ));
        }

        if options.ttl_secs > MAX_TTL_SECS {
            return Err(CacheError::validation(format!(
                "TTL of {}s exceeds the maximum of {}s",
                options.ttl_secs, MAX_TTL_SECS
            )));
        }

        Ok(Self {
            cache,
            keys: KeyBuilder::new(options.identity).with_version(options.version),
            ttl_secs: options.ttl_secs,
            shape,
            f,
            _marker: PhantomData,
        })
    }

    pub fn identity(&self) -> &str {
        self.keys.identity()
    }

    pub fn version(&self) -> i64 {
        self.keys.version()
    }

    /// Cache key used for `args`, before the service prefix is applied
    pub fn key(&self, args: &A) -> Result<String, CacheError> {
        self.keys.build(args)
    }

    /// Drops the cached result for `args`; returns whether one existed
    pub async fn invalidate(&self, args: &A) -> Result<bool, CacheError> {
        let key = self.key(args)?;
        Ok(self.cache.delete(&key).await? > 0)
    }

    /// Returns the cached result for `args`, computing and storing it on a miss
    pub async fn call(&self, args: A) -> Result<T, MemoizeError<E>> {
        let key = self.key(&args)?;

        if let Some(cached) = self.lookup(&key).await? {
            tracing::debug!(identity = self.identity(), key = %key, "Cache hit for memoized call");
            return Ok(cached);
        }

        tracing::debug!(identity = self.identity(), key = %key, "Cache miss, invoking computation");

        let value = (self.f)(args).await.map_err(MemoizeError::Computation)?;

        if serde_json::to_value(&value).map_err(CacheError::from)?.is_null() {
            tracing::debug!(identity = self.identity(), key = %key, "Empty result, not caching");
            return Ok(value);
        }

        if let Err(err) = self.store(&key, &value).await {
            tracing::warn!(
                identity = self.identity(),
                key = %key,
                error = %err,
                "Failed to store memoized result"
            );
            return Err(err.into());
        }

        Ok(value)
    }

    async fn lookup(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.shape {
            ResultShape::Primitive => self.cache.get_as(key).await,
            ResultShape::Struct => self.cache.get_struct(key).await,
        }
    }

    async fn store(&self, key: &str, value: &T) -> Result<(), CacheError> {
        match self.shape {
            ResultShape::Primitive => self.cache.set(key, value, self.ttl_secs).await,
            ResultShape::Struct => self.cache.set_struct(key, value, self.ttl_secs).await,
        }
    }
}
