//! Cache domain - values, keys and the backend contract

mod backend;
mod key;
mod value;

pub use backend::{CacheBackend, MAX_TTL_SECS, TTL_MISSING, TTL_NO_EXPIRY};
pub use key::{make_cache_key, KeyBuilder, KEY_SEPARATOR};
pub use value::Value;

#[cfg(test)]
pub use backend::MockCacheBackend;
