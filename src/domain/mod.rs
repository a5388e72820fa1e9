pub mod cache;
pub mod error;

pub use cache::{make_cache_key, CacheBackend, KeyBuilder, Value};
pub use error::CacheError;
