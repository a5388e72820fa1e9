//! Infrastructure services

mod cache_service;
mod memoize;

pub use cache_service::CacheService;
pub use memoize::{MemoizeError, MemoizeOptions, Memoized, PrimitiveResult, ResultShape};
