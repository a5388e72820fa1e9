//! Cache infrastructure - backend implementations

mod clock;
mod factory;
mod in_memory;
mod redis;

pub use clock::{Clock, ManualClock, SystemClock};
pub use factory::{Backend, BackendFactory, BackendKind, CacheSettings};
pub use in_memory::InMemoryBackend;
pub use redis::{RedisBackend, RedisBackendConfig};
