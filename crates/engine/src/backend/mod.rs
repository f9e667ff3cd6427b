//! Concrete [`Persistence`](orchestrator_core::Persistence) implementations.
//!
//! `memory` backs unit and integration tests; `redis` is the distributed
//! backend used in production, selected at the CLI/daemon boundary by the
//! presence of a `redis_url` setting.

pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use memory::InMemoryBackend;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisBackend;
