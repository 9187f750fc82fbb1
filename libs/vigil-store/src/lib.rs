//! Shared store abstraction for the Vigil notification core
//!
//! Provides a storage trait covering the key/value, hash, set, list and
//! lock operations the notifier needs, with two backends:
//! - `RedisStore`: production Redis backend
//! - `MemoryStore`: in-memory backend for testing

pub mod error;
pub mod lock;
pub mod memory_impl;
pub mod redis_impl;
pub mod traits;

pub use error::{Result, StoreError};
pub use lock::{EntityKind, EntityLock, LockGuard, LockOptions};
pub use memory_impl::MemoryStore;
pub use redis_impl::RedisStore;
pub use traits::Store;
