//! Trait definitions for the store abstraction

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Unified storage trait for the notification core.
///
/// Combines the key/value, hash, set and list operations the notifier
/// depends on, plus the primitives for the cross-process coordination lock.
///
/// Implementations:
/// - `RedisStore`: production Redis backend
/// - `MemoryStore`: in-memory backend for testing
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // ========== Basic Key-Value Operations ==========

    /// Get value by key
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Set value for key
    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Delete key
    async fn del(&self, key: &str) -> Result<bool>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    // ========== Hash Operations ==========

    /// Set hash field
    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<()>;

    /// Get hash field
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>>;

    /// Get all hash fields
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Bytes>>;

    /// Delete hash field
    async fn hash_del(&self, key: &str, field: &str) -> Result<bool>;

    // ========== Set Operations ==========

    /// Add member to set (Redis SADD)
    ///
    /// Returns true if the member was added, false if it already existed.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove member from set (Redis SREM)
    ///
    /// Returns true if the member was removed, false if it didn't exist.
    async fn srem(&self, key: &str, member: &str) -> Result<bool>;

    /// Get all members of a set (Redis SMEMBERS)
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Check set membership (Redis SISMEMBER)
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    // ========== List Operations ==========

    /// Push value to right of list
    async fn list_rpush(&self, key: &str, value: Bytes) -> Result<()>;

    /// Pop value from left of list
    async fn list_lpop(&self, key: &str) -> Result<Option<Bytes>>;

    /// Get list length
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Block and pop value from multiple lists (Redis BLPOP)
    ///
    /// Blocks until a value is available in one of the specified lists,
    /// or until the timeout expires.
    ///
    /// # Arguments
    /// * `keys` - List of keys to wait on
    /// * `timeout_seconds` - Timeout in seconds (0 = block indefinitely)
    ///
    /// # Returns
    /// * `Some((key, value))` - The key that had data and the popped value
    /// * `None` - Timeout expired without data
    async fn list_blpop(
        &self,
        keys: &[&str],
        timeout_seconds: u64,
    ) -> Result<Option<(String, Bytes)>>;

    // ========== Lock Primitives ==========

    /// Try to acquire a lock key for `ttl_ms` milliseconds (SET NX PX)
    ///
    /// Returns true if the lock was acquired, false if another owner holds it.
    async fn lock_acquire(&self, key: &str, token: &str, ttl_ms: u64) -> Result<bool>;

    /// Release a lock key if `token` still owns it
    ///
    /// Compare-owner-then-delete; returns false when the lock had already
    /// expired or was taken over by another owner.
    async fn lock_release(&self, key: &str, token: &str) -> Result<bool>;
}
