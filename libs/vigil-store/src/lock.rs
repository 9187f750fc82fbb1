//! Cross-process coordination lock
//!
//! The notifier mutates several entity types together (route alerting flags,
//! medium association sets, rollup bookkeeping, alert creation). Concurrent
//! workers sharing the same store must serialize that block, so the lock key
//! covers the set of entity kinds mutated rather than individual rows.

use crate::error::{Result, StoreError};
use crate::traits::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

const LOCK_PREFIX: &str = "vigil:lock:";

/// Entity kinds that can be covered by a coordination lock scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    Alert,
    Check,
    Contact,
    Medium,
    Notification,
    Route,
    Rule,
    State,
}

impl EntityKind {
    /// Every entity kind, for a whole-scope lock
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Alert,
        EntityKind::Check,
        EntityKind::Contact,
        EntityKind::Medium,
        EntityKind::Notification,
        EntityKind::Route,
        EntityKind::Rule,
        EntityKind::State,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Alert => "alert",
            EntityKind::Check => "check",
            EntityKind::Contact => "contact",
            EntityKind::Medium => "medium",
            EntityKind::Notification => "notification",
            EntityKind::Route => "route",
            EntityKind::Rule => "rule",
            EntityKind::State => "state",
        }
    }
}

/// Acquisition tuning for an entity lock
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// How long an acquired lock is held before it expires on its own.
    /// Must exceed the worst-case duration of the locked block.
    pub ttl: Duration,
    /// Maximum acquisition attempts before giving up
    pub max_retries: u32,
    /// Delay between acquisition attempts
    pub retry_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(120),
            max_retries: 600,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Distributed mutual-exclusion scope keyed by entity kinds
pub struct EntityLock {
    store: Arc<dyn Store>,
    key: String,
    options: LockOptions,
}

impl EntityLock {
    /// Create a lock over the given entity kinds.
    ///
    /// The key is derived from the sorted, deduplicated kind names, so two
    /// workers locking the same set of kinds always contend on one key.
    pub fn new(store: Arc<dyn Store>, kinds: &[EntityKind], options: LockOptions) -> Self {
        let mut kinds: Vec<EntityKind> = kinds.to_vec();
        kinds.sort();
        kinds.dedup();
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        Self {
            store,
            key: format!("{}{}", LOCK_PREFIX, names.join("+")),
            options,
        }
    }

    /// Acquire the lock, retrying with a fixed delay up to the configured
    /// attempt budget. Times out with `StoreError::LockTimeout`.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let token = Uuid::new_v4().to_string();
        let ttl_ms = self.options.ttl.as_millis() as u64;

        for attempt in 0..=self.options.max_retries {
            if self.store.lock_acquire(&self.key, &token, ttl_ms).await? {
                return Ok(LockGuard {
                    store: self.store.clone(),
                    key: self.key.clone(),
                    token,
                    released: false,
                });
            }
            if attempt < self.options.max_retries {
                tokio::time::sleep(self.options.retry_delay).await;
            }
        }

        Err(StoreError::LockTimeout {
            key: self.key.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Held coordination lock; must be released explicitly on every exit path
pub struct LockGuard {
    store: Arc<dyn Store>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    /// Release the lock. Returns Ok even when the lock had already expired
    /// (that case is logged, not an error, since the block has completed).
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        let owned = self.store.lock_release(&self.key, &self.token).await?;
        if !owned {
            warn!(key = %self.key, "lock expired before release; consider raising the lock TTL");
        }
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            // the TTL is the backstop here; the key will expire on its own
            warn!(key = %self.key, "lock guard dropped without release");
        }
    }
}
