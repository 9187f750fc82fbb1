//! In-memory implementation of the store trait
//!
//! Uses DashMap for lock-free concurrent access. Intended for tests; the
//! blocking list pop is a poll loop rather than a true blocking wait.

use crate::error::Result;
use crate::traits::Store;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct LockEntry {
    token: String,
    expires_at: Instant,
}

/// In-memory store with concurrent access support
#[derive(Default)]
pub struct MemoryStore {
    kv_store: DashMap<String, Bytes>,
    hash_store: DashMap<String, DashMap<String, Bytes>>,
    list_store: DashMap<String, RwLock<Vec<Bytes>>>,
    set_store: DashMap<String, DashSet<String>>,
    lock_store: DashMap<String, LockEntry>,
}

impl MemoryStore {
    /// Create new in-memory store instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.kv_store.clear();
        self.hash_store.clear();
        self.list_store.clear();
        self.set_store.clear();
        self.lock_store.clear();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.kv_store.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.kv_store.insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let had_kv = self.kv_store.remove(key).is_some();
        let had_hash = self.hash_store.remove(key).is_some();
        let had_list = self.list_store.remove(key).is_some();
        let had_set = self.set_store.remove(key).is_some();
        Ok(had_kv || had_hash || had_list || had_set)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.kv_store.contains_key(key)
            || self.hash_store.contains_key(key)
            || self.list_store.contains_key(key)
            || self.set_store.contains_key(key))
    }

    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<()> {
        self.hash_store
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        Ok(self
            .hash_store
            .get(key)
            .and_then(|h| h.get(field).map(|v| v.clone())))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        Ok(self
            .hash_store
            .get(key)
            .map(|h| {
                h.iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self
            .hash_store
            .get(key)
            .map(|h| h.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .set_store
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .set_store
            .get(key)
            .map(|s| s.remove(member).is_some())
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .set_store
            .get(key)
            .map(|s| s.iter().map(|m| m.clone()).collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .set_store
            .get(key)
            .map(|s| s.contains(member))
            .unwrap_or(false))
    }

    async fn list_rpush(&self, key: &str, value: Bytes) -> Result<()> {
        self.list_store
            .entry(key.to_string())
            .or_default()
            .write()
            .push(value);
        Ok(())
    }

    async fn list_lpop(&self, key: &str) -> Result<Option<Bytes>> {
        if let Some(list) = self.list_store.get(key) {
            let mut list = list.write();
            if !list.is_empty() {
                return Ok(Some(list.remove(0)));
            }
        }
        Ok(None)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        Ok(self.list_store.get(key).map(|l| l.read().len()).unwrap_or(0))
    }

    async fn list_blpop(
        &self,
        keys: &[&str],
        timeout_seconds: u64,
    ) -> Result<Option<(String, Bytes)>> {
        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_seconds);

        // Poll keys until timeout or data found
        loop {
            for key in keys {
                if let Some(list) = self.list_store.get(*key) {
                    let mut list = list.write();
                    if !list.is_empty() {
                        let value = list.remove(0);
                        return Ok(Some((key.to_string(), value)));
                    }
                }
            }

            if timeout_seconds > 0 && start.elapsed() >= timeout {
                return Ok(None);
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn lock_acquire(&self, key: &str, token: &str, ttl_ms: u64) -> Result<bool> {
        let entry = LockEntry {
            token: token.to_string(),
            expires_at: Instant::now() + Duration::from_millis(ttl_ms),
        };
        match self.lock_store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > Instant::now() {
                    Ok(false)
                } else {
                    occupied.insert(entry);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            }
        }
    }

    async fn lock_release(&self, key: &str, token: &str) -> Result<bool> {
        Ok(self
            .lock_store
            .remove_if(key, |_, entry| entry.token == token)
            .is_some())
    }
}
