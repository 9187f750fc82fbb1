//! Redis implementation of the store trait

use crate::error::Result;
use crate::traits::Store;
use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;

/// Redis-backed store
///
/// Uses a multiplexed `ConnectionManager`, which reconnects automatically
/// and can be cloned cheaply per operation.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING
    pub async fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(anyhow::anyhow!("Redis connection test failed").into());
        }
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value.as_ref()).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.del(key).await?;
        Ok(count > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn hash_set(&self, key: &str, field: &str, value: Bytes) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value.as_ref()).await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.hget(key, field).await?;
        Ok(value.map(Bytes::from))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Bytes>> {
        let mut conn = self.conn.clone();
        let data: HashMap<String, Vec<u8>> = conn.hgetall(key).await?;
        Ok(data.into_iter().map(|(k, v)| (k, Bytes::from(v))).collect())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.hdel(key, field).await?;
        Ok(count > 0)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let is_member: bool = conn.sismember(key, member).await?;
        Ok(is_member)
    }

    async fn list_rpush(&self, key: &str, value: Bytes) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(key, value.as_ref()).await?;
        Ok(())
    }

    async fn list_lpop(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.lpop(key, None).await?;
        Ok(value.map(Bytes::from))
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(key).await?;
        Ok(len as usize)
    }

    async fn list_blpop(
        &self,
        keys: &[&str],
        timeout_seconds: u64,
    ) -> Result<Option<(String, Bytes)>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, Vec<u8>)> =
            conn.blpop(keys, timeout_seconds as f64).await?;
        Ok(popped.map(|(key, value)| (key, Bytes::from(value))))
    }

    async fn lock_acquire(&self, key: &str, token: &str, ttl_ms: u64) -> Result<bool> {
        let mut conn = self.conn.clone();
        // SET with NX and PX for atomic lock acquisition
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn lock_release(&self, key: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        // Lua compare-and-delete, so a lock that expired and was re-acquired
        // by another owner is never released from here
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#,
        );
        let deleted: i64 = script.key(key).arg(token).invoke_async(&mut conn).await?;
        Ok(deleted > 0)
    }
}
