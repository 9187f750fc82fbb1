//! Record-backed queues.
//!
//! A queue is a pair of lists: one holding record ids in arrival order
//! and a signal list used only for blocking waits. Producers save the
//! record, push its id, then push a signal token so consumers blocked on
//! the signal key wake exactly once per enqueued record.

use std::marker::PhantomData;
use std::time::Duration;

use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::data::{keys, DataStore, Record};
use crate::error::Result;

pub struct RecordQueue<R: Record> {
    name: String,
    data: DataStore,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for RecordQueue<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            data: self.data.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R: Record> RecordQueue<R> {
    pub fn new(name: impl Into<String>, data: DataStore) -> Self {
        Self {
            name: name.into(),
            data,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Saves the record and enqueues its id.
    pub async fn push(&self, record: &R) -> Result<()> {
        self.data.save(record).await?;
        let store = self.data.store();
        store
            .list_rpush(&keys::queue(&self.name), Bytes::from(record.id().to_string()))
            .await?;
        store
            .list_rpush(&keys::queue_signal(&self.name), Bytes::from_static(b"+"))
            .await?;
        Ok(())
    }

    /// Dequeues the next record, skipping ids whose backing record has
    /// vanished. Returns `None` when the queue is empty.
    pub async fn pop(&self) -> Result<Option<R>> {
        let store = self.data.store();
        loop {
            let raw = match store.list_lpop(&keys::queue(&self.name)).await? {
                Some(raw) => raw,
                None => return Ok(None),
            };
            let id = match std::str::from_utf8(&raw).ok().and_then(|s| Uuid::parse_str(s).ok()) {
                Some(id) => id,
                None => {
                    warn!(queue = %self.name, "discarding unparseable queue entry");
                    continue;
                }
            };
            match self.data.find::<R>(id).await? {
                Some(record) => return Ok(Some(record)),
                None => {
                    warn!(queue = %self.name, %id, kind = R::KIND, "queued record missing, skipping");
                }
            }
        }
    }

    /// Blocks until a producer signals the queue or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        let signal = keys::queue_signal(&self.name);
        self.data
            .store()
            .list_blpop(&[signal.as_str()], timeout.as_secs())
            .await?;
        Ok(())
    }
}
