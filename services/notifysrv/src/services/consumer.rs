//! Queue consumer loop.
//!
//! The notifier drains its input queue in batches under a store-wide
//! entity lock, then blocks on the queue's signal key until more work
//! arrives or shutdown is requested. Holding the lock across a whole
//! batch keeps route, medium and membership updates from interleaving
//! with other writers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_store::{EntityKind, EntityLock, LockOptions, Store};

use crate::config::NotifyConfig;
use crate::data::DataStore;
use crate::domain::Notification;
use crate::error::Result;
use crate::queue::RecordQueue;
use crate::services::decision::DecisionEngine;
use crate::services::media::MediaSelector;
use crate::services::processor::NotificationProcessor;
use crate::services::resolver::RuleResolver;

pub struct Notifier {
    config: NotifyConfig,
    input: RecordQueue<Notification>,
    processor: NotificationProcessor,
    lock: EntityLock,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>, config: NotifyConfig) -> Result<Self> {
        config.validate()?;

        let data = DataStore::new(store.clone());
        let input = RecordQueue::new(config.queue.name.clone(), data.clone());

        let resolver = RuleResolver::new(data.clone(), config.default_timezone());
        let selector = MediaSelector::new(data.clone(), config.transports());
        let engine = DecisionEngine::new(data.clone(), selector);

        let delivery = config
            .queues
            .iter()
            .map(|(transport, queue_name)| {
                (
                    transport.clone(),
                    RecordQueue::new(queue_name.clone(), data.clone()),
                )
            })
            .collect::<HashMap<_, _>>();
        let processor = NotificationProcessor::new(data, resolver, engine, delivery);

        let lock = EntityLock::new(
            store,
            &EntityKind::ALL,
            LockOptions {
                ttl: config.lock_ttl(),
                max_retries: config.lock.max_retries,
                retry_delay: config.lock_retry_delay(),
            },
        );

        Ok(Self {
            config,
            input,
            processor,
            lock,
        })
    }

    /// Runs until `shutdown` is cancelled. Pending work in the current
    /// batch finishes before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(queue = self.input.name(), "notifier started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let guard = self.lock.acquire().await?;
            let drained = self.drain().await;
            if let Err(e) = guard.release().await {
                warn!(error = %e, "failed to release entity lock");
            }
            let processed = drained?;
            if processed > 0 {
                debug!(processed, "batch drained");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.input.wait(self.config.wait_timeout()) => result?,
            }
        }
        info!("notifier stopped");
        Ok(())
    }

    /// Processes everything currently queued, returning the count.
    async fn drain(&self) -> Result<usize> {
        let mut processed = 0;
        while let Some(notification) = self.input.pop().await? {
            self.processor.process(&notification, Utc::now()).await?;
            processed += 1;
        }
        Ok(processed)
    }
}
