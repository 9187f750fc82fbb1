//! Notification processing.
//!
//! Drives one notification through resolve, select and decide, then
//! hands the resulting alerts to per-transport delivery queues. The
//! notification record is destroyed once processed, whatever the
//! outcome, so a notification is consumed exactly once.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::data::DataStore;
use crate::domain::{Alert, Check, Medium, Notification, State};
use crate::error::{NotifyError, Result};
use crate::queue::RecordQueue;
use crate::services::decision::DecisionEngine;
use crate::services::resolver::RuleResolver;

pub struct NotificationProcessor {
    data: DataStore,
    resolver: RuleResolver,
    engine: DecisionEngine,
    delivery: HashMap<String, RecordQueue<Alert>>,
}

impl NotificationProcessor {
    pub fn new(
        data: DataStore,
        resolver: RuleResolver,
        engine: DecisionEngine,
        delivery: HashMap<String, RecordQueue<Alert>>,
    ) -> Self {
        Self {
            data,
            resolver,
            engine,
            delivery,
        }
    }

    /// Processes one notification at `at` and destroys it.
    pub async fn process(&self, notification: &Notification, at: DateTime<Utc>) -> Result<()> {
        let result = self.dispatch(notification, at).await;
        // consumed exactly once, even when dispatch failed
        self.data.destroy::<Notification>(notification.id).await?;
        result
    }

    async fn dispatch(&self, notification: &Notification, at: DateTime<Utc>) -> Result<()> {
        let check = match self.data.find::<Check>(notification.check_id).await? {
            Some(check) => check,
            None => {
                warn!(
                    notification_id = %notification.id,
                    check_id = %notification.check_id,
                    "notification references a missing check, dropping"
                );
                return Ok(());
            }
        };
        let state = match self.data.find::<State>(notification.state_id).await? {
            Some(state) => state,
            None => {
                warn!(
                    notification_id = %notification.id,
                    state_id = %notification.state_id,
                    "notification references a missing state, dropping"
                );
                return Ok(());
            }
        };

        let resolved = match self
            .resolver
            .resolve(&check, &state, notification.severity, at)
            .await?
        {
            Some(resolved) => resolved,
            None => return Ok(()),
        };

        let alerts = self
            .engine
            .build_alerts(notification, &check, &state, &resolved, at)
            .await?;
        if alerts.is_empty() {
            info!(check = %check.name, "no alerts");
            return Ok(());
        }
        info!(check = %check.name, alerts = alerts.len(), "alerts");

        for alert in &alerts {
            let medium = match self.data.find::<Medium>(alert.medium_id).await? {
                Some(medium) => medium,
                None => {
                    warn!(alert_id = %alert.id, medium_id = %alert.medium_id, "alert's medium vanished, dropping");
                    continue;
                }
            };
            let queue = self
                .delivery
                .get(&medium.transport)
                .ok_or_else(|| NotifyError::UnknownTransport(medium.transport.clone()))?;
            info!(
                check = %check.name,
                contact_id = %medium.contact_id,
                transport = %medium.transport,
                address = %medium.address,
                rollup = %alert.rollup.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
                queue = queue.name(),
                "enqueueing alert"
            );
            queue.push(alert).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, Contact, Route, Rule};
    use crate::services::media::MediaSelector;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use std::sync::Arc;
    use vigil_store::MemoryStore;

    fn processor(data: &DataStore, transports: &[&str]) -> NotificationProcessor {
        let transport_names: Vec<String> = transports.iter().map(|t| t.to_string()).collect();
        let selector = MediaSelector::new(data.clone(), transport_names.clone());
        let engine = DecisionEngine::new(data.clone(), selector);
        let resolver = RuleResolver::new(data.clone(), Tz::UTC);
        let delivery = transport_names
            .into_iter()
            .map(|t| {
                let queue = RecordQueue::new(format!("{}_out", t), data.clone());
                (t, queue)
            })
            .collect();
        NotificationProcessor::new(data.clone(), resolver, engine, delivery)
    }

    #[tokio::test]
    async fn missing_check_drops_and_destroys_notification() {
        let data = DataStore::new(Arc::new(MemoryStore::new()));
        let processor = processor(&data, &["email"]);

        let notification = Notification::new(
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4(),
            Condition::Critical,
        );
        data.save(&notification).await.unwrap();

        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        processor.process(&notification, at).await.unwrap();

        assert!(data
            .find::<Notification>(notification.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn emitted_alert_lands_on_transport_queue() {
        let data = DataStore::new(Arc::new(MemoryStore::new()));
        let processor = processor(&data, &["email"]);

        let check = Check::new("web");
        data.save(&check).await.unwrap();
        let contact = Contact::new("ops");
        data.save(&contact).await.unwrap();
        let medium = Medium::new(contact.id, "email", "ops@example.com");
        data.save(&medium).await.unwrap();
        let rule = Rule::new(contact.id);
        data.save(&rule).await.unwrap();
        data.link_rule_medium(rule.id, medium.id).await.unwrap();
        data.bind_route(&Route::new(rule.id, check.id)).await.unwrap();

        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let state = State::new(Condition::Critical, at);
        data.save(&state).await.unwrap();
        let notification = Notification::new(check.id, state.id, Condition::Critical);
        data.save(&notification).await.unwrap();

        processor.process(&notification, at).await.unwrap();

        let delivery = RecordQueue::<Alert>::new("email_out", data.clone());
        let delivered = delivery.pop().await.unwrap().expect("alert should be queued");
        assert_eq!(delivered.check_id, check.id);
        assert!(delivery.pop().await.unwrap().is_none());
        assert!(data
            .find::<Notification>(notification.id)
            .await
            .unwrap()
            .is_none());
    }
}
