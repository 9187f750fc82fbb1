//! Record persistence on top of the key-value store.
//!
//! Each record is a hash at `vigil:{kind}:{id}` whose `data` field holds
//! the JSON-serialized struct. Associations are plain sets so membership
//! checks and unions stay cheap.

pub mod keys;

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;
use vigil_store::Store;

use crate::domain::{Alert, Check, Condition, Contact, Medium, Notification, Route, Rule, State};
use crate::error::Result;

const DATA_FIELD: &str = "data";

/// A persistable entity with a stable kind name and id.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const KIND: &'static str;

    fn id(&self) -> Uuid;
}

impl Record for Alert {
    const KIND: &'static str = "alert";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Check {
    const KIND: &'static str = "check";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Contact {
    const KIND: &'static str = "contact";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Medium {
    const KIND: &'static str = "medium";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Notification {
    const KIND: &'static str = "notification";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Route {
    const KIND: &'static str = "route";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Rule {
    const KIND: &'static str = "rule";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for State {
    const KIND: &'static str = "state";
    fn id(&self) -> Uuid {
        self.id
    }
}

/// The media reachable through one rule, with its blackhole flag.
#[derive(Debug, Clone)]
pub struct RuleMedia {
    pub rule_id: Uuid,
    pub is_blackhole: bool,
    pub media: HashSet<Uuid>,
}

/// Typed record access over a [`Store`].
#[derive(Clone)]
pub struct DataStore {
    store: Arc<dyn Store>,
}

impl DataStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub async fn find<R: Record>(&self, id: Uuid) -> Result<Option<R>> {
        let key = keys::record(R::KIND, id);
        match self.store.hash_get(&key, DATA_FIELD).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Loads the records that exist; ids without a backing hash are
    /// logged and skipped.
    pub async fn find_many<R: Record>(&self, ids: &[Uuid]) -> Result<Vec<R>> {
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.find::<R>(id).await? {
                Some(record) => records.push(record),
                None => warn!(kind = R::KIND, %id, "record missing, skipping"),
            }
        }
        Ok(records)
    }

    pub async fn save<R: Record>(&self, record: &R) -> Result<()> {
        let key = keys::record(R::KIND, record.id());
        let raw = Bytes::from(serde_json::to_vec(record)?);
        self.store.hash_set(&key, DATA_FIELD, raw).await?;
        Ok(())
    }

    pub async fn destroy<R: Record>(&self, id: Uuid) -> Result<()> {
        self.store.del(&keys::record(R::KIND, id)).await?;
        Ok(())
    }

    /// Saves a route and registers it against its check.
    pub async fn bind_route(&self, route: &Route) -> Result<()> {
        self.save(route).await?;
        self.store
            .sadd(&keys::check_routes(route.check_id), &route.id.to_string())
            .await?;
        Ok(())
    }

    pub async fn routes_for_check(&self, check_id: Uuid) -> Result<Vec<Route>> {
        let ids = self.set_ids(&keys::check_routes(check_id)).await?;
        self.find_many(&ids).await
    }

    /// Links a medium to a rule so it becomes a delivery candidate.
    pub async fn link_rule_medium(&self, rule_id: Uuid, medium_id: Uuid) -> Result<()> {
        self.store
            .sadd(&keys::rule_media(rule_id), &medium_id.to_string())
            .await?;
        Ok(())
    }

    pub async fn media_for_rules(&self, rules: &[Rule]) -> Result<Vec<RuleMedia>> {
        let mut out = Vec::with_capacity(rules.len());
        for rule in rules {
            let ids = self.set_ids(&keys::rule_media(rule.id)).await?;
            out.push(RuleMedia {
                rule_id: rule.id,
                is_blackhole: rule.is_blackhole,
                media: ids.into_iter().collect(),
            });
        }
        Ok(out)
    }

    pub async fn alerting_check_ids(&self, medium_id: Uuid) -> Result<HashSet<Uuid>> {
        let ids = self.set_ids(&keys::medium_alerting_checks(medium_id)).await?;
        Ok(ids.into_iter().collect())
    }

    pub async fn add_alerting_check(&self, medium_id: Uuid, check_id: Uuid) -> Result<()> {
        self.store
            .sadd(&keys::medium_alerting_checks(medium_id), &check_id.to_string())
            .await?;
        Ok(())
    }

    pub async fn remove_alerting_check(&self, medium_id: Uuid, check_id: Uuid) -> Result<()> {
        self.store
            .srem(&keys::medium_alerting_checks(medium_id), &check_id.to_string())
            .await?;
        Ok(())
    }

    /// Appends an alert id to the medium and check histories.
    pub async fn append_alert_history(&self, alert: &Alert) -> Result<()> {
        let id = Bytes::from(alert.id.to_string());
        self.store
            .list_rpush(&keys::medium_alerts(alert.medium_id), id.clone())
            .await?;
        self.store
            .list_rpush(&keys::check_alerts(alert.check_id), id)
            .await?;
        Ok(())
    }

    /// Rules attached to a check through its routes, keeping only those
    /// whose severity filter covers `severity`. Duplicate rules reached
    /// through multiple routes collapse to one entry.
    pub async fn matching_rules(
        &self,
        check_id: Uuid,
        severity: Condition,
    ) -> Result<(Vec<Rule>, Vec<Route>)> {
        let routes = self.routes_for_check(check_id).await?;
        let mut seen = HashSet::new();
        let mut rules = Vec::new();
        for route in &routes {
            if !seen.insert(route.rule_id) {
                continue;
            }
            if let Some(rule) = self.find::<Rule>(route.rule_id).await? {
                if rule.covers_severity(severity) {
                    rules.push(rule);
                }
            } else {
                warn!(rule_id = %route.rule_id, "route points at a missing rule");
            }
        }
        Ok((rules, routes))
    }

    async fn set_ids(&self, key: &str) -> Result<Vec<Uuid>> {
        let members = self.store.smembers(key).await?;
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match Uuid::parse_str(&member) {
                Ok(id) => ids.push(id),
                Err(_) => warn!(key, member, "discarding unparseable set member"),
            }
        }
        Ok(ids)
    }
}
