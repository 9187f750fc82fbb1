//! Alert decision engine.
//!
//! For each alertable medium, decides whether this state transition
//! becomes an Alert or gets suppressed. The decision folds together
//! maintenance windows, rollup aggregation, per-medium re-notify
//! intervals and last-delivered-state dedup.
//!
//! Write ordering on emit matters: the alert is persisted first, then
//! the medium's alerting-check membership, histories and bookkeeping.
//! A failed alert save therefore never leaves the medium claiming to
//! have delivered something it hasn't.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::data::DataStore;
use crate::domain::{
    Action, Alert, Check, Condition, Medium, Notification, Rollup, State,
};
use crate::error::{NotifyError, Result};
use crate::services::media::MediaSelector;
use crate::services::resolver::ResolvedRules;
use uuid::Uuid;

/// Staged change to a medium's alerting-check set. Staged in memory so
/// the rollup count reflects this notification, persisted only after
/// the emit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Add,
    Remove,
    Keep,
}

pub struct DecisionEngine {
    data: DataStore,
    media: MediaSelector,
}

impl DecisionEngine {
    pub fn new(data: DataStore, media: MediaSelector) -> Self {
        Self { data, media }
    }

    /// Produces the alerts this state transition warrants, updating
    /// route and medium bookkeeping as a side effect.
    pub async fn build_alerts(
        &self,
        notification: &Notification,
        check: &Check,
        state: &State,
        resolved: &ResolvedRules,
        at: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        let in_sched = check.in_scheduled_maintenance(at);
        let in_unsched = check.in_unscheduled_maintenance(at);
        let is_test = state.action == Some(Action::TestNotifications);
        let is_ack = state.action == Some(Action::Acknowledgement);

        let failure = !(state.condition.healthy() || in_sched || in_unsched);
        let ok = is_ack || state.condition.healthy();

        debug!(
            check = %check.name,
            condition = %state.condition,
            failure,
            ok,
            is_test,
            in_sched,
            in_unsched,
            "deciding"
        );

        if !is_test {
            for route in &resolved.routes {
                if route.is_alerting != failure {
                    let mut updated = route.clone();
                    updated.is_alerting = failure;
                    self.data.save(&updated).await?;
                }
            }
        }

        let media = self.media.alertable_media(&resolved.rules).await?;
        let mut alerts = Vec::new();
        for medium in media {
            if let Some(alert) = self
                .decide_for_medium(notification, check, state, &medium, failure, ok, is_test, at)
                .await?
            {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }

    #[allow(clippy::too_many_arguments)]
    async fn decide_for_medium(
        &self,
        notification: &Notification,
        check: &Check,
        state: &State,
        medium: &Medium,
        failure: bool,
        ok: bool,
        is_test: bool,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let alerting = self.data.alerting_check_ids(medium.id).await?;

        let membership = if failure && !alerting.contains(&check.id) {
            Membership::Add
        } else if ok && alerting.contains(&check.id) {
            Membership::Remove
        } else {
            Membership::Keep
        };

        let mut effective = alerting;
        match membership {
            Membership::Add => {
                effective.insert(check.id);
            }
            Membership::Remove => {
                effective.remove(&check.id);
            }
            Membership::Keep => {}
        }

        // disabled checks keep their membership but don't count toward
        // the rollup threshold
        let mut alerting_checks = Vec::new();
        for id in &effective {
            if let Some(c) = self.data.find::<Check>(*id).await? {
                if c.enabled {
                    alerting_checks.push(c);
                }
            }
        }
        let alerting_count = alerting_checks.len() as u32;

        let rollup = match medium.rollup_threshold {
            Some(threshold) if alerting_count >= threshold => Some(Rollup::Problem),
            _ if medium.last_rollup_type == Some(Rollup::Problem) => Some(Rollup::Recovery),
            _ => None,
        };

        let last_state = match medium.last_state_id {
            Some(id) => self.data.find::<State>(id).await?,
            None => None,
        };
        let last_state_ok = last_state
            .as_ref()
            .map(|last| last.ok())
            .unwrap_or(false);

        let interval = i64::from(medium.interval.unwrap_or(0));
        let interval_allows = match &last_state {
            None => true,
            Some(last) => {
                !last_state_ok
                    && failure
                    && last.created_at + Duration::seconds(interval) < state.created_at
            }
        };

        let condition_changed = last_state
            .as_ref()
            .map(|last| last.condition != state.condition)
            .unwrap_or(false);
        let last_was_ack = last_state
            .as_ref()
            .map(|last| last.action == Some(Action::Acknowledgement))
            .unwrap_or(false);

        let emit = is_test
            || last_state.is_none()
            || (!last_state_ok && ok)
            || rollup != medium.last_rollup_type
            || (last_was_ack && failure)
            || condition_changed
            || interval_allows;

        if !emit {
            self.apply_membership(medium.id, check.id, membership).await?;
            debug!(
                check = %check.name,
                transport = %medium.transport,
                address = %medium.address,
                "alert suppressed"
            );
            return Ok(None);
        }

        let rollup_states = if rollup.is_some() && !alerting_checks.is_empty() {
            let mut grouped: BTreeMap<Condition, Vec<String>> = BTreeMap::new();
            for c in &alerting_checks {
                grouped.entry(c.condition).or_default().push(c.name.clone());
            }
            for names in grouped.values_mut() {
                names.sort();
            }
            Some(grouped)
        } else {
            None
        };

        let alert = Alert {
            id: Uuid::new_v4(),
            medium_id: medium.id,
            check_id: check.id,
            condition: state.condition,
            action: state.action,
            last_condition: last_state.as_ref().map(|last| last.condition),
            last_action: last_state.as_ref().and_then(|last| last.action),
            condition_duration: notification.condition_duration,
            acknowledgement_duration: notification.duration,
            rollup,
            rollup_states,
            created_at: at,
        };

        self.data.save(&alert).await.map_err(|source| {
            NotifyError::AlertPersistence {
                id: alert.id,
                transport: medium.transport.clone(),
                address: medium.address.clone(),
                source: Box::new(source),
            }
        })?;

        self.apply_membership(medium.id, check.id, membership).await?;
        self.data.append_alert_history(&alert).await?;

        info!(
            check = %check.name,
            transport = %medium.transport,
            address = %medium.address,
            notification_type = Alert::notification_type(state.action, state.condition),
            rollup = %alert.rollup.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
            "alert emitted"
        );

        if !is_test {
            let dirty = medium.last_state_id != Some(state.id)
                || medium.last_rollup_type != alert.rollup;
            if dirty {
                let mut updated = medium.clone();
                updated.last_state_id = Some(state.id);
                updated.last_rollup_type = alert.rollup;
                self.data.save(&updated).await?;
            }
        }

        Ok(Some(alert))
    }

    async fn apply_membership(
        &self,
        medium_id: Uuid,
        check_id: Uuid,
        membership: Membership,
    ) -> Result<()> {
        match membership {
            Membership::Add => self.data.add_alerting_check(medium_id, check_id).await,
            Membership::Remove => self.data.remove_alerting_check(medium_id, check_id).await,
            Membership::Keep => Ok(()),
        }
    }
}
