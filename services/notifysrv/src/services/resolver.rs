//! Rule resolution.
//!
//! Walks from a check to the rules that currently apply: routes bind
//! checks to rules, rules filter by severity, and each rule's schedule
//! is evaluated in its contact's timezone. A check with no surviving
//! rules produces no alerts at all.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::data::DataStore;
use crate::domain::{Alert, Check, Condition, Contact, Route, Rule, State};
use crate::error::Result;

/// Rules that apply to one notification, with the routes that bound them.
#[derive(Debug, Clone)]
pub struct ResolvedRules {
    pub rules: Vec<Rule>,
    pub routes: Vec<Route>,
}

pub struct RuleResolver {
    data: DataStore,
    default_tz: Tz,
}

impl RuleResolver {
    pub fn new(data: DataStore, default_tz: Tz) -> Self {
        Self { data, default_tz }
    }

    /// Resolves the rules applying to `check` for a notification of
    /// `severity` at `at`. Returns `None` when nothing applies, which is
    /// an ordinary outcome, not an error.
    pub async fn resolve(
        &self,
        check: &Check,
        state: &State,
        severity: Condition,
        at: DateTime<Utc>,
    ) -> Result<Option<ResolvedRules>> {
        let (matching, routes) = self.data.matching_rules(check.id, severity).await?;
        if matching.is_empty() {
            info!(
                check = %check.name,
                notification_type = Alert::notification_type(state.action, severity),
                "NO RULES"
            );
            return Ok(None);
        }

        let mut rules = Vec::with_capacity(matching.len());
        for rule in matching {
            match self.contact_tz(&rule).await? {
                Some(tz) if rule.is_occurring_at(at, tz) => rules.push(rule),
                Some(_) => debug!(rule_id = %rule.id, "rule schedule does not cover this time"),
                None => {}
            }
        }

        if rules.is_empty() {
            info!(
                check = %check.name,
                notification_type = Alert::notification_type(state.action, severity),
                "NO RULES"
            );
            return Ok(None);
        }

        let routes = routes
            .into_iter()
            .filter(|route| rules.iter().any(|rule| rule.id == route.rule_id))
            .collect::<Vec<_>>();

        debug!(check = %check.name, rules = rules.len(), "rules resolved");
        Ok(Some(ResolvedRules { rules, routes }))
    }

    /// The timezone a rule's schedule is evaluated in. Unparseable
    /// timezone strings fall back to the configured default; a rule whose
    /// contact record cannot be loaded is dropped entirely (`None`).
    async fn contact_tz(&self, rule: &Rule) -> Result<Option<Tz>> {
        let contact = match self.data.find::<Contact>(rule.contact_id).await? {
            Some(contact) => contact,
            None => {
                warn!(rule_id = %rule.id, contact_id = %rule.contact_id, "rule's contact is missing, dropping rule");
                return Ok(None);
            }
        };
        match contact.time_zone() {
            Some(Ok(tz)) => Ok(Some(tz)),
            Some(Err(name)) => {
                warn!(contact = %contact.name, timezone = %name, "unparseable contact timezone, using default");
                Ok(Some(self.default_tz))
            }
            None => Ok(Some(self.default_tz)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Condition, Schedule, TimeWindow};
    use chrono::{NaiveTime, TimeZone, Weekday};
    use std::sync::Arc;
    use vigil_store::MemoryStore;

    fn resolver() -> (RuleResolver, DataStore) {
        let data = DataStore::new(Arc::new(MemoryStore::new()));
        (RuleResolver::new(data.clone(), Tz::UTC), data)
    }

    async fn seed_rule(data: &DataStore, check: &Check, rule: &Rule) {
        data.save(rule).await.unwrap();
        data.bind_route(&Route::new(rule.id, check.id)).await.unwrap();
    }

    #[tokio::test]
    async fn check_without_routes_resolves_to_nothing() {
        let (resolver, data) = resolver();
        let check = Check::new("orphan");
        data.save(&check).await.unwrap();

        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let state = State::new(Condition::Critical, at);
        assert!(resolver.resolve(&check, &state, state.condition, at).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn severity_filter_drops_rules() {
        let (resolver, data) = resolver();
        let check = Check::new("api");
        data.save(&check).await.unwrap();
        let contact = Contact::new("ops");
        data.save(&contact).await.unwrap();

        let mut rule = Rule::new(contact.id);
        rule.severities = vec![Condition::Critical];
        seed_rule(&data, &check, &rule).await;

        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let warning = State::new(Condition::Warning, at);
        assert!(resolver.resolve(&check, &warning, warning.condition, at).await.unwrap().is_none());

        let critical = State::new(Condition::Critical, at);
        let resolved = resolver.resolve(&check, &critical, critical.condition, at).await.unwrap().unwrap();
        assert_eq!(resolved.rules.len(), 1);
        assert_eq!(resolved.routes.len(), 1);
    }

    #[tokio::test]
    async fn schedule_is_evaluated_in_contact_timezone() {
        let (resolver, data) = resolver();
        let check = Check::new("db");
        data.save(&check).await.unwrap();

        let mut contact = Contact::new("sydney");
        contact.timezone = Some("Australia/Sydney".to_string());
        data.save(&contact).await.unwrap();

        let mut rule = Rule::new(contact.id);
        rule.schedule = Some(Schedule {
            windows: vec![TimeWindow {
                days: vec![Weekday::Mon],
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            }],
        });
        seed_rule(&data, &check, &rule).await;

        // Sunday 23:30 UTC is Monday 10:30 in Sydney (AEDT, UTC+11).
        let inside = Utc.with_ymd_and_hms(2024, 3, 3, 23, 30, 0).unwrap();
        let state = State::new(Condition::Critical, inside);
        assert!(resolver.resolve(&check, &state, state.condition, inside).await.unwrap().is_some());

        // Monday 10:30 UTC is Monday 21:30 in Sydney, outside the window.
        let outside = Utc.with_ymd_and_hms(2024, 3, 4, 10, 30, 0).unwrap();
        assert!(resolver.resolve(&check, &state, state.condition, outside).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bad_contact_timezone_falls_back_to_default() {
        let (resolver, data) = resolver();
        let check = Check::new("cache");
        data.save(&check).await.unwrap();

        let mut contact = Contact::new("typo");
        contact.timezone = Some("Not/AZone".to_string());
        data.save(&contact).await.unwrap();

        let mut rule = Rule::new(contact.id);
        rule.schedule = Some(Schedule {
            windows: vec![TimeWindow {
                days: vec![Weekday::Mon],
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            }],
        });
        seed_rule(&data, &check, &rule).await;

        // Monday 10:00 UTC falls inside the window under the UTC default.
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let state = State::new(Condition::Critical, at);
        assert!(resolver.resolve(&check, &state, state.condition, at).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn severity_filter_uses_the_notification_severity() {
        let (resolver, data) = resolver();
        let check = Check::new("lb");
        data.save(&check).await.unwrap();
        let contact = Contact::new("ops");
        data.save(&contact).await.unwrap();

        let mut rule = Rule::new(contact.id);
        rule.severities = vec![Condition::Warning];
        seed_rule(&data, &check, &rule).await;

        // the notification was raised at warning even though the check has
        // since moved to critical; the warning-scoped rule still applies
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let state = State::new(Condition::Critical, at);
        let resolved = resolver
            .resolve(&check, &state, Condition::Warning, at)
            .await
            .unwrap();
        assert!(resolved.is_some());

        assert!(resolver
            .resolve(&check, &state, Condition::Critical, at)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rule_with_missing_contact_is_dropped() {
        let (resolver, data) = resolver();
        let check = Check::new("dangling");
        data.save(&check).await.unwrap();

        // the rule's contact was never saved
        let rule = Rule::new(uuid::Uuid::new_v4());
        seed_rule(&data, &check, &rule).await;

        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let state = State::new(Condition::Critical, at);
        assert!(resolver
            .resolve(&check, &state, state.condition, at)
            .await
            .unwrap()
            .is_none());
    }
}
