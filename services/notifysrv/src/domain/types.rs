//! Entity types shared across the notification pipeline

use crate::domain::schedule::Schedule;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Health classification of a check
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Condition {
    /// Only `ok` counts as healthy; `unknown` is treated as unhealthy
    pub fn healthy(self) -> bool {
        matches!(self, Condition::Ok)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Ok => "ok",
            Condition::Warning => "warning",
            Condition::Critical => "critical",
            Condition::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator action attached to a state record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A person acknowledged the problem
    Acknowledgement,
    /// A test notification, bypasses throttling and bookkeeping
    TestNotifications,
}

/// Rollup classification of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rollup {
    /// Enough checks are alerting on this medium to aggregate
    Problem,
    /// The medium was rolled up and the count has since dropped
    Recovery,
}

impl fmt::Display for Rollup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rollup::Problem => f.write_str("problem"),
            Rollup::Recovery => f.write_str("recovery"),
        }
    }
}

/// A point-in-time condition record for a check. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub id: Uuid,
    pub condition: Condition,
    pub action: Option<Action>,
    pub created_at: DateTime<Utc>,
}

impl State {
    pub fn new(condition: Condition, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            condition,
            action: None,
            created_at,
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Whether this state reads as resolved: healthy or acknowledged
    pub fn ok(&self) -> bool {
        self.condition.healthy() || matches!(self.action, Some(Action::Acknowledgement))
    }
}

/// A maintenance window, half-open `[start, end)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MaintenanceWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// A monitored target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub condition: Condition,
    #[serde(default)]
    pub scheduled_maintenance: Vec<MaintenanceWindow>,
    #[serde(default)]
    pub unscheduled_maintenance: Vec<MaintenanceWindow>,
}

impl Check {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            enabled: true,
            condition: Condition::Unknown,
            scheduled_maintenance: Vec::new(),
            unscheduled_maintenance: Vec::new(),
        }
    }

    pub fn in_scheduled_maintenance(&self, at: DateTime<Utc>) -> bool {
        self.scheduled_maintenance.iter().any(|w| w.contains(at))
    }

    pub fn in_unscheduled_maintenance(&self, at: DateTime<Utc>) -> bool {
        self.unscheduled_maintenance.iter().any(|w| w.contains(at))
    }
}

/// A person or team owning rules and media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    /// IANA timezone name; rule occurrence checks fall back to the
    /// configured default when absent
    pub timezone: Option<String>,
}

impl Contact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timezone: None,
        }
    }

    pub fn time_zone(&self) -> Option<std::result::Result<Tz, String>> {
        self.timezone
            .as_deref()
            .map(|name| name.parse::<Tz>().map_err(|_| name.to_string()))
    }
}

/// An alerting policy owned by a contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub contact_id: Uuid,
    /// Severities this rule applies to; empty means all severities
    #[serde(default)]
    pub severities: Vec<Condition>,
    /// A blackhole rule only suppresses: media reachable through it are
    /// excluded even when another rule would notify them
    #[serde(default)]
    pub is_blackhole: bool,
    /// Recurring occurrence windows; a rule with no schedule always matches
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

impl Rule {
    pub fn new(contact_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            severities: Vec::new(),
            is_blackhole: false,
            schedule: None,
        }
    }

    pub fn covers_severity(&self, severity: Condition) -> bool {
        self.severities.is_empty() || self.severities.contains(&severity)
    }

    /// Whether the rule's schedule covers `at`, evaluated in `tz`
    pub fn is_occurring_at(&self, at: DateTime<Utc>, tz: Tz) -> bool {
        match &self.schedule {
            None => true,
            Some(schedule) => schedule.occurs_at(at.with_timezone(&tz)),
        }
    }
}

/// Binds a rule's alerting status to a check it governs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub check_id: Uuid,
    /// Most recent failure/ok determination for this binding
    #[serde(default)]
    pub is_alerting: bool,
}

impl Route {
    pub fn new(rule_id: Uuid, check_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id,
            check_id,
            is_alerting: false,
        }
    }
}

/// A contact's delivery channel: transport, address and per-channel policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medium {
    pub id: Uuid,
    pub contact_id: Uuid,
    /// Transport name, matched against the configured delivery queues
    pub transport: String,
    pub address: String,
    /// Minimum re-notify gap in seconds while a check stays unhealthy;
    /// absent behaves as 0
    pub interval: Option<u32>,
    /// Alerting-check count at which alerts aggregate into a rollup
    pub rollup_threshold: Option<u32>,
    /// Rollup classification of the last alert actually emitted
    pub last_rollup_type: Option<Rollup>,
    /// State referenced by the last alert delivered to this medium
    pub last_state_id: Option<Uuid>,
}

impl Medium {
    pub fn new(contact_id: Uuid, transport: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            contact_id,
            transport: transport.into(),
            address: address.into(),
            interval: None,
            rollup_threshold: None,
            last_rollup_type: None,
            last_state_id: None,
        }
    }
}

/// One check state-transition awaiting processing.
/// Created upstream, consumed and destroyed by the notifier exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub check_id: Uuid,
    pub state_id: Uuid,
    pub severity: Condition,
    /// How long the check has been in its current condition, in seconds
    pub condition_duration: Option<i64>,
    /// Acknowledgement duration in seconds, when the state is an ack
    pub duration: Option<i64>,
}

impl Notification {
    pub fn new(check_id: Uuid, state_id: Uuid, severity: Condition) -> Self {
        Self {
            id: Uuid::new_v4(),
            check_id,
            state_id,
            severity,
            condition_duration: None,
            duration: None,
        }
    }
}

/// A decision to notify one medium about one check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub medium_id: Uuid,
    pub check_id: Uuid,
    pub condition: Condition,
    pub action: Option<Action>,
    pub last_condition: Option<Condition>,
    pub last_action: Option<Action>,
    pub condition_duration: Option<i64>,
    pub acknowledgement_duration: Option<i64>,
    pub rollup: Option<Rollup>,
    /// Rollup summary: currently-alerting check names grouped by condition
    pub rollup_states: Option<BTreeMap<Condition, Vec<String>>>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Classify an action/condition pair for logging
    pub fn notification_type(action: Option<Action>, condition: Condition) -> &'static str {
        match action {
            Some(Action::Acknowledgement) => "acknowledgement",
            Some(Action::TestNotifications) => "test",
            None if condition.healthy() => "recovery",
            None => "problem",
        }
    }
}
