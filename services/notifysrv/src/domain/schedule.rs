//! Recurring occurrence schedules for rules
//!
//! A schedule is a set of weekly wall-clock windows. Whether a rule applies
//! at some instant is decided in the owning contact's timezone, so a window
//! like Mon-Fri 09:00-17:00 means local business hours wherever the contact
//! is. Windows cross midnight by being split in two.

use chrono::{DateTime, Datelike, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One weekly wall-clock window, half-open `[start, end)` local time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    fn covers(&self, day: Weekday, time: NaiveTime) -> bool {
        self.days.contains(&day) && self.start <= time && time < self.end
    }
}

/// Recurring occurrence windows for a rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub windows: Vec<TimeWindow>,
}

impl Schedule {
    /// Whether `local` falls inside any window. A schedule with no windows
    /// matches always, like a rule with no schedule at all.
    pub fn occurs_at(&self, local: DateTime<Tz>) -> bool {
        if self.windows.is_empty() {
            return true;
        }
        let day = local.weekday();
        let time = local.time();
        self.windows.iter().any(|w| w.covers(day, time))
    }
}
