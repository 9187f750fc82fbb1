//! Domain entities for the notification core

pub mod schedule;
pub mod types;

pub use schedule::{Schedule, TimeWindow};
pub use types::{
    Action, Alert, Check, Condition, Contact, MaintenanceWindow, Medium, Notification, Rollup,
    Route, Rule, State,
};
