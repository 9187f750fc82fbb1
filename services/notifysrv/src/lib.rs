//! Notification routing core
//!
//! Consumes check-state change notifications from a queue, decides which
//! contact media should be alerted (rule resolution, blackhole suppression,
//! rollup thresholds, interval throttling) and hands qualifying alerts to
//! per-transport delivery queues.

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod queue;
pub mod services;

pub use config::NotifyConfig;
pub use error::{NotifyError, Result};
pub use services::Notifier;
