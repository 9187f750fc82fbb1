//! Service configuration.
//!
//! Layered with figment: built-in defaults, then an optional YAML file,
//! then `NOTIFYSRV_`-prefixed environment variables (`__` separates
//! nesting levels, e.g. `NOTIFYSRV_REDIS__URL`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub redis: RedisConfig,
    pub queue: QueueConfig,
    /// Delivery queue name per transport. Media whose transport is not
    /// listed here are rejected before the service starts.
    pub queues: BTreeMap<String, String>,
    /// Fallback timezone for contacts without one of their own.
    pub default_contact_timezone: Option<String>,
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub wait_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub ttl_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            queue: QueueConfig::default(),
            queues: BTreeMap::new(),
            default_contact_timezone: None,
            lock: LockConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "notifications".to_string(),
            wait_timeout_secs: 30,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 120,
            max_retries: 600,
            retry_delay_ms: 100,
        }
    }
}

impl NotifyConfig {
    /// Loads configuration, layering file and environment over defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(NotifyConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: NotifyConfig = figment
            .merge(Env::prefixed("NOTIFYSRV_").split("__"))
            .extract()
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queues.is_empty() {
            return Err(NotifyError::Config(
                "no delivery queues configured, nothing would ever be dispatched".to_string(),
            ));
        }
        if let Some(tz) = &self.default_contact_timezone {
            tz.parse::<Tz>()
                .map_err(|_| NotifyError::InvalidTimezone(tz.clone()))?;
        }
        Ok(())
    }

    /// The configured default timezone, UTC when unset. Only call after
    /// [`validate`](Self::validate) has accepted the value.
    pub fn default_timezone(&self) -> Tz {
        self.default_contact_timezone
            .as_deref()
            .and_then(|tz| tz.parse().ok())
            .unwrap_or(Tz::UTC)
    }

    /// The transports a medium may use.
    pub fn transports(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock.ttl_secs)
    }

    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock.retry_delay_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.queue.wait_timeout_secs)
    }
}
