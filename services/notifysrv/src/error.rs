//! Error types for notifysrv
//!
//! Only hard failures are represented here: configuration problems and
//! data-layer faults. The expected zero-alert outcomes (no rules bound,
//! no contacts, no rules surviving the schedule filter) are ordinary Ok
//! paths that get logged where they occur.

use thiserror::Error;
use uuid::Uuid;
use vigil_store::StoreError;

#[derive(Error, Debug)]
pub enum NotifyError {
    /// Bad or incomplete configuration, fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured default contact timezone doesn't parse, fatal at startup
    #[error("invalid timezone {0:?} in default_contact_timezone")]
    InvalidTimezone(String),

    /// A resolved medium's transport has no delivery queue
    #[error("no delivery queue configured for transport {0:?}")]
    UnknownTransport(String),

    /// An alert could not be persisted; aborting rather than silently
    /// dropping it keeps the medium's rollup/last-state bookkeeping in
    /// sync with what was actually sent
    #[error("couldn't save alert {id} for {transport} {address}")]
    AlertPersistence {
        id: Uuid,
        transport: String,
        address: String,
        #[source]
        source: Box<NotifyError>,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = NotifyError::Config("no delivery queues configured".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: no delivery queues configured"
        );
    }

    #[test]
    fn test_unknown_transport_display() {
        let err = NotifyError::UnknownTransport("pager".to_string());
        assert!(err.to_string().contains("pager"));
    }
}
