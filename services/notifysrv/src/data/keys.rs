//! Redis key builders
//!
//! Everything the notifier touches lives under the `vigil:` namespace:
//! one hash per record (JSON in the `data` field), sets for associations,
//! lists for alert histories and queues.

use uuid::Uuid;

/// Record hash: `vigil:{kind}:{id}`
pub fn record(kind: &str, id: Uuid) -> String {
    format!("vigil:{}:{}", kind, id)
}

/// Route ids bound to a check
pub fn check_routes(check_id: Uuid) -> String {
    format!("vigil:check:{}:routes", check_id)
}

/// Medium ids linked from a rule
pub fn rule_media(rule_id: Uuid) -> String {
    format!("vigil:rule:{}:media", rule_id)
}

/// Check ids currently contributing to a medium's rollup count
pub fn medium_alerting_checks(medium_id: Uuid) -> String {
    format!("vigil:medium:{}:alerting_checks", medium_id)
}

/// Alert history of a medium
pub fn medium_alerts(medium_id: Uuid) -> String {
    format!("vigil:medium:{}:alerts", medium_id)
}

/// Alert history of a check
pub fn check_alerts(check_id: Uuid) -> String {
    format!("vigil:check:{}:alerts", check_id)
}

/// Queue list holding record ids
pub fn queue(name: &str) -> String {
    format!("vigil:queue:{}", name)
}

/// Signal list for blocking waits on a queue
pub fn queue_signal(name: &str) -> String {
    format!("vigil:queue:{}:signal", name)
}
