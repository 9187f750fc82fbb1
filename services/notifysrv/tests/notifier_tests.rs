//! End-to-end tests over the in-memory store: seed records, push a
//! notification, run the consumer and observe the delivery queues.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vigil_store::{MemoryStore, Store};

use notifysrv::config::NotifyConfig;
use notifysrv::data::{keys, DataStore};
use notifysrv::domain::{
    Action, Alert, Check, Condition, Contact, Medium, Notification, Route, Rule, State,
};
use notifysrv::queue::RecordQueue;
use notifysrv::Notifier;

struct Harness {
    store: Arc<MemoryStore>,
    data: DataStore,
    notifier: Notifier,
    input: RecordQueue<Notification>,
}

fn config() -> NotifyConfig {
    let mut config = NotifyConfig::default();
    config.queues = BTreeMap::from([
        ("email".to_string(), "email_out".to_string()),
        ("sms".to_string(), "sms_out".to_string()),
    ]);
    // keep lock contention failures fast in tests
    config.lock.max_retries = 10;
    config
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let data = DataStore::new(store.clone() as Arc<dyn Store>);
    let notifier =
        Notifier::new(store.clone() as Arc<dyn Store>, config()).expect("notifier should build");
    let input = RecordQueue::new("notifications", data.clone());
    Harness {
        store,
        data,
        notifier,
        input,
    }
}

async fn seed_contact_rule_medium(
    data: &DataStore,
    check: &Check,
    transport: &str,
    interval: Option<u32>,
) -> Medium {
    let contact = Contact::new("ops");
    data.save(&contact).await.unwrap();

    let mut medium = Medium::new(contact.id, transport, "ops@example.com");
    medium.interval = interval;
    data.save(&medium).await.unwrap();

    let rule = Rule::new(contact.id);
    data.save(&rule).await.unwrap();
    data.link_rule_medium(rule.id, medium.id).await.unwrap();
    data.bind_route(&Route::new(rule.id, check.id)).await.unwrap();

    medium
}

async fn push_transition(
    harness: &Harness,
    check: &Check,
    condition: Condition,
    action: Option<Action>,
    at: DateTime<Utc>,
) -> State {
    let mut state = State::new(condition, at);
    state.action = action;
    harness.data.save(&state).await.unwrap();
    let notification = Notification::new(check.id, state.id, condition);
    harness.input.push(&notification).await.unwrap();
    state
}

/// Runs the consumer until the input queue is drained, then cancels it.
async fn run_until_drained(harness: &Harness) {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let notifier = &harness.notifier;
    let run = notifier.run(token);
    tokio::pin!(run);

    let input_key = keys::queue("notifications");
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(5);
    loop {
        tokio::select! {
            result = &mut run => {
                result.expect("notifier should exit cleanly");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(20)) => {
                let pending = harness.store.list_len(&input_key).await.unwrap();
                if pending == 0 {
                    shutdown.cancel();
                }
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "notifier did not drain in time"
                );
            }
        }
    }
}

async fn delivered_alerts(harness: &Harness, queue: &str) -> Vec<Alert> {
    let delivery = RecordQueue::<Alert>::new(queue, harness.data.clone());
    let mut alerts = Vec::new();
    while let Some(alert) = delivery.pop().await.unwrap() {
        alerts.push(alert);
    }
    alerts
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[tokio::test]
async fn critical_transition_alerts_once_then_throttles() {
    let harness = harness();
    let check = Check::new("web-01");
    harness.data.save(&check).await.unwrap();
    let medium = seed_contact_rule_medium(&harness.data, &check, "email", Some(300)).await;

    let state = push_transition(&harness, &check, Condition::Critical, None, at(1000)).await;
    run_until_drained(&harness).await;

    let alerts = delivered_alerts(&harness, "email_out").await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].condition, Condition::Critical);
    assert!(alerts[0].rollup.is_none());

    let saved: Medium = harness.data.find(medium.id).await.unwrap().unwrap();
    assert_eq!(saved.last_state_id, Some(state.id));

    // 200s later, inside the 300s interval and unchanged condition
    push_transition(&harness, &check, Condition::Critical, None, at(1200)).await;
    run_until_drained(&harness).await;

    assert!(delivered_alerts(&harness, "email_out").await.is_empty());
}

#[tokio::test]
async fn notification_without_rules_is_consumed_silently() {
    let harness = harness();
    let check = Check::new("unrouted");
    harness.data.save(&check).await.unwrap();

    push_transition(&harness, &check, Condition::Critical, None, at(1000)).await;
    run_until_drained(&harness).await;

    assert!(delivered_alerts(&harness, "email_out").await.is_empty());
    // the notification record is gone along with its queue entry
    assert_eq!(
        harness
            .store
            .list_len(&keys::queue("notifications"))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn blackhole_rule_suppresses_shared_medium() {
    let harness = harness();
    let check = Check::new("db-01");
    harness.data.save(&check).await.unwrap();

    let contact = Contact::new("oncall");
    harness.data.save(&contact).await.unwrap();

    let email = Medium::new(contact.id, "email", "oncall@example.com");
    let sms = Medium::new(contact.id, "sms", "5550100");
    harness.data.save(&email).await.unwrap();
    harness.data.save(&sms).await.unwrap();

    let notify = Rule::new(contact.id);
    harness.data.save(&notify).await.unwrap();
    harness.data.link_rule_medium(notify.id, email.id).await.unwrap();
    harness.data.link_rule_medium(notify.id, sms.id).await.unwrap();
    harness
        .data
        .bind_route(&Route::new(notify.id, check.id))
        .await
        .unwrap();

    let mut blackhole = Rule::new(contact.id);
    blackhole.is_blackhole = true;
    harness.data.save(&blackhole).await.unwrap();
    harness
        .data
        .link_rule_medium(blackhole.id, email.id)
        .await
        .unwrap();
    harness
        .data
        .bind_route(&Route::new(blackhole.id, check.id))
        .await
        .unwrap();

    push_transition(&harness, &check, Condition::Critical, None, at(1000)).await;
    run_until_drained(&harness).await;

    assert!(delivered_alerts(&harness, "email_out").await.is_empty());
    assert_eq!(delivered_alerts(&harness, "sms_out").await.len(), 1);
}

#[tokio::test]
async fn test_notification_bypasses_throttling_and_bookkeeping() {
    let harness = harness();
    let check = Check::new("api-01");
    harness.data.save(&check).await.unwrap();
    let medium = seed_contact_rule_medium(&harness.data, &check, "email", Some(300)).await;

    // two test notifications back to back both get through
    push_transition(
        &harness,
        &check,
        Condition::Critical,
        Some(Action::TestNotifications),
        at(1000),
    )
    .await;
    push_transition(
        &harness,
        &check,
        Condition::Critical,
        Some(Action::TestNotifications),
        at(1001),
    )
    .await;
    run_until_drained(&harness).await;

    let alerts = delivered_alerts(&harness, "email_out").await;
    assert_eq!(alerts.len(), 2);
    assert!(alerts
        .iter()
        .all(|a| a.action == Some(Action::TestNotifications)));

    // the failing check joins the alerting set, but delivery bookkeeping
    // is left untouched so real notifications are still throttled fresh
    assert!(harness
        .data
        .alerting_check_ids(medium.id)
        .await
        .unwrap()
        .contains(&check.id));
    let saved: Medium = harness.data.find(medium.id).await.unwrap().unwrap();
    assert!(saved.last_state_id.is_none());
    assert!(saved.last_rollup_type.is_none());
}

#[tokio::test]
async fn recovery_after_failure_is_delivered() {
    let harness = harness();
    let check = Check::new("cache-01");
    harness.data.save(&check).await.unwrap();
    seed_contact_rule_medium(&harness.data, &check, "email", Some(300)).await;

    push_transition(&harness, &check, Condition::Critical, None, at(1000)).await;
    run_until_drained(&harness).await;
    assert_eq!(delivered_alerts(&harness, "email_out").await.len(), 1);

    push_transition(&harness, &check, Condition::Ok, None, at(1050)).await;
    run_until_drained(&harness).await;

    let alerts = delivered_alerts(&harness, "email_out").await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].condition, Condition::Ok);
    assert_eq!(alerts[0].last_condition, Some(Condition::Critical));
    assert_eq!(
        Alert::notification_type(alerts[0].action, alerts[0].condition),
        "recovery"
    );
}

#[tokio::test]
async fn missing_state_is_dropped_without_alerts() {
    let harness = harness();
    let check = Check::new("ghost");
    harness.data.save(&check).await.unwrap();
    seed_contact_rule_medium(&harness.data, &check, "email", None).await;

    // notification referencing a state that was never saved
    let notification = Notification::new(check.id, Uuid::new_v4(), Condition::Critical);
    harness.input.push(&notification).await.unwrap();
    run_until_drained(&harness).await;

    assert!(delivered_alerts(&harness, "email_out").await.is_empty());
    assert!(harness
        .data
        .find::<Notification>(notification.id)
        .await
        .unwrap()
        .is_none());
}
