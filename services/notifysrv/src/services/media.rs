//! Media selection.
//!
//! From the rules that apply, compute which media to consider alerting.
//! Blackhole rules only ever take away: a medium reachable through a
//! blackhole rule is excluded even when a non-blackhole rule would have
//! notified it. Media on transports without a delivery queue are dropped
//! here rather than failing later.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use crate::data::{DataStore, RuleMedia};
use crate::domain::{Medium, Rule};
use crate::error::Result;

/// Media reachable through non-blackhole rules, minus media reachable
/// through blackhole rules.
pub fn alertable_ids(rule_media: &[RuleMedia]) -> HashSet<Uuid> {
    let mut candidates = HashSet::new();
    let mut blackholed = HashSet::new();
    for rm in rule_media {
        let target = if rm.is_blackhole {
            &mut blackholed
        } else {
            &mut candidates
        };
        target.extend(rm.media.iter().copied());
    }
    &candidates - &blackholed
}

pub struct MediaSelector {
    data: DataStore,
    transports: Vec<String>,
}

impl MediaSelector {
    pub fn new(data: DataStore, transports: Vec<String>) -> Self {
        Self { data, transports }
    }

    /// The media the resolved rules make alertable, restricted to
    /// enabled transports.
    pub async fn alertable_media(&self, rules: &[Rule]) -> Result<Vec<Medium>> {
        let rule_media = self.data.media_for_rules(rules).await?;
        let ids = alertable_ids(&rule_media).into_iter().collect::<Vec<_>>();
        let mut media: Vec<Medium> = self.data.find_many(&ids).await?;
        media.retain(|m| {
            let enabled = self.transports.contains(&m.transport);
            if !enabled {
                debug!(medium_id = %m.id, transport = %m.transport, "transport disabled, skipping medium");
            }
            enabled
        });
        // stable processing order regardless of set iteration
        media.sort_by_key(|m| m.id);
        Ok(media)
    }
}
