// ABOUTME: Event processor task behind the listener mpsc channel
// ABOUTME: Bounded recent-events ring plus alert rule evaluation with cooldown
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

use super::{IngestionStats, NormalizedEvent};
use crate::database::Database;
use crate::models::{AlertRule, AuditEvent};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the processor reloads enabled alert rules from the database
const RULE_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// Minimum spacing between audit writes for the same rule
const ALERT_COOLDOWN: Duration = Duration::from_secs(60);

/// Bounded FIFO of the most recent normalized events
///
/// When full, the oldest event is evicted and counted. The mutex is held
/// only for push/clone, never across await points.
pub struct EventRing {
    events: Mutex<VecDeque<NormalizedEvent>>,
    capacity: usize,
}

impl EventRing {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Push an event, returning true if an old event was evicted
    pub fn push(&self, event: NormalizedEvent) -> bool {
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let evicted = if events.len() >= self.capacity {
            events.pop_front();
            true
        } else {
            false
        };
        events.push_back(event);
        evicted
    }

    /// Most recent events, newest first, at most `limit`
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<NormalizedEvent> {
        let events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.iter().rev().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a rule matches an event
#[must_use]
pub fn rule_matches(rule: &AlertRule, event: &NormalizedEvent) -> bool {
    if !rule.enabled {
        return false;
    }
    // Lower severity values are more severe
    if event.severity > rule.min_severity {
        return false;
    }
    if let Some(protocol) = &rule.protocol {
        if !protocol.eq_ignore_ascii_case(event.protocol.as_str()) {
            return false;
        }
    }
    if let Some(needle) = &rule.match_substring {
        if !event
            .message
            .to_lowercase()
            .contains(&needle.to_lowercase())
        {
            return false;
        }
    }
    true
}

/// Processor task: drains the listener channel into the ring and
/// evaluates alert rules against each event
pub struct EventProcessor {
    database: Database,
    ring: Arc<EventRing>,
    stats: Arc<IngestionStats>,
    rules: Vec<AlertRule>,
    rules_loaded_at: Option<Instant>,
    cooldowns: DashMap<Uuid, Instant>,
}

impl EventProcessor {
    #[must_use]
    pub fn new(database: Database, ring: Arc<EventRing>, stats: Arc<IngestionStats>) -> Self {
        Self {
            database,
            ring,
            stats,
            rules: Vec::new(),
            rules_loaded_at: None,
            cooldowns: DashMap::new(),
        }
    }

    /// Run until the channel closes
    pub async fn run(mut self, mut rx: mpsc::Receiver<NormalizedEvent>) {
        info!("Event processor started");
        while let Some(event) = rx.recv().await {
            self.refresh_rules_if_stale().await;
            self.evaluate_rules(&event).await;

            if self.ring.push(event) {
                self.stats.note_ring_eviction();
            }
        }
        info!("Event processor stopped: channel closed");
    }

    async fn refresh_rules_if_stale(&mut self) {
        let stale = self
            .rules_loaded_at
            .map_or(true, |at| at.elapsed() >= RULE_REFRESH_INTERVAL);
        if !stale {
            return;
        }

        match self.database.list_enabled_alert_rules().await {
            Ok(rules) => {
                debug!("Loaded {} enabled alert rules", rules.len());
                self.rules = rules;
                self.rules_loaded_at = Some(Instant::now());
            }
            Err(e) => {
                // Keep evaluating with the previous rule set
                error!("Failed to refresh alert rules: {e}");
                self.rules_loaded_at = Some(Instant::now());
            }
        }
    }

    async fn evaluate_rules(&self, event: &NormalizedEvent) {
        for rule in &self.rules {
            if !rule_matches(rule, event) {
                continue;
            }

            if let Err(e) = self.database.record_alert_trigger(rule.id).await {
                error!("Failed to record trigger for alert rule {}: {e}", rule.id);
                continue;
            }

            if self.in_cooldown(rule.id) {
                continue;
            }

            warn!(
                alert.rule = %rule.name,
                event.severity = event.severity_name(),
                event.protocol = %event.protocol,
                "Alert rule triggered"
            );

            let audit = AuditEvent::new("alert_rule.triggered", None)
                .with_target(rule.id.to_string())
                .with_detail(serde_json::json!({
                    "rule_name": rule.name,
                    "event_id": event.id,
                    "severity": event.severity_name(),
                    "protocol": event.protocol.as_str(),
                    "peer": event.peer,
                }));
            if let Err(e) = self.database.record_audit_event(&audit).await {
                error!("Failed to write audit event for alert trigger: {e}");
            }
        }
    }

    /// True if the rule fired an audit event within the cooldown window;
    /// records the current instant otherwise
    fn in_cooldown(&self, rule_id: Uuid) -> bool {
        let now = Instant::now();
        match self.cooldowns.entry(rule_id) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                false
            }
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                if now.duration_since(*slot.get()) >= ALERT_COOLDOWN {
                    slot.insert(now);
                    false
                } else {
                    true
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Protocol;
    use chrono::Utc;

    fn event(severity: u8, message: &str) -> NormalizedEvent {
        let mut e = NormalizedEvent::new(Protocol::Syslog, "10.0.0.1:514".parse().unwrap());
        e.severity = severity;
        e.message = message.into();
        e
    }

    fn rule(min_severity: u8, substring: Option<&str>) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            name: "disk errors".into(),
            min_severity,
            match_substring: substring.map(str::to_owned),
            protocol: None,
            enabled: true,
            trigger_count: 0,
            last_triggered_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let ring = EventRing::new(2);
        assert!(!ring.push(event(6, "one")));
        assert!(!ring.push(event(6, "two")));
        assert!(ring.push(event(6, "three")));

        let recent = ring.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "three");
        assert_eq!(recent[1].message, "two");
    }

    #[test]
    fn test_ring_recent_limit() {
        let ring = EventRing::new(10);
        for i in 0..5 {
            ring.push(event(6, &format!("m{i}")));
        }
        assert_eq!(ring.recent(3).len(), 3);
        assert_eq!(ring.len(), 5);
    }

    #[test]
    fn test_rule_severity_threshold() {
        let r = rule(3, None);
        assert!(rule_matches(&r, &event(3, "x")));
        assert!(rule_matches(&r, &event(0, "x")));
        assert!(!rule_matches(&r, &event(4, "x")));
    }

    #[test]
    fn test_rule_substring_case_insensitive() {
        let r = rule(7, Some("Disk Full"));
        assert!(rule_matches(&r, &event(6, "warning: disk full on /dev/sda")));
        assert!(!rule_matches(&r, &event(6, "all good")));
    }

    #[test]
    fn test_rule_protocol_filter() {
        let mut r = rule(7, None);
        r.protocol = Some("gelf".into());
        assert!(!rule_matches(&r, &event(6, "x")));

        let mut gelf_event = event(6, "x");
        gelf_event.protocol = Protocol::Gelf;
        assert!(rule_matches(&r, &gelf_event));
    }

    #[test]
    fn test_disabled_rule_never_matches() {
        let mut r = rule(7, None);
        r.enabled = false;
        assert!(!rule_matches(&r, &event(0, "x")));
    }
}
