// ABOUTME: Lock-free ingestion statistics with per-protocol counters
// ABOUTME: Relaxed atomics on the hot path, snapshots for the status API
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

use super::Protocol;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one protocol; all updates use relaxed ordering
#[derive(Debug, Default)]
pub struct ProtocolCounters {
    received: AtomicU64,
    parsed: AtomicU64,
    parse_failures: AtomicU64,
    rate_limited: AtomicU64,
    bytes: AtomicU64,
}

impl ProtocolCounters {
    pub fn note_received(&self, bytes: usize) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn note_parsed(&self) {
        self.parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ProtocolSnapshot {
        ProtocolSnapshot {
            received: self.received.load(Ordering::Relaxed),
            parsed: self.parsed.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of one protocol's counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProtocolSnapshot {
    pub received: u64,
    pub parsed: u64,
    pub parse_failures: u64,
    pub rate_limited: u64,
    pub bytes: u64,
}

/// Engine-wide statistics shared between listeners and the status API
pub struct IngestionStats {
    started_at: DateTime<Utc>,
    syslog: ProtocolCounters,
    gelf: ProtocolCounters,
    beats: ProtocolCounters,
    fluent: ProtocolCounters,
    /// Events evicted from the recent-events ring
    dropped_from_ring: AtomicU64,
}

impl Default for IngestionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            syslog: ProtocolCounters::default(),
            gelf: ProtocolCounters::default(),
            beats: ProtocolCounters::default(),
            fluent: ProtocolCounters::default(),
            dropped_from_ring: AtomicU64::new(0),
        }
    }

    /// Counters for one protocol
    #[must_use]
    pub const fn protocol(&self, protocol: Protocol) -> &ProtocolCounters {
        match protocol {
            Protocol::Syslog => &self.syslog,
            Protocol::Gelf => &self.gelf,
            Protocol::Beats => &self.beats,
            Protocol::Fluent => &self.fluent,
        }
    }

    pub fn note_ring_eviction(&self) {
        self.dropped_from_ring.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since the engine started
    #[must_use]
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Serializable snapshot for the status endpoint
    #[must_use]
    pub fn snapshot(&self, buffered_events: usize) -> StatsSnapshot {
        let mut protocols = BTreeMap::new();
        for protocol in Protocol::ALL {
            protocols.insert(
                protocol.as_str().to_owned(),
                self.protocol(protocol).snapshot(),
            );
        }

        StatsSnapshot {
            started_at: self.started_at,
            uptime_seconds: self.uptime_seconds(),
            buffered_events,
            dropped_from_ring: self.dropped_from_ring.load(Ordering::Relaxed),
            protocols,
        }
    }
}

/// Point-in-time view of the whole engine
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub buffered_events: usize,
    pub dropped_from_ring: u64,
    pub protocols: BTreeMap<String, ProtocolSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = IngestionStats::new();
        let syslog = stats.protocol(Protocol::Syslog);

        syslog.note_received(100);
        syslog.note_received(50);
        syslog.note_parsed();
        syslog.note_parse_failure();
        syslog.note_rate_limited();

        let snap = stats.snapshot(3);
        let syslog_snap = &snap.protocols["syslog"];
        assert_eq!(syslog_snap.received, 2);
        assert_eq!(syslog_snap.bytes, 150);
        assert_eq!(syslog_snap.parsed, 1);
        assert_eq!(syslog_snap.parse_failures, 1);
        assert_eq!(syslog_snap.rate_limited, 1);
        assert_eq!(snap.buffered_events, 3);
        assert_eq!(snap.protocols["gelf"].received, 0);
    }

    #[test]
    fn test_snapshot_has_all_protocols() {
        let snap = IngestionStats::new().snapshot(0);
        assert_eq!(snap.protocols.len(), 4);
    }
}
