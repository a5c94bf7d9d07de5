// ABOUTME: Multi-protocol log ingestion engine organization and shared types
// ABOUTME: Normalized event model, protocol tags, and the engine entry point
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! # Ingestion Engine
//!
//! Listeners accept syslog, GELF, Beats (Lumberjack v2), and Fluent Bit
//! traffic, parse each payload into a [`NormalizedEvent`] on the shared
//! 8-level syslog severity scale, and feed a processor task through an
//! mpsc channel. The processor keeps a bounded ring of recent events and
//! evaluates alert rules; nothing on the hot path touches SQLite.

pub mod beats;
pub mod fluent;
pub mod gelf;
pub mod listeners;
pub mod pipeline;
pub mod stats;
pub mod syslog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use uuid::Uuid;

pub use listeners::IngestionEngine;
pub use pipeline::EventRing;
pub use stats::IngestionStats;

/// Wire protocol an event arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Syslog,
    Gelf,
    Beats,
    Fluent,
}

impl Protocol {
    /// All protocols, in stats display order
    pub const ALL: [Self; 4] = [Self::Syslog, Self::Gelf, Self::Beats, Self::Fluent];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Syslog => "syslog",
            Self::Gelf => "gelf",
            Self::Beats => "beats",
            Self::Fluent => "fluent",
        }
    }

    /// Parse a protocol name, e.g. from the test-parse endpoint
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "syslog" => Some(Self::Syslog),
            "gelf" => Some(Self::Gelf),
            "beats" | "lumberjack" => Some(Self::Beats),
            "fluent" | "fluentbit" | "fluent-bit" => Some(Self::Fluent),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to turn a payload into a normalized event
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("malformed {protocol} payload: {detail}")]
    Malformed {
        protocol: Protocol,
        detail: String,
    },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("frame exceeds size limit ({size} > {limit} bytes)")]
    TooLarge { size: usize, limit: usize },
}

/// Syslog severity names, indexed by severity value 0..=7
pub const SEVERITY_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

/// Syslog facility names, indexed by facility value 0..=23
pub const FACILITY_NAMES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "cron", "authpriv",
    "ftp", "ntp", "audit", "alert", "clock", "local0", "local1", "local2", "local3", "local4",
    "local5", "local6", "local7",
];

/// Name for a severity value, clamped into range
#[must_use]
pub fn severity_name(severity: u8) -> &'static str {
    SEVERITY_NAMES[usize::from(severity.min(7))]
}

/// Name for a facility value, if it is in range
#[must_use]
pub fn facility_name(facility: u8) -> Option<&'static str> {
    FACILITY_NAMES.get(usize::from(facility)).copied()
}

/// Default severity when a payload does not carry one (informational)
pub const DEFAULT_SEVERITY: u8 = 6;
/// Default facility when a payload does not carry one (user-level)
pub const DEFAULT_FACILITY: u8 = 1;

/// A log event normalized onto the shared severity scale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Unique identifier assigned at ingestion
    pub id: Uuid,
    /// When the engine received the payload
    pub received_at: DateTime<Utc>,
    /// Event timestamp from the payload, or `received_at` if absent
    pub timestamp: DateTime<Utc>,
    /// Protocol the event arrived over
    pub protocol: Protocol,
    /// Source address
    pub peer: String,
    /// Originating hostname, if the payload carried one
    pub hostname: Option<String>,
    /// Application or program name
    pub app_name: Option<String>,
    /// Syslog severity, 0 (emerg) through 7 (debug)
    pub severity: u8,
    /// Syslog facility, when known
    pub facility: Option<u8>,
    /// The log message body
    pub message: String,
    /// Flattened additional fields carried through from the payload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NormalizedEvent {
    /// Start an event with ingestion defaults for `protocol` and `peer`
    #[must_use]
    pub fn new(protocol: Protocol, peer: SocketAddr) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            received_at: now,
            timestamp: now,
            protocol,
            peer: peer.to_string(),
            hostname: None,
            app_name: None,
            severity: DEFAULT_SEVERITY,
            facility: Some(DEFAULT_FACILITY),
            message: String::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Human-readable severity name
    #[must_use]
    pub fn severity_name(&self) -> &'static str {
        severity_name(self.severity)
    }

    /// Human-readable facility name, when the facility is known
    #[must_use]
    pub fn facility_name(&self) -> Option<&'static str> {
        self.facility.and_then(facility_name)
    }
}

/// Parse a payload as `protocol`, used by listeners and the test-parse endpoint
///
/// # Errors
///
/// Returns a [`ParseError`] describing why the payload was rejected
pub fn parse_payload(
    protocol: Protocol,
    payload: &[u8],
    peer: SocketAddr,
) -> Result<NormalizedEvent, ParseError> {
    match protocol {
        Protocol::Syslog => syslog::parse(payload, peer),
        Protocol::Gelf => gelf::parse_uncompressed(payload, peer),
        Protocol::Beats => beats::parse_json_payload(payload, peer),
        Protocol::Fluent => fluent::parse_line(payload, peer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names_round_trip() {
        for protocol in Protocol::ALL {
            assert_eq!(Protocol::from_name(protocol.as_str()), Some(protocol));
        }
        assert_eq!(Protocol::from_name("lumberjack"), Some(Protocol::Beats));
        assert_eq!(Protocol::from_name("gopher"), None);
    }

    #[test]
    fn test_severity_and_facility_names() {
        assert_eq!(severity_name(0), "emerg");
        assert_eq!(severity_name(7), "debug");
        assert_eq!(severity_name(200), "debug");
        assert_eq!(facility_name(0), Some("kern"));
        assert_eq!(facility_name(23), Some("local7"));
        assert_eq!(facility_name(24), None);
    }
}
