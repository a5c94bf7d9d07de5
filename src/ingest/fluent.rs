// ABOUTME: Fluent Bit newline-delimited JSON record parsing over TCP
// ABOUTME: Recognizes out_tcp json_lines output with common key spellings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! Fluent Bit `out_tcp` with `format json_lines`: one JSON object per
//! line. Key names are not standardized across pipelines, so the parser
//! recognizes the common spellings (`log`/`message`/`msg`, `host`/
//! `hostname`, `@timestamp`/`date`/`time`).

use super::{NormalizedEvent, ParseError, Protocol};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;

/// Parse one newline-delimited JSON record
///
/// # Errors
///
/// Returns an error if the line is not a JSON object
pub fn parse_line(payload: &[u8], peer: SocketAddr) -> Result<NormalizedEvent, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidUtf8)?;
    let line = text.trim();
    if line.is_empty() {
        return Err(ParseError::Malformed {
            protocol: Protocol::Fluent,
            detail: "empty record".into(),
        });
    }

    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or_else(|| ParseError::Malformed {
        protocol: Protocol::Fluent,
        detail: "record is not a JSON object".into(),
    })?;

    let mut event = NormalizedEvent::new(Protocol::Fluent, peer);
    event.facility = None;

    let message_key = ["log", "message", "msg"]
        .into_iter()
        .find(|k| obj.get(*k).and_then(|v| v.as_str()).is_some());
    if let Some(key) = message_key {
        event.message = obj[key].as_str().unwrap_or_default().trim_end().to_owned();
    } else {
        // No recognizable message key; keep the whole record as the message
        event.message = line.to_owned();
    }

    event.hostname = ["host", "hostname"]
        .into_iter()
        .find_map(|k| obj.get(k).and_then(|v| v.as_str()))
        .map(str::to_owned);
    event.app_name = ["app", "app_name", "tag", "container_name"]
        .into_iter()
        .find_map(|k| obj.get(k).and_then(|v| v.as_str()))
        .map(str::to_owned);

    if let Some(ts) = extract_timestamp(obj) {
        event.timestamp = ts;
    }

    if let Some(level) = obj.get("level").or_else(|| obj.get("severity")) {
        event.severity = match level {
            serde_json::Value::Number(n) => {
                u8::try_from(n.as_u64().unwrap_or(6).min(7)).unwrap_or(7)
            }
            serde_json::Value::String(s) => severity_from_name(s),
            _ => event.severity,
        };
    }

    for (key, val) in obj {
        let consumed = matches!(
            key.as_str(),
            "log" | "message" | "msg" | "host" | "hostname" | "@timestamp" | "date" | "time"
        );
        if !consumed {
            event.extra.insert(key.clone(), val.clone());
        }
    }

    Ok(event)
}

fn extract_timestamp(obj: &serde_json::Map<String, serde_json::Value>) -> Option<DateTime<Utc>> {
    for key in ["@timestamp", "date", "time"] {
        match obj.get(key) {
            Some(serde_json::Value::String(s)) => {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                    return Some(parsed.with_timezone(&Utc));
                }
            }
            Some(serde_json::Value::Number(n)) => {
                // Epoch seconds, possibly fractional (Fluent Bit `date` key)
                if let Some(ts) = n.as_f64() {
                    #[allow(clippy::cast_possible_truncation)]
                    let secs = ts.trunc() as i64;
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let nanos = (ts.fract() * 1_000_000_000.0) as u32;
                    if let Some(parsed) = DateTime::from_timestamp(secs, nanos) {
                        return Some(parsed);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn severity_from_name(level: &str) -> u8 {
    match level.to_ascii_lowercase().as_str() {
        "emergency" | "emerg" | "fatal" | "panic" => 0,
        "alert" => 1,
        "critical" | "crit" => 2,
        "error" | "err" => 3,
        "warning" | "warn" => 4,
        "notice" => 5,
        "debug" | "trace" => 7,
        _ => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn peer() -> SocketAddr {
        "192.0.2.50:24224".parse().unwrap()
    }

    #[test]
    fn test_fluent_bit_shaped_record() {
        let line = br#"{"date":1724752800.5,"log":"connection refused\n","host":"node-3","level":"error","pod":"api-7f9"}"#;
        let event = parse_line(line, peer()).unwrap();

        assert_eq!(event.message, "connection refused");
        assert_eq!(event.hostname.as_deref(), Some("node-3"));
        assert_eq!(event.severity, 3);
        assert_eq!(event.timestamp.minute(), 0);
        assert_eq!(event.extra.get("pod"), Some(&serde_json::json!("api-7f9")));
    }

    #[test]
    fn test_at_timestamp_and_message_keys() {
        let line = br#"{"@timestamp":"2025-08-27T09:15:00Z","message":"started","hostname":"h1","severity":5}"#;
        let event = parse_line(line, peer()).unwrap();

        assert_eq!(event.message, "started");
        assert_eq!(event.hostname.as_deref(), Some("h1"));
        assert_eq!(event.severity, 5);
    }

    #[test]
    fn test_record_without_message_key_kept_whole() {
        let line = br#"{"foo":1,"bar":2}"#;
        let event = parse_line(line, peer()).unwrap();
        assert!(event.message.contains("foo"));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(parse_line(b"[1,2,3]", peer()).is_err());
        assert!(parse_line(b"not json", peer()).is_err());
        assert!(parse_line(b"   ", peer()).is_err());
    }
}
