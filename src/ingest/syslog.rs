// ABOUTME: Syslog payload parsing for UDP datagrams and TCP lines
// ABOUTME: RFC 5424 first, RFC 3164 fallback, plain text accepted with defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! RFC 5424 / RFC 3164 syslog parsing.
//!
//! Both formats open with a `<PRI>` field encoding facility and severity
//! (`pri = facility * 8 + severity`). Payloads matching neither grammar
//! are accepted verbatim with informational defaults, since plenty of
//! devices ship bare text to port 514.

use super::{NormalizedEvent, ParseError, Protocol, DEFAULT_FACILITY, DEFAULT_SEVERITY};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::net::SocketAddr;

const NILVALUE: &str = "-";

/// Parse a syslog payload, trying RFC 5424, then RFC 3164, then plain text
///
/// # Errors
///
/// Returns an error if the payload is not valid UTF-8 or is empty
pub fn parse(payload: &[u8], peer: SocketAddr) -> Result<NormalizedEvent, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidUtf8)?;
    let line = text.trim_end_matches(['\r', '\n']);

    if line.is_empty() {
        return Err(ParseError::Malformed {
            protocol: Protocol::Syslog,
            detail: "empty payload".into(),
        });
    }

    if let Some(event) = parse_rfc5424(line, peer) {
        return Ok(event);
    }
    if let Some(event) = parse_rfc3164(line, peer) {
        return Ok(event);
    }

    // Plain text fallback
    let mut event = NormalizedEvent::new(Protocol::Syslog, peer);
    event.severity = DEFAULT_SEVERITY;
    event.facility = Some(DEFAULT_FACILITY);
    event.message = line.to_owned();
    Ok(event)
}

/// Decode a `<PRI>` prefix, returning (facility, severity, rest-of-line)
fn parse_pri(line: &str) -> Option<(u8, u8, &str)> {
    let rest = line.strip_prefix('<')?;
    let close = rest.find('>')?;
    let digits = &rest[..close];
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let pri: u16 = digits.parse().ok()?;
    if pri > 191 {
        return None;
    }
    let facility = u8::try_from(pri / 8).ok()?;
    let severity = u8::try_from(pri % 8).ok()?;
    Some((facility, severity, &rest[close + 1..]))
}

/// `<PRI>VERSION SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID SP SD [SP MSG]`
fn parse_rfc5424(line: &str, peer: SocketAddr) -> Option<NormalizedEvent> {
    let (facility, severity, rest) = parse_pri(line)?;

    let (version, rest) = rest.split_once(' ')?;
    if version != "1" {
        return None;
    }

    let (timestamp, rest) = rest.split_once(' ')?;
    let (hostname, rest) = rest.split_once(' ')?;
    let (app_name, rest) = rest.split_once(' ')?;
    let (_procid, rest) = rest.split_once(' ')?;
    let (_msgid, rest) = rest.split_once(' ')?;

    // Structured data is NILVALUE or one or more bracketed elements
    let message = if let Some(after) = rest.strip_prefix(NILVALUE) {
        after.strip_prefix(' ').unwrap_or("")
    } else if rest.starts_with('[') {
        let sd_end = skip_structured_data(rest)?;
        rest[sd_end..].strip_prefix(' ').unwrap_or("")
    } else {
        return None;
    };

    let mut event = NormalizedEvent::new(Protocol::Syslog, peer);
    event.severity = severity;
    event.facility = Some(facility);
    if timestamp != NILVALUE {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
            event.timestamp = parsed.with_timezone(&Utc);
        }
    }
    if hostname != NILVALUE {
        event.hostname = Some(hostname.to_owned());
    }
    if app_name != NILVALUE {
        event.app_name = Some(app_name.to_owned());
    }
    event.message = message.strip_prefix('\u{feff}').unwrap_or(message).to_owned();
    Some(event)
}

/// Index just past the last `]` of the structured-data section
fn skip_structured_data(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b'[' {
        let mut escaped = false;
        let mut closed = false;
        i += 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' if !escaped => escaped = true,
                b']' if !escaped => {
                    closed = true;
                    i += 1;
                    break;
                }
                _ => escaped = false,
            }
            i += 1;
        }
        if !closed {
            return None;
        }
    }
    Some(i)
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// `<PRI>Mmm dd hh:mm:ss HOSTNAME TAG: MSG`
fn parse_rfc3164(line: &str, peer: SocketAddr) -> Option<NormalizedEvent> {
    let (facility, severity, rest) = parse_pri(line)?;

    let month_name = rest.get(..3)?;
    let month = MONTHS.iter().position(|m| *m == month_name)? + 1;

    // Day may be space-padded: "Oct  7" vs "Oct 17"
    let rest = rest.get(4..)?;
    let day_str = rest.get(..2)?.trim_start();
    let day: u32 = day_str.parse().ok()?;
    let rest = rest.get(3..)?;

    let time_str = rest.get(..8)?;
    let mut time_parts = time_str.split(':');
    let hour: u32 = time_parts.next()?.parse().ok()?;
    let minute: u32 = time_parts.next()?.parse().ok()?;
    let second: u32 = time_parts.next()?.parse().ok()?;
    let rest = rest.get(9..)?;

    let (hostname, rest) = rest.split_once(' ')?;

    // TAG may carry a [pid] suffix and is terminated by ':'
    let (app_name, message) = match rest.split_once(':') {
        Some((tag, msg)) => {
            let tag = tag.split('[').next().unwrap_or(tag);
            (Some(tag.to_owned()), msg.trim_start().to_owned())
        }
        None => (None, rest.to_owned()),
    };

    // RFC 3164 timestamps have no year; assume the current one
    let now = Utc::now();
    let timestamp = NaiveDate::from_ymd_opt(now.year(), u32::try_from(month).ok()?, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .and_then(|dt| Utc.from_local_datetime(&dt).single())
        .unwrap_or(now);

    let mut event = NormalizedEvent::new(Protocol::Syslog, peer);
    event.severity = severity;
    event.facility = Some(facility);
    event.timestamp = timestamp;
    event.hostname = Some(hostname.to_owned());
    event.app_name = app_name;
    event.message = message;
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn peer() -> SocketAddr {
        "192.0.2.1:51000".parse().unwrap()
    }

    #[test]
    fn test_rfc5424_full() {
        let line = b"<165>1 2025-08-27T12:30:45.123Z web01 nginx 4321 ID47 - GET /index.html 200";
        let event = parse(line, peer()).unwrap();

        assert_eq!(event.severity, 5);
        assert_eq!(event.facility, Some(20));
        assert_eq!(event.severity_name(), "notice");
        assert_eq!(event.facility_name(), Some("local4"));
        assert_eq!(event.hostname.as_deref(), Some("web01"));
        assert_eq!(event.app_name.as_deref(), Some("nginx"));
        assert_eq!(event.message, "GET /index.html 200");
        assert_eq!(event.timestamp.hour(), 12);
    }

    #[test]
    fn test_rfc5424_structured_data() {
        let line = br#"<34>1 2025-08-27T06:00:00Z host app - - [exampleSDID@32473 iut="3"] su failed"#;
        let event = parse(line, peer()).unwrap();

        assert_eq!(event.severity, 2);
        assert_eq!(event.facility, Some(4));
        assert_eq!(event.message, "su failed");
    }

    #[test]
    fn test_rfc5424_nil_fields() {
        let line = b"<13>1 - - - - - - hello";
        let event = parse(line, peer()).unwrap();

        assert!(event.hostname.is_none());
        assert!(event.app_name.is_none());
        assert_eq!(event.message, "hello");
    }

    #[test]
    fn test_rfc3164() {
        let line = b"<13>Oct 11 22:14:15 mymachine su[230]: 'su root' failed on /dev/pts/8";
        let event = parse(line, peer()).unwrap();

        assert_eq!(event.severity, 5);
        assert_eq!(event.facility, Some(1));
        assert_eq!(event.hostname.as_deref(), Some("mymachine"));
        assert_eq!(event.app_name.as_deref(), Some("su"));
        assert_eq!(event.message, "'su root' failed on /dev/pts/8");
    }

    #[test]
    fn test_rfc3164_space_padded_day() {
        let line = b"<30>Oct  7 01:02:03 host cron: job done";
        let event = parse(line, peer()).unwrap();

        assert_eq!(event.severity, 6);
        assert_eq!(event.facility, Some(3));
        assert_eq!(event.app_name.as_deref(), Some("cron"));
    }

    #[test]
    fn test_plain_text_fallback() {
        let event = parse(b"something broke badly\n", peer()).unwrap();

        assert_eq!(event.severity, DEFAULT_SEVERITY);
        assert_eq!(event.facility, Some(DEFAULT_FACILITY));
        assert_eq!(event.message, "something broke badly");
    }

    #[test]
    fn test_pri_out_of_range_falls_back() {
        // 200 > 191, not a valid PRI; whole line becomes the message
        let event = parse(b"<200>1 - - - - - - x", peer()).unwrap();
        assert_eq!(event.severity, DEFAULT_SEVERITY);
        assert!(event.message.starts_with("<200>"));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(matches!(
            parse(&[0x3c, 0xff, 0xfe], peer()),
            Err(ParseError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(parse(b"\n", peer()).is_err());
    }
}
