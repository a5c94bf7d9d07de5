// ABOUTME: Beats (Lumberjack v2) framed protocol decoding over TCP
// ABOUTME: Window, JSON data, and compressed frames in; acks out per window
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! Lumberjack v2, the framing protocol Filebeat and friends speak.
//!
//! Every frame opens with a version byte (`2`) and a type byte:
//! `W` announces the window size, `J` carries one JSON document with a
//! sequence number, `C` wraps a zlib-compressed batch of frames, and the
//! receiver answers with `A` acks. An ack is owed once a full window of
//! `J` frames has been consumed.

use super::{NormalizedEvent, ParseError, Protocol};
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use std::io::Read;
use std::net::SocketAddr;

/// Protocol version byte
const VERSION: u8 = b'2';
/// Cap on a single JSON frame payload
const MAX_FRAME_PAYLOAD: usize = 4 * 1024 * 1024;
/// Cap on a decompressed `C` frame batch
const MAX_COMPRESSED_BATCH: usize = 16 * 1024 * 1024;

/// Outcome of consuming bytes from the connection buffer
#[derive(Debug, Default)]
pub struct DecodeOutput {
    /// Decoded events, in arrival order
    pub events: Vec<NormalizedEvent>,
    /// Sequence numbers to acknowledge, one per completed window
    pub acks: Vec<u32>,
}

/// Stateful decoder for one Beats connection
pub struct LumberjackDecoder {
    window_size: u32,
    frames_since_ack: u32,
    last_seq: u32,
}

impl Default for LumberjackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LumberjackDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            window_size: 0,
            frames_since_ack: 0,
            last_seq: 0,
        }
    }

    /// Consume as many complete frames as `buf` holds
    ///
    /// Returns the decoded events plus any acks now owed, and drains the
    /// consumed bytes from `buf`. Incomplete trailing frames stay buffered.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed framing; the caller should drop the
    /// connection
    pub fn decode(
        &mut self,
        buf: &mut Vec<u8>,
        peer: SocketAddr,
    ) -> Result<DecodeOutput, ParseError> {
        let mut output = DecodeOutput::default();
        let mut consumed = 0;

        while let Some(used) = self.decode_one(&buf[consumed..], peer, &mut output)? {
            consumed += used;
        }

        buf.drain(..consumed);
        Ok(output)
    }

    /// Decode a single frame; Ok(None) means more bytes are needed
    fn decode_one(
        &mut self,
        data: &[u8],
        peer: SocketAddr,
        output: &mut DecodeOutput,
    ) -> Result<Option<usize>, ParseError> {
        if data.len() < 2 {
            return Ok(None);
        }
        if data[0] != VERSION {
            return Err(ParseError::Malformed {
                protocol: Protocol::Beats,
                detail: format!("unsupported protocol version byte 0x{:02x}", data[0]),
            });
        }

        match data[1] {
            b'W' => {
                if data.len() < 6 {
                    return Ok(None);
                }
                self.window_size = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
                Ok(Some(6))
            }
            b'J' => {
                if data.len() < 10 {
                    return Ok(None);
                }
                let seq = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
                let len = u32::from_be_bytes([data[6], data[7], data[8], data[9]]) as usize;
                if len > MAX_FRAME_PAYLOAD {
                    return Err(ParseError::TooLarge {
                        size: len,
                        limit: MAX_FRAME_PAYLOAD,
                    });
                }
                if data.len() < 10 + len {
                    return Ok(None);
                }

                let event = parse_json_payload(&data[10..10 + len], peer)?;
                output.events.push(event);
                self.last_seq = seq;
                self.note_data_frame(output);
                Ok(Some(10 + len))
            }
            b'C' => {
                if data.len() < 6 {
                    return Ok(None);
                }
                let len = u32::from_be_bytes([data[2], data[3], data[4], data[5]]) as usize;
                if data.len() < 6 + len {
                    return Ok(None);
                }

                let mut decompressed = Vec::new();
                ZlibDecoder::new(&data[6..6 + len])
                    .take(MAX_COMPRESSED_BATCH as u64 + 1)
                    .read_to_end(&mut decompressed)
                    .map_err(|e| ParseError::Decompression(e.to_string()))?;
                if decompressed.len() > MAX_COMPRESSED_BATCH {
                    return Err(ParseError::TooLarge {
                        size: decompressed.len(),
                        limit: MAX_COMPRESSED_BATCH,
                    });
                }

                // The batch is a sequence of ordinary frames
                let mut inner_consumed = 0;
                while let Some(used) =
                    self.decode_one(&decompressed[inner_consumed..], peer, output)?
                {
                    inner_consumed += used;
                }
                if inner_consumed != decompressed.len() {
                    return Err(ParseError::Malformed {
                        protocol: Protocol::Beats,
                        detail: "truncated frame inside compressed batch".into(),
                    });
                }
                Ok(Some(6 + len))
            }
            other => Err(ParseError::Malformed {
                protocol: Protocol::Beats,
                detail: format!("unknown frame type 0x{other:02x}"),
            }),
        }
    }

    fn note_data_frame(&mut self, output: &mut DecodeOutput) {
        self.frames_since_ack += 1;
        if self.window_size > 0 && self.frames_since_ack >= self.window_size {
            output.acks.push(self.last_seq);
            self.frames_since_ack = 0;
        }
    }

    /// Sequence number of the most recent data frame
    #[must_use]
    pub const fn last_seq(&self) -> u32 {
        self.last_seq
    }
}

/// Encode a `2A` ack frame for `seq`
#[must_use]
pub fn encode_ack(seq: u32) -> [u8; 6] {
    let seq_bytes = seq.to_be_bytes();
    [
        VERSION,
        b'A',
        seq_bytes[0],
        seq_bytes[1],
        seq_bytes[2],
        seq_bytes[3],
    ]
}

/// Parse one Beats JSON document into a normalized event
///
/// Filebeat documents put the line in `message`, the host under
/// `host.name`, and a `@timestamp` in RFC 3339.
///
/// # Errors
///
/// Returns an error if the payload is not a JSON object
pub fn parse_json_payload(payload: &[u8], peer: SocketAddr) -> Result<NormalizedEvent, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidUtf8)?;
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let obj = value.as_object().ok_or_else(|| ParseError::Malformed {
        protocol: Protocol::Beats,
        detail: "payload is not a JSON object".into(),
    })?;

    let mut event = NormalizedEvent::new(Protocol::Beats, peer);
    event.facility = None;

    if let Some(message) = obj.get("message").and_then(|v| v.as_str()) {
        event.message = message.to_owned();
    }
    event.hostname = obj
        .get("host")
        .and_then(|h| h.get("name").or(Some(h)))
        .and_then(|v| v.as_str())
        .map(str::to_owned);
    event.app_name = value
        .pointer("/agent/type")
        .or_else(|| value.pointer("/input/type"))
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    if let Some(ts) = obj.get("@timestamp").and_then(|v| v.as_str()) {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
            event.timestamp = parsed.with_timezone(&Utc);
        }
    }

    if let Some(level) = value.pointer("/log/level").and_then(|v| v.as_str()) {
        event.severity = severity_from_level_name(level);
    }

    for (key, val) in obj {
        if !matches!(key.as_str(), "message" | "@timestamp" | "host") {
            event.extra.insert(key.clone(), val.clone());
        }
    }

    Ok(event)
}

/// Map a textual log level onto the syslog severity scale
fn severity_from_level_name(level: &str) -> u8 {
    match level.to_ascii_lowercase().as_str() {
        "emergency" | "emerg" | "fatal" => 0,
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
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn peer() -> SocketAddr {
        "203.0.113.7:5044".parse().unwrap()
    }

    fn window_frame(size: u32) -> Vec<u8> {
        let mut f = vec![VERSION, b'W'];
        f.extend_from_slice(&size.to_be_bytes());
        f
    }

    fn json_frame(seq: u32, doc: &str) -> Vec<u8> {
        let mut f = vec![VERSION, b'J'];
        f.extend_from_slice(&seq.to_be_bytes());
        f.extend_from_slice(&u32::try_from(doc.len()).unwrap().to_be_bytes());
        f.extend_from_slice(doc.as_bytes());
        f
    }

    fn sample_doc(n: u32) -> String {
        serde_json::json!({
            "@timestamp": "2025-08-27T10:00:00Z",
            "message": format!("line {n}"),
            "host": {"name": "edge-1"},
            "log": {"level": "error"},
            "agent": {"type": "filebeat"}
        })
        .to_string()
    }

    #[test]
    fn test_window_and_json_frames_produce_ack() {
        let mut decoder = LumberjackDecoder::new();
        let mut buf = window_frame(2);
        buf.extend(json_frame(1, &sample_doc(1)));
        buf.extend(json_frame(2, &sample_doc(2)));

        let out = decoder.decode(&mut buf, peer()).unwrap();
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.acks, vec![2]);
        assert!(buf.is_empty());

        let event = &out.events[0];
        assert_eq!(event.message, "line 1");
        assert_eq!(event.hostname.as_deref(), Some("edge-1"));
        assert_eq!(event.app_name.as_deref(), Some("filebeat"));
        assert_eq!(event.severity, 3);
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut decoder = LumberjackDecoder::new();
        let frame = json_frame(1, &sample_doc(1));
        let mut buf = frame[..frame.len() - 4].to_vec();

        let out = decoder.decode(&mut buf, peer()).unwrap();
        assert!(out.events.is_empty());
        assert_eq!(buf.len(), frame.len() - 4);

        buf.extend_from_slice(&frame[frame.len() - 4..]);
        let out = decoder.decode(&mut buf, peer()).unwrap();
        assert_eq!(out.events.len(), 1);
    }

    #[test]
    fn test_compressed_batch() {
        let mut inner = json_frame(1, &sample_doc(1));
        inner.extend(json_frame(2, &sample_doc(2)));

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&inner).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut buf = window_frame(2);
        buf.push(VERSION);
        buf.push(b'C');
        buf.extend_from_slice(&u32::try_from(compressed.len()).unwrap().to_be_bytes());
        buf.extend_from_slice(&compressed);

        let mut decoder = LumberjackDecoder::new();
        let out = decoder.decode(&mut buf, peer()).unwrap();
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.acks, vec![2]);
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut decoder = LumberjackDecoder::new();
        let mut buf = vec![b'3', b'W', 0, 0, 0, 1];
        assert!(decoder.decode(&mut buf, peer()).is_err());
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let mut decoder = LumberjackDecoder::new();
        let mut buf = vec![VERSION, b'Q'];
        assert!(decoder.decode(&mut buf, peer()).is_err());
    }

    #[test]
    fn test_encode_ack() {
        assert_eq!(encode_ack(258), [b'2', b'A', 0, 0, 1, 2]);
    }

    #[test]
    fn test_nested_document_fields() {
        let doc = br#"{"message":"m","host":{"name":"h"},"input":{"type":"log"},"log":{"level":"warn"}}"#;
        let event = parse_json_payload(doc, peer()).unwrap();

        // No agent.type here, so input.type supplies the app name
        assert_eq!(event.app_name.as_deref(), Some("log"));
        assert_eq!(event.severity, 4);

        let doc = br#"{"message":"m","host":"bare-host"}"#;
        let event = parse_json_payload(doc, peer()).unwrap();
        assert_eq!(event.hostname.as_deref(), Some("bare-host"));
        assert!(event.app_name.is_none());
    }
}
