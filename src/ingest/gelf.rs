// ABOUTME: GELF payload parsing with chunk reassembly and compression support
// ABOUTME: UDP chunked/zlib/gzip datagrams plus TCP null-framed JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! GELF (Graylog Extended Log Format) decoding.
//!
//! UDP datagrams come in three shapes, distinguished by their leading
//! bytes: chunked (`0x1e 0x0f`), zlib (`0x78`), gzip (`0x1f 0x8b`), or
//! plain JSON. Chunked messages are reassembled per 8-byte message id;
//! incomplete sets expire after [`CHUNK_TTL`]. TCP carries uncompressed
//! JSON documents separated by null bytes.

use super::{NormalizedEvent, ParseError, Protocol};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Magic bytes opening a chunked GELF datagram
pub const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];
/// Maximum chunks per message, per the GELF spec
pub const MAX_CHUNKS: u8 = 128;
/// How long an incomplete chunk set is kept before being dropped
pub const CHUNK_TTL: Duration = Duration::from_secs(5);
/// Cap on decompressed payload size
const MAX_DECOMPRESSED: usize = 8 * 1024 * 1024;

/// Classified UDP datagram
enum Datagram<'a> {
    Chunk {
        message_id: u64,
        seq: u8,
        total: u8,
        body: &'a [u8],
    },
    Whole(&'a [u8]),
}

fn classify(payload: &[u8]) -> Result<Datagram<'_>, ParseError> {
    if payload.len() >= 12 && payload[..2] == CHUNK_MAGIC {
        let message_id = u64::from_be_bytes(
            payload[2..10]
                .try_into()
                .map_err(|_| ParseError::Malformed {
                    protocol: Protocol::Gelf,
                    detail: "truncated chunk header".into(),
                })?,
        );
        let seq = payload[10];
        let total = payload[11];
        if total == 0 || total > MAX_CHUNKS || seq >= total {
            return Err(ParseError::Malformed {
                protocol: Protocol::Gelf,
                detail: format!("invalid chunk sequence {seq}/{total}"),
            });
        }
        Ok(Datagram::Chunk {
            message_id,
            seq,
            total,
            body: &payload[12..],
        })
    } else {
        Ok(Datagram::Whole(payload))
    }
}

fn decompress(payload: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::new();
    let read = if payload.starts_with(&[0x1f, 0x8b]) {
        GzDecoder::new(payload)
            .take(MAX_DECOMPRESSED as u64 + 1)
            .read_to_end(&mut out)
    } else if payload.first() == Some(&0x78) {
        ZlibDecoder::new(payload)
            .take(MAX_DECOMPRESSED as u64 + 1)
            .read_to_end(&mut out)
    } else {
        out.extend_from_slice(payload);
        Ok(payload.len())
    };
    read.map_err(|e| ParseError::Decompression(e.to_string()))?;

    if out.len() > MAX_DECOMPRESSED {
        return Err(ParseError::TooLarge {
            size: out.len(),
            limit: MAX_DECOMPRESSED,
        });
    }
    Ok(out)
}

/// Parse an uncompressed, unchunked GELF JSON document
///
/// # Errors
///
/// Returns an error if the document is not valid GELF
pub fn parse_uncompressed(payload: &[u8], peer: SocketAddr) -> Result<NormalizedEvent, ParseError> {
    let decompressed = decompress(payload)?;
    parse_json(&decompressed, peer)
}

fn parse_json(payload: &[u8], peer: SocketAddr) -> Result<NormalizedEvent, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidUtf8)?;
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let obj = value.as_object().ok_or_else(|| ParseError::Malformed {
        protocol: Protocol::Gelf,
        detail: "payload is not a JSON object".into(),
    })?;

    if !obj.contains_key("version") {
        return Err(ParseError::MissingField("version"));
    }
    let host = obj
        .get("host")
        .and_then(|v| v.as_str())
        .ok_or(ParseError::MissingField("host"))?;
    let short_message = obj
        .get("short_message")
        .and_then(|v| v.as_str())
        .ok_or(ParseError::MissingField("short_message"))?;

    let mut event = NormalizedEvent::new(Protocol::Gelf, peer);
    event.hostname = Some(host.to_owned());
    event.message = short_message.to_owned();
    event.facility = None;

    // GELF level is a syslog severity
    if let Some(level) = obj.get("level").and_then(serde_json::Value::as_u64) {
        event.severity = u8::try_from(level.min(7)).unwrap_or(7);
    }

    // Seconds since epoch, with optional fractional part
    if let Some(ts) = obj.get("timestamp").and_then(serde_json::Value::as_f64) {
        #[allow(clippy::cast_possible_truncation)]
        let secs = ts.trunc() as i64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = (ts.fract() * 1_000_000_000.0) as u32;
        if let Some(parsed) = DateTime::from_timestamp(secs, nanos) {
            event.timestamp = parsed;
        }
    }

    // Underscore-prefixed additional fields carry through without the prefix
    for (key, val) in obj {
        if let Some(name) = key.strip_prefix('_') {
            if name != "id" {
                event.extra.insert(name.to_owned(), val.clone());
            }
        }
    }
    if let Some(full) = obj.get("full_message").and_then(|v| v.as_str()) {
        event
            .extra
            .insert("full_message".to_owned(), full.into());
    }

    Ok(event)
}

struct ChunkSet {
    parts: Vec<Option<Vec<u8>>>,
    received: u8,
    first_seen: Instant,
}

/// Reassembles chunked GELF datagrams keyed by message id
pub struct ChunkAssembler {
    pending: DashMap<u64, ChunkSet>,
}

impl Default for ChunkAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Feed one UDP datagram; returns an event once a message is complete
    ///
    /// # Errors
    ///
    /// Returns an error for malformed chunks or unparseable payloads
    pub fn ingest(
        &self,
        payload: &[u8],
        peer: SocketAddr,
    ) -> Result<Option<NormalizedEvent>, ParseError> {
        match classify(payload)? {
            Datagram::Whole(body) => parse_uncompressed(body, peer).map(Some),
            Datagram::Chunk {
                message_id,
                seq,
                total,
                body,
            } => {
                let complete = {
                    let mut entry = self.pending.entry(message_id).or_insert_with(|| ChunkSet {
                        parts: vec![None; usize::from(total)],
                        received: 0,
                        first_seen: Instant::now(),
                    });

                    if entry.parts.len() != usize::from(total) {
                        // Conflicting totals for the same id; drop the older set
                        *entry = ChunkSet {
                            parts: vec![None; usize::from(total)],
                            received: 0,
                            first_seen: Instant::now(),
                        };
                    }

                    let slot = &mut entry.parts[usize::from(seq)];
                    if slot.is_none() {
                        *slot = Some(body.to_vec());
                        entry.received += 1;
                    }
                    entry.received == total
                };

                if complete {
                    let (_, set) = self
                        .pending
                        .remove(&message_id)
                        .ok_or_else(|| ParseError::Malformed {
                            protocol: Protocol::Gelf,
                            detail: "chunk set vanished during reassembly".into(),
                        })?;
                    let mut assembled = Vec::new();
                    for part in set.parts {
                        assembled.extend_from_slice(&part.unwrap_or_default());
                    }
                    parse_uncompressed(&assembled, peer).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Drop chunk sets older than [`CHUNK_TTL`]; returns how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, set| set.first_seen.elapsed() < CHUNK_TTL);
        before - self.pending.len()
    }

    /// Number of incomplete chunk sets currently held
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn peer() -> SocketAddr {
        "198.51.100.9:40000".parse().unwrap()
    }

    fn sample_doc() -> String {
        serde_json::json!({
            "version": "1.1",
            "host": "app-42",
            "short_message": "cache miss storm",
            "level": 4,
            "timestamp": 1_724_760_000.25,
            "_request_id": "abc-123",
            "_id": "ignored"
        })
        .to_string()
    }

    #[test]
    fn test_parse_plain_json() {
        let event = parse_uncompressed(sample_doc().as_bytes(), peer()).unwrap();

        assert_eq!(event.hostname.as_deref(), Some("app-42"));
        assert_eq!(event.message, "cache miss storm");
        assert_eq!(event.severity, 4);
        assert_eq!(
            event.extra.get("request_id"),
            Some(&serde_json::json!("abc-123"))
        );
        // GELF reserves _id; it must not carry through
        assert!(!event.extra.contains_key("id"));
    }

    #[test]
    fn test_parse_zlib_compressed() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(sample_doc().as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let event = parse_uncompressed(&compressed, peer()).unwrap();
        assert_eq!(event.message, "cache miss storm");
    }

    #[test]
    fn test_missing_required_fields() {
        let doc = br#"{"version":"1.1","host":"h"}"#;
        assert!(matches!(
            parse_uncompressed(doc, peer()),
            Err(ParseError::MissingField("short_message"))
        ));
    }

    fn chunk(message_id: u64, seq: u8, total: u8, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + body.len());
        out.extend_from_slice(&CHUNK_MAGIC);
        out.extend_from_slice(&message_id.to_be_bytes());
        out.push(seq);
        out.push(total);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_chunk_reassembly_out_of_order() {
        let assembler = ChunkAssembler::new();
        let doc = sample_doc();
        let half = doc.len() / 2;

        let second = chunk(7, 1, 2, &doc.as_bytes()[half..]);
        let first = chunk(7, 0, 2, &doc.as_bytes()[..half]);

        assert!(assembler.ingest(&second, peer()).unwrap().is_none());
        let event = assembler.ingest(&first, peer()).unwrap().unwrap();
        assert_eq!(event.message, "cache miss storm");
        assert_eq!(assembler.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_chunk_ignored() {
        let assembler = ChunkAssembler::new();
        let doc = sample_doc();
        let half = doc.len() / 2;
        let first = chunk(9, 0, 2, &doc.as_bytes()[..half]);

        assert!(assembler.ingest(&first, peer()).unwrap().is_none());
        assert!(assembler.ingest(&first, peer()).unwrap().is_none());
        assert_eq!(assembler.pending_count(), 1);
    }

    #[test]
    fn test_invalid_chunk_sequence() {
        let assembler = ChunkAssembler::new();
        let bad = chunk(1, 5, 3, b"x");
        assert!(assembler.ingest(&bad, peer()).is_err());
    }

    #[test]
    fn test_sweep_keeps_fresh_sets() {
        let assembler = ChunkAssembler::new();
        let first = chunk(3, 0, 2, b"{");
        assembler.ingest(&first, peer()).unwrap();

        assert_eq!(assembler.sweep_expired(), 0);
        assert_eq!(assembler.pending_count(), 1);
    }
}
