// ABOUTME: Protocol listener tasks and the ingestion engine entry point
// ABOUTME: One tokio task per enabled listener, all feeding a shared mpsc channel
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

use super::gelf::ChunkAssembler;
use super::pipeline::{EventProcessor, EventRing};
use super::{beats, fluent, gelf, syslog, IngestionStats, NormalizedEvent, ParseError, Protocol};
use crate::config::IngestionConfig;
use crate::database::Database;
use crate::logging::AppLogger;
use crate::rate_limiting::PeerRateLimiter;
use anyhow::{Context, Result};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Depth of the listener-to-processor channel
const CHANNEL_CAPACITY: usize = 4096;
/// Largest UDP datagram we will read
const UDP_BUFFER_SIZE: usize = 64 * 1024;
/// Read chunk size for TCP connections
const TCP_READ_CHUNK: usize = 8 * 1024;
/// How often idle peer buckets are dropped
const LIMITER_PRUNE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

/// One listener's advertised state for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ListenerInfo {
    pub protocol: Protocol,
    pub transport: &'static str,
    pub bind: String,
    pub enabled: bool,
}

/// The ingestion engine: owns stats, the recent-events ring, the per-peer
/// limiter, and the channel into the processor task
pub struct IngestionEngine {
    config: IngestionConfig,
    stats: Arc<IngestionStats>,
    ring: Arc<EventRing>,
    limiter: Arc<PeerRateLimiter>,
    tx: mpsc::Sender<NormalizedEvent>,
    listeners: Vec<ListenerInfo>,
}

impl IngestionEngine {
    /// Create the engine and spawn the processor task
    #[must_use]
    pub fn new(config: IngestionConfig, database: Database) -> Self {
        let stats = Arc::new(IngestionStats::new());
        let ring = Arc::new(EventRing::new(config.recent_buffer_size));
        let limiter = Arc::new(PeerRateLimiter::new(
            config.peer_events_per_sec,
            config.peer_burst,
        ));
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let processor = EventProcessor::new(database, Arc::clone(&ring), Arc::clone(&stats));
        tokio::spawn(processor.run(rx));

        let listeners = vec![
            ListenerInfo {
                protocol: Protocol::Syslog,
                transport: "udp",
                bind: config.syslog_udp.bind.clone(),
                enabled: config.syslog_udp.enabled,
            },
            ListenerInfo {
                protocol: Protocol::Syslog,
                transport: "tcp",
                bind: config.syslog_tcp.bind.clone(),
                enabled: config.syslog_tcp.enabled,
            },
            ListenerInfo {
                protocol: Protocol::Gelf,
                transport: "udp",
                bind: config.gelf_udp.bind.clone(),
                enabled: config.gelf_udp.enabled,
            },
            ListenerInfo {
                protocol: Protocol::Gelf,
                transport: "tcp",
                bind: config.gelf_tcp.bind.clone(),
                enabled: config.gelf_tcp.enabled,
            },
            ListenerInfo {
                protocol: Protocol::Beats,
                transport: "tcp",
                bind: config.beats.bind.clone(),
                enabled: config.beats.enabled,
            },
            ListenerInfo {
                protocol: Protocol::Fluent,
                transport: "tcp",
                bind: config.fluent.bind.clone(),
                enabled: config.fluent.enabled,
            },
        ];

        Self {
            config,
            stats,
            ring,
            limiter,
            tx,
            listeners,
        }
    }

    /// Bind and spawn every enabled listener
    ///
    /// # Errors
    ///
    /// Returns an error if any enabled listener fails to bind
    pub async fn start(&self) -> Result<()> {
        let limiter = Arc::clone(&self.limiter);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                limiter.prune_idle();
            }
        });

        if self.config.syslog_udp.enabled {
            let socket = UdpSocket::bind(&self.config.syslog_udp.bind)
                .await
                .with_context(|| format!("syslog udp bind {}", self.config.syslog_udp.bind))?;
            AppLogger::log_listener_event("syslog", &self.config.syslog_udp.bind, "listening/udp");
            tokio::spawn(run_syslog_udp(socket, self.shared()));
        }
        if self.config.syslog_tcp.enabled {
            let listener = TcpListener::bind(&self.config.syslog_tcp.bind)
                .await
                .with_context(|| format!("syslog tcp bind {}", self.config.syslog_tcp.bind))?;
            AppLogger::log_listener_event("syslog", &self.config.syslog_tcp.bind, "listening/tcp");
            tokio::spawn(run_tcp_accept_loop(listener, self.shared(), handle_syslog_conn));
        }
        if self.config.gelf_udp.enabled {
            let socket = UdpSocket::bind(&self.config.gelf_udp.bind)
                .await
                .with_context(|| format!("gelf udp bind {}", self.config.gelf_udp.bind))?;
            AppLogger::log_listener_event("gelf", &self.config.gelf_udp.bind, "listening/udp");
            tokio::spawn(run_gelf_udp(socket, self.shared()));
        }
        if self.config.gelf_tcp.enabled {
            let listener = TcpListener::bind(&self.config.gelf_tcp.bind)
                .await
                .with_context(|| format!("gelf tcp bind {}", self.config.gelf_tcp.bind))?;
            AppLogger::log_listener_event("gelf", &self.config.gelf_tcp.bind, "listening/tcp");
            tokio::spawn(run_tcp_accept_loop(listener, self.shared(), handle_gelf_conn));
        }
        if self.config.beats.enabled {
            let listener = TcpListener::bind(&self.config.beats.bind)
                .await
                .with_context(|| format!("beats bind {}", self.config.beats.bind))?;
            AppLogger::log_listener_event("beats", &self.config.beats.bind, "listening/tcp");
            tokio::spawn(run_tcp_accept_loop(listener, self.shared(), handle_beats_conn));
        }
        if self.config.fluent.enabled {
            let listener = TcpListener::bind(&self.config.fluent.bind)
                .await
                .with_context(|| format!("fluent bind {}", self.config.fluent.bind))?;
            AppLogger::log_listener_event("fluent", &self.config.fluent.bind, "listening/tcp");
            tokio::spawn(run_tcp_accept_loop(listener, self.shared(), handle_fluent_conn));
        }

        Ok(())
    }

    fn shared(&self) -> ListenerShared {
        ListenerShared {
            stats: Arc::clone(&self.stats),
            limiter: Arc::clone(&self.limiter),
            tx: self.tx.clone(),
            max_event_bytes: self.config.max_event_bytes,
        }
    }

    /// Engine statistics for the status endpoint
    #[must_use]
    pub fn stats(&self) -> &IngestionStats {
        &self.stats
    }

    /// Configured listeners and their enabled state
    #[must_use]
    pub fn listeners(&self) -> &[ListenerInfo] {
        &self.listeners
    }

    /// Recent normalized events, newest first
    #[must_use]
    pub fn recent_events(&self, limit: usize) -> Vec<NormalizedEvent> {
        self.ring.recent(limit)
    }

    /// Buffered event count
    #[must_use]
    pub fn buffered_events(&self) -> usize {
        self.ring.len()
    }

    /// Parse a sample payload as `protocol` without feeding the pipeline
    ///
    /// # Errors
    ///
    /// Returns the parse error the listeners would have recorded
    pub fn test_parse(
        protocol: Protocol,
        payload: &[u8],
    ) -> Result<NormalizedEvent, ParseError> {
        let peer = SocketAddr::from(([127, 0, 0, 1], 0));
        super::parse_payload(protocol, payload, peer)
    }
}

/// Everything a listener task needs, cheaply cloneable
#[derive(Clone)]
struct ListenerShared {
    stats: Arc<IngestionStats>,
    limiter: Arc<PeerRateLimiter>,
    tx: mpsc::Sender<NormalizedEvent>,
    max_event_bytes: usize,
}

impl ListenerShared {
    /// Run the post-parse path: rate limit, count, forward
    async fn submit(
        &self,
        protocol: Protocol,
        peer: SocketAddr,
        parsed: Result<NormalizedEvent, ParseError>,
    ) {
        let counters = self.stats.protocol(protocol);
        match parsed {
            Ok(event) => {
                if self.limiter.check(peer.ip()) {
                    counters.note_parsed();
                    if self.tx.send(event).await.is_err() {
                        warn!("Event channel closed; dropping {protocol} event");
                    }
                } else {
                    counters.note_rate_limited();
                }
            }
            Err(e) => {
                counters.note_parse_failure();
                debug!("{protocol} parse failure from {peer}: {e}");
            }
        }
    }
}

async fn run_syslog_udp(socket: UdpSocket, shared: ListenerShared) {
    let mut buf = vec![0u8; UDP_BUFFER_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                let payload = &buf[..len.min(shared.max_event_bytes)];
                shared.stats.protocol(Protocol::Syslog).note_received(len);
                let parsed = syslog::parse(payload, peer);
                shared.submit(Protocol::Syslog, peer, parsed).await;
            }
            Err(e) => {
                warn!("syslog udp recv error: {e}");
            }
        }
    }
}

async fn run_gelf_udp(socket: UdpSocket, shared: ListenerShared) {
    let assembler = Arc::new(ChunkAssembler::new());

    // Periodic sweep for incomplete chunk sets
    let sweeper = Arc::clone(&assembler);
    let sweep_stats = Arc::clone(&shared.stats);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(gelf::CHUNK_TTL);
        loop {
            interval.tick().await;
            let dropped = sweeper.sweep_expired();
            if dropped > 0 {
                debug!("Expired {dropped} incomplete GELF chunk sets");
                for _ in 0..dropped {
                    sweep_stats.protocol(Protocol::Gelf).note_parse_failure();
                }
            }
        }
    });

    let mut buf = vec![0u8; UDP_BUFFER_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                shared.stats.protocol(Protocol::Gelf).note_received(len);
                match assembler.ingest(&buf[..len], peer) {
                    Ok(Some(event)) => {
                        shared.submit(Protocol::Gelf, peer, Ok(event)).await;
                    }
                    Ok(None) => {} // chunk buffered, message not yet complete
                    Err(e) => {
                        shared.submit(Protocol::Gelf, peer, Err(e)).await;
                    }
                }
            }
            Err(e) => {
                warn!("gelf udp recv error: {e}");
            }
        }
    }
}

async fn run_tcp_accept_loop<F, Fut>(listener: TcpListener, shared: ListenerShared, handler: F)
where
    F: Fn(TcpStream, SocketAddr, ListenerShared) -> Fut + Send + Copy + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Accepted connection from {peer}");
                tokio::spawn(handler(stream, peer, shared.clone()));
            }
            Err(e) => {
                warn!("tcp accept error: {e}");
            }
        }
    }
}

/// Newline-framed syslog over TCP
async fn handle_syslog_conn(mut stream: TcpStream, peer: SocketAddr, shared: ListenerShared) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; TCP_READ_CHUNK];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    shared.stats.protocol(Protocol::Syslog).note_received(line.len());
                    let payload = &line[..line.len().min(shared.max_event_bytes)];
                    let parsed = syslog::parse(payload, peer);
                    shared.submit(Protocol::Syslog, peer, parsed).await;
                }
                if buf.len() > shared.max_event_bytes {
                    warn!("syslog tcp line from {peer} exceeds max event size; dropping connection");
                    return;
                }
            }
            Err(e) => {
                debug!("syslog tcp read error from {peer}: {e}");
                return;
            }
        }
    }

    // Trailing unterminated line still counts
    if !buf.is_empty() {
        shared.stats.protocol(Protocol::Syslog).note_received(buf.len());
        let parsed = syslog::parse(&buf, peer);
        shared.submit(Protocol::Syslog, peer, parsed).await;
    }
}

/// Null-byte framed uncompressed GELF over TCP
async fn handle_gelf_conn(mut stream: TcpStream, peer: SocketAddr, shared: ListenerShared) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; TCP_READ_CHUNK];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buf.iter().position(|b| *b == 0) {
                    let frame: Vec<u8> = buf.drain(..=pos).collect();
                    let doc = &frame[..frame.len() - 1];
                    shared.stats.protocol(Protocol::Gelf).note_received(doc.len());
                    let parsed = if doc.len() > shared.max_event_bytes {
                        Err(ParseError::TooLarge {
                            size: doc.len(),
                            limit: shared.max_event_bytes,
                        })
                    } else {
                        gelf::parse_uncompressed(doc, peer)
                    };
                    shared.submit(Protocol::Gelf, peer, parsed).await;
                }
                if buf.len() > shared.max_event_bytes {
                    warn!("gelf tcp frame from {peer} exceeds max event size; dropping connection");
                    return;
                }
            }
            Err(e) => {
                debug!("gelf tcp read error from {peer}: {e}");
                return;
            }
        }
    }
}

/// Lumberjack v2 framed Beats connection with acks
async fn handle_beats_conn(mut stream: TcpStream, peer: SocketAddr, shared: ListenerShared) {
    let mut decoder = beats::LumberjackDecoder::new();
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; TCP_READ_CHUNK];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                shared.stats.protocol(Protocol::Beats).note_received(n);
                buf.extend_from_slice(&chunk[..n]);

                let output = match decoder.decode(&mut buf, peer) {
                    Ok(output) => output,
                    Err(e) => {
                        shared.stats.protocol(Protocol::Beats).note_parse_failure();
                        warn!("beats framing error from {peer}: {e}; dropping connection");
                        return;
                    }
                };

                for event in output.events {
                    shared.submit(Protocol::Beats, peer, Ok(event)).await;
                }
                for seq in output.acks {
                    if let Err(e) = stream.write_all(&beats::encode_ack(seq)).await {
                        debug!("beats ack write failed for {peer}: {e}");
                        return;
                    }
                }
            }
            Err(e) => {
                debug!("beats read error from {peer}: {e}");
                return;
            }
        }
    }
}

/// Newline-delimited JSON Fluent Bit connection
async fn handle_fluent_conn(mut stream: TcpStream, peer: SocketAddr, shared: ListenerShared) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; TCP_READ_CHUNK];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    shared.stats.protocol(Protocol::Fluent).note_received(line.len());
                    let parsed = if line.len() > shared.max_event_bytes {
                        Err(ParseError::TooLarge {
                            size: line.len(),
                            limit: shared.max_event_bytes,
                        })
                    } else {
                        fluent::parse_line(&line, peer)
                    };
                    shared.submit(Protocol::Fluent, peer, parsed).await;
                }
                if buf.len() > shared.max_event_bytes {
                    warn!("fluent record from {peer} exceeds max event size; dropping connection");
                    return;
                }
            }
            Err(e) => {
                debug!("fluent read error from {peer}: {e}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_parse_each_protocol() {
        let ok = IngestionEngine::test_parse(Protocol::Syslog, b"<13>1 - host app - - - hi");
        assert_eq!(ok.unwrap().message, "hi");

        let gelf_doc = br#"{"version":"1.1","host":"h","short_message":"m"}"#;
        assert!(IngestionEngine::test_parse(Protocol::Gelf, gelf_doc).is_ok());

        let beats_doc = br#"{"message":"m","host":{"name":"h"}}"#;
        assert!(IngestionEngine::test_parse(Protocol::Beats, beats_doc).is_ok());

        let fluent_doc = br#"{"log":"m"}"#;
        assert!(IngestionEngine::test_parse(Protocol::Fluent, fluent_doc).is_ok());

        assert!(IngestionEngine::test_parse(Protocol::Gelf, b"{}").is_err());
    }
}
