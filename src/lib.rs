// ABOUTME: Main library entry point for the LogHaven platform
// ABOUTME: Provides the admin REST control plane and multi-protocol log ingestion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

#![deny(unsafe_code)]

//! # LogHaven Server
//!
//! An admin console and ingestion engine for a log management platform.
//! The REST control plane covers users, sessions, API keys, settings, an
//! audit trail, dashboards, and alert rules over `SQLite`; the ingestion
//! engine accepts syslog, GELF, Beats (Lumberjack v2), and Fluent Bit
//! traffic and normalizes every event onto one severity scale.
//!
//! ## Architecture
//!
//! - **Routes**: One route group per API area, merged into a single router
//! - **Database**: One `impl Database` block per domain, raw `SQL` over `sqlx`
//! - **Ingest**: Protocol parsers feeding a shared pipeline with per-peer
//!   rate limiting, live counters, and alert rule evaluation
//! - **Auth**: `HS256` JWTs backed by revocable server-side sessions, plus
//!   hashed API keys with monthly usage limits
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use loghaven::config::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("LogHaven configured for HTTP port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// `API` key generation, hashing, and tier assignment
pub mod api_keys;

/// Authentication and session token management
pub mod auth;

/// Configuration management from environment variables
pub mod config;

/// `SQLite` persistence for console state
pub mod database;

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Multi-protocol log ingestion engine
pub mod ingest;

/// Structured logging configuration and event helpers
pub mod logging;

/// Domain models shared across the control plane
pub mod models;

/// Monthly API key rate limiting and per-peer ingestion throttling
pub mod rate_limiting;

/// Centralized resource container for dependency injection
pub mod resources;

/// `HTTP` route groups for the REST control plane
pub mod routes;

/// Server assembly and lifecycle
pub mod server;
