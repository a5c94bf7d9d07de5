// ABOUTME: Configuration module organization for server and ingestion settings
// ABOUTME: Environment-variable driven configuration, no config files required
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! Configuration management

/// Environment-based server configuration
pub mod environment;

pub use environment::{
    DatabaseUrl, Environment, IngestionConfig, ListenerConfig, LogLevel, ServerConfig,
};
