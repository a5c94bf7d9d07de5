// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, deployment modes, and runtime configuration parsing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

//! Environment-based configuration management for production deployment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Environment type for security and other configurations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Type-safe database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database with file path
    SQLite { path: PathBuf },
    /// In-memory SQLite (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string with validation
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite:").unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_string(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/loghaven.db"),
        }
    }
}

/// Bind configuration for one ingestion listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Whether this listener starts with the server
    pub enabled: bool,
    /// Socket address to bind, e.g. `0.0.0.0:5514`
    pub bind: String,
}

impl ListenerConfig {
    fn from_env(prefix: &str, default_port: u16) -> Self {
        let enabled = env::var(format!("{prefix}_ENABLED"))
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let bind = env::var(format!("{prefix}_BIND"))
            .unwrap_or_else(|_| format!("0.0.0.0:{default_port}"));
        Self { enabled, bind }
    }
}

/// Ingestion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Syslog over UDP (datagram per message)
    pub syslog_udp: ListenerConfig,
    /// Syslog over TCP (newline framed)
    pub syslog_tcp: ListenerConfig,
    /// GELF over UDP (chunked, optionally compressed)
    pub gelf_udp: ListenerConfig,
    /// GELF over TCP (null-byte framed JSON)
    pub gelf_tcp: ListenerConfig,
    /// Beats / Lumberjack v2 over TCP
    pub beats: ListenerConfig,
    /// Fluent Bit newline-delimited JSON over TCP
    pub fluent: ListenerConfig,
    /// Events per second allowed per peer address
    pub peer_events_per_sec: u32,
    /// Burst capacity of the per-peer token bucket
    pub peer_burst: u32,
    /// Maximum size of a single event payload in bytes
    pub max_event_bytes: usize,
    /// Capacity of the in-memory recent-events ring
    pub recent_buffer_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            syslog_udp: ListenerConfig {
                enabled: true,
                bind: "0.0.0.0:5514".into(),
            },
            syslog_tcp: ListenerConfig {
                enabled: true,
                bind: "0.0.0.0:5514".into(),
            },
            gelf_udp: ListenerConfig {
                enabled: true,
                bind: "0.0.0.0:12201".into(),
            },
            gelf_tcp: ListenerConfig {
                enabled: true,
                bind: "0.0.0.0:12201".into(),
            },
            beats: ListenerConfig {
                enabled: true,
                bind: "0.0.0.0:5044".into(),
            },
            fluent: ListenerConfig {
                enabled: true,
                bind: "0.0.0.0:24224".into(),
            },
            peer_events_per_sec: 5_000,
            peer_burst: 10_000,
            max_event_bytes: 1_048_576,
            recent_buffer_size: 1_000,
        }
    }
}

impl IngestionConfig {
    /// Load ingestion configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            syslog_udp: ListenerConfig::from_env("SYSLOG_UDP", 5514),
            syslog_tcp: ListenerConfig::from_env("SYSLOG_TCP", 5514),
            gelf_udp: ListenerConfig::from_env("GELF_UDP", 12201),
            gelf_tcp: ListenerConfig::from_env("GELF_TCP", 12201),
            beats: ListenerConfig::from_env("BEATS", 5044),
            fluent: ListenerConfig::from_env("FLUENT", 24224),
            peer_events_per_sec: parse_env("INGEST_PEER_EVENTS_PER_SEC")
                .unwrap_or(defaults.peer_events_per_sec),
            peer_burst: parse_env("INGEST_PEER_BURST").unwrap_or(defaults.peer_burst),
            max_event_bytes: parse_env("INGEST_MAX_EVENT_BYTES")
                .unwrap_or(defaults.max_event_bytes),
            recent_buffer_size: parse_env("INGEST_RECENT_BUFFER_SIZE")
                .unwrap_or(defaults.recent_buffer_size),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Complete server configuration loaded from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP port for the REST control plane
    pub http_port: u16,
    /// Database location
    pub database_url: DatabaseUrl,
    /// Secret used to sign session JWTs
    pub jwt_secret: String,
    /// Session token lifetime in hours
    pub token_expiry_hours: i64,
    /// Log level
    pub log_level: LogLevel,
    /// Deployment environment
    pub environment: Environment,
    /// Ingestion engine settings
    pub ingestion: IngestionConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `LOGHAVEN_JWT_SECRET` is missing outside of
    /// development, or if numeric variables fail to parse
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str_or_default(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        );

        let jwt_secret = match env::var("LOGHAVEN_JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if environment.is_production() => {
                anyhow::bail!("LOGHAVEN_JWT_SECRET must be set in production")
            }
            Err(_) => {
                // Ephemeral secret: tokens do not survive a restart
                tracing::warn!(
                    "LOGHAVEN_JWT_SECRET not set, generating an ephemeral signing secret"
                );
                hex::encode(crate::auth::generate_jwt_secret()?)
            }
        };

        let http_port = env::var("HTTP_PORT")
            .unwrap_or_else(|_| "8081".into())
            .parse()
            .context("Invalid HTTP_PORT")?;

        let token_expiry_hours = env::var("TOKEN_EXPIRY_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .context("Invalid TOKEN_EXPIRY_HOURS")?;

        let database_url = DatabaseUrl::parse_url(
            &env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./data/loghaven.db".into()),
        );

        let config = Self {
            http_port,
            database_url,
            jwt_secret,
            token_expiry_hours,
            log_level: LogLevel::from_str_or_default(
                &env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            ),
            environment,
            ingestion: IngestionConfig::from_env(),
        };

        config.log_summary();
        Ok(config)
    }

    /// Configuration suitable for tests: in-memory database, random-free ports
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            http_port: 0,
            database_url: DatabaseUrl::Memory,
            jwt_secret: "test-secret".into(),
            token_expiry_hours: 1,
            log_level: LogLevel::Debug,
            environment: Environment::Testing,
            ingestion: IngestionConfig {
                syslog_udp: ListenerConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                },
                syslog_tcp: ListenerConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                },
                gelf_udp: ListenerConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                },
                gelf_tcp: ListenerConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                },
                beats: ListenerConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                },
                fluent: ListenerConfig {
                    enabled: false,
                    bind: "127.0.0.1:0".into(),
                },
                ..IngestionConfig::default()
            },
        }
    }

    fn log_summary(&self) {
        info!(
            http.port = self.http_port,
            db.memory = self.database_url.is_memory(),
            environment = %self.environment,
            "Server configuration loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_parsing() {
        assert!(DatabaseUrl::parse_url("sqlite::memory:").is_memory());
        let url = DatabaseUrl::parse_url("sqlite:./data/loghaven.db");
        assert_eq!(url.to_connection_string(), "sqlite:./data/loghaven.db");
        // Bare paths are treated as SQLite files
        let url = DatabaseUrl::parse_url("/var/lib/loghaven.db");
        assert_eq!(url.to_connection_string(), "sqlite:/var/lib/loghaven.db");
    }

    #[test]
    fn test_log_level_fallback() {
        assert_eq!(LogLevel::from_str_or_default("warn"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str_or_default("bogus"), LogLevel::Info);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            Environment::from_str_or_default("prod"),
            Environment::Production
        );
        assert!(Environment::from_str_or_default("production").is_production());
        assert_eq!(
            Environment::from_str_or_default("anything"),
            Environment::Development
        );
    }

    #[test]
    fn test_testing_config_disables_listeners() {
        let config = ServerConfig::for_testing();
        assert!(config.database_url.is_memory());
        assert!(!config.ingestion.syslog_udp.enabled);
        assert!(!config.ingestion.beats.enabled);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_overrides() {
        std::env::set_var("HTTP_PORT", "9099");
        std::env::set_var("LOGHAVEN_JWT_SECRET", "unit-test-secret");
        std::env::set_var("TOKEN_EXPIRY_HOURS", "2");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.http_port, 9099);
        assert_eq!(config.jwt_secret, "unit-test-secret");
        assert_eq!(config.token_expiry_hours, 2);

        std::env::remove_var("HTTP_PORT");
        std::env::remove_var("LOGHAVEN_JWT_SECRET");
        std::env::remove_var("TOKEN_EXPIRY_HOURS");
    }

    #[test]
    #[serial_test::serial]
    fn test_production_requires_jwt_secret() {
        std::env::remove_var("LOGHAVEN_JWT_SECRET");
        std::env::set_var("ENVIRONMENT", "production");

        assert!(ServerConfig::from_env().is_err());

        std::env::remove_var("ENVIRONMENT");
    }
}
