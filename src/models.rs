// ABOUTME: Common data models shared across the control plane and data layer
// ABOUTME: Users, sessions, API keys, audit events, dashboards, and alert rules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 LogHaven Project

//! # Data Models
//!
//! Canonical definitions of the rows the control plane reads and writes.
//! Serialization here is the REST wire format; the database layer maps
//! these to and from SQLite columns by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role assigned to a console user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full access: user management, settings, alert rules
    Admin,
    /// Self-service access: own keys, dashboards, read-only status
    User,
}

impl UserRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Parse from a database column value
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }
}

/// Account lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Registered, awaiting admin approval
    Pending,
    /// Approved and allowed to log in
    Active,
    /// Locked out by an admin
    Suspended,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }

    /// Parse from a database column value
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "suspended" => Self::Suspended,
            _ => Self::Pending,
        }
    }
}

/// A console user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,
    /// Login email, unique
    pub email: String,
    /// Optional display name
    pub display_name: Option<String>,
    /// Bcrypt password hash, never serialized to clients
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Role for authorization checks
    pub role: UserRole,
    /// Account state
    pub status: UserStatus,
    /// When the account was created
    pub created_at: DateTime<Utc>,
    /// Last successful authentication
    pub last_active: DateTime<Utc>,
}

impl User {
    /// Create a new pending user with the `user` role
    #[must_use]
    pub fn new(email: String, password_hash: String, display_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            display_name,
            password_hash,
            role: UserRole::User,
            status: UserStatus::Pending,
            created_at: Utc::now(),
            last_active: Utc::now(),
        }
    }

    /// Whether this user may call admin endpoints
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

/// A recorded login session backing a JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// JWT ID claim; primary key
    pub jti: String,
    /// Owning user
    pub user_id: Uuid,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
    /// Whether the session has been revoked (logout)
    pub revoked: bool,
    /// Peer address at login, if known
    pub ip_address: Option<String>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last request seen on this session
    pub last_seen_at: DateTime<Utc>,
}

/// API key tier determines the monthly request allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyTier {
    Trial,
    Starter,
    Professional,
    Enterprise,
}

impl ApiKeyTier {
    /// Monthly request limit (None = unlimited)
    #[must_use]
    pub const fn monthly_limit(&self) -> Option<u32> {
        match self {
            Self::Trial => Some(1_000),
            Self::Starter => Some(10_000),
            Self::Professional => Some(100_000),
            Self::Enterprise => None,
        }
    }

    /// Rate limit window length in seconds (all tiers use a monthly window)
    #[must_use]
    pub const fn rate_limit_window(&self) -> u32 {
        30 * 24 * 60 * 60
    }

    /// Default trial period in days
    #[must_use]
    pub const fn default_trial_days(&self) -> Option<i64> {
        match self {
            Self::Trial => Some(14),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_trial(&self) -> bool {
        matches!(self, Self::Trial)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parse from a database column value
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "trial" => Self::Trial,
            "professional" => Self::Professional,
            "enterprise" => Self::Enterprise,
            _ => Self::Starter,
        }
    }
}

/// An API key record (the full key value is never stored)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Unique identifier
    pub id: String,
    /// Owning user
    pub user_id: Uuid,
    /// User-provided name
    pub name: String,
    /// First characters of the key, for identification
    pub key_prefix: String,
    /// SHA-256 hex digest of the full key
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// Optional description
    pub description: Option<String>,
    /// Tier for rate limiting
    pub tier: ApiKeyTier,
    /// Requests allowed per window
    pub rate_limit_requests: u32,
    /// Rate limit window in seconds
    pub rate_limit_window_seconds: u32,
    /// Whether the key is usable
    pub is_active: bool,
    /// Last authenticated request
    pub last_used_at: Option<DateTime<Utc>>,
    /// Expiry, if any
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Freshly generated key material
#[derive(Debug)]
pub struct ApiKeyData {
    /// The complete key, shown to the user exactly once
    pub full_key: String,
    /// Identification prefix stored alongside the record
    pub key_prefix: String,
    /// SHA-256 hex digest for storage
    pub key_hash: String,
}

/// Request payload for API key creation
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Requested monthly rate limit; tier is derived from this
    pub rate_limit_requests: u32,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

/// A single API key usage record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyUsage {
    pub id: Option<i64>,
    pub api_key_id: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub status_code: u16,
    pub response_time_ms: Option<u32>,
}

/// Aggregated usage statistics for an API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyUsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
}

/// Rate limit snapshot returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub is_rate_limited: bool,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

/// One entry in the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Autoincrement id, None until stored
    pub id: Option<i64>,
    /// Acting user, if the action was user-initiated
    pub user_id: Option<Uuid>,
    /// Machine-readable action name, e.g. `api_key.created`
    pub action: String,
    /// Affected resource identifier
    pub target: Option<String>,
    /// Structured context
    pub detail: serde_json::Value,
    /// Peer address, if known
    pub ip_address: Option<String>,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Create an event for recording; id is assigned by the database
    #[must_use]
    pub fn new(action: impl Into<String>, user_id: Option<Uuid>) -> Self {
        Self {
            id: None,
            user_id,
            action: action.into(),
            target: None,
            detail: serde_json::Value::Object(serde_json::Map::new()),
            ip_address: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }
}

/// Kinds of widget the dashboard builder can place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    /// Time-series chart of event counts
    EventChart,
    /// Single large number (counter)
    Counter,
    /// Table of recent events
    EventTable,
    /// Severity distribution
    SeverityBreakdown,
    /// Free-form markdown note
    Note,
}

/// One widget placed on a dashboard grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    /// Stable identifier within the dashboard
    pub id: String,
    /// What the widget renders
    pub kind: WidgetKind,
    /// Display title
    pub title: String,
    /// Grid column (0-based)
    pub col: u32,
    /// Grid row (0-based)
    pub row: u32,
    /// Horizontal span in grid cells
    pub width: u32,
    /// Vertical span in grid cells
    pub height: u32,
    /// Widget-specific query/config payload
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Validated dashboard layout document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardLayout {
    /// Grid column count (builder uses a 12-column grid)
    pub columns: u32,
    /// Placed widgets
    pub widgets: Vec<Widget>,
}

impl Default for DashboardLayout {
    fn default() -> Self {
        Self {
            columns: 12,
            widgets: Vec::new(),
        }
    }
}

impl DashboardLayout {
    /// Validate widget placement against the grid
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid widget found
    pub fn validate(&self) -> Result<(), String> {
        if self.columns == 0 || self.columns > 24 {
            return Err(format!("invalid column count {}", self.columns));
        }
        let mut seen = std::collections::HashSet::new();
        for widget in &self.widgets {
            if widget.id.is_empty() {
                return Err("widget id must not be empty".into());
            }
            if !seen.insert(widget.id.as_str()) {
                return Err(format!("duplicate widget id {}", widget.id));
            }
            if widget.width == 0 || widget.height == 0 {
                return Err(format!("widget {} has zero span", widget.id));
            }
            let end = widget.col.checked_add(widget.width);
            if end.map_or(true, |end| end > self.columns) {
                return Err(format!("widget {} overflows the grid", widget.id));
            }
        }
        Ok(())
    }
}

/// A saved dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Widget layout document
    pub layout: DashboardLayout,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// An alert rule matched against the ingestion stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Minimum syslog severity (0 = emerg .. 7 = debug); events at this
    /// level or more severe match
    pub min_severity: u8,
    /// Optional case-insensitive substring the message must contain
    pub match_substring: Option<String>,
    /// Optional protocol filter (`syslog`, `gelf`, `beats`, `fluent`)
    pub protocol: Option<String>,
    /// Whether the rule is evaluated
    pub enabled: bool,
    /// How many events have matched
    pub trigger_count: u64,
    /// Most recent match
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defaults_to_pending() {
        let user = User::new("a@b.c".into(), "hash".into(), None);
        assert_eq!(user.status, UserStatus::Pending);
        assert_eq!(user.role, UserRole::User);
        assert!(!user.is_admin());
    }

    #[test]
    fn test_tier_limits() {
        assert_eq!(ApiKeyTier::Trial.monthly_limit(), Some(1_000));
        assert_eq!(ApiKeyTier::Starter.monthly_limit(), Some(10_000));
        assert_eq!(ApiKeyTier::Professional.monthly_limit(), Some(100_000));
        assert_eq!(ApiKeyTier::Enterprise.monthly_limit(), None);
        assert!(ApiKeyTier::Trial.is_trial());
        assert!(!ApiKeyTier::Starter.is_trial());
    }

    #[test]
    fn test_layout_validation() {
        let mut layout = DashboardLayout::default();
        layout.widgets.push(Widget {
            id: "w1".into(),
            kind: WidgetKind::Counter,
            title: "Events today".into(),
            col: 0,
            row: 0,
            width: 4,
            height: 2,
            config: serde_json::json!({}),
        });
        assert!(layout.validate().is_ok());

        layout.widgets.push(Widget {
            id: "w2".into(),
            kind: WidgetKind::EventChart,
            title: "Overflow".into(),
            col: 10,
            row: 0,
            width: 4,
            height: 2,
            config: serde_json::json!({}),
        });
        assert!(layout.validate().unwrap_err().contains("overflows"));
    }

    #[test]
    fn test_layout_placement_near_u32_max_is_rejected() {
        let layout = DashboardLayout {
            columns: 12,
            widgets: vec![Widget {
                id: "w1".into(),
                kind: WidgetKind::Counter,
                title: "Wrap".into(),
                col: u32::MAX,
                row: 0,
                width: 2,
                height: 1,
                config: serde_json::json!({}),
            }],
        };
        // col + width must not wrap around and pass the grid check
        assert!(layout.validate().unwrap_err().contains("overflows"));
    }

    #[test]
    fn test_layout_rejects_duplicate_ids() {
        let widget = Widget {
            id: "dup".into(),
            kind: WidgetKind::Note,
            title: "n".into(),
            col: 0,
            row: 0,
            width: 1,
            height: 1,
            config: serde_json::json!({}),
        };
        let layout = DashboardLayout {
            columns: 12,
            widgets: vec![widget.clone(), widget],
        };
        assert!(layout.validate().unwrap_err().contains("duplicate"));
    }
}
