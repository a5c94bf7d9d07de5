// ABOUTME: API key database operations including usage tracking
// ABOUTME: Stores hashed keys only; lookups go through the SHA-256 digest

use super::Database;
use crate::models::{ApiKey, ApiKeyTier, ApiKeyUsage, ApiKeyUsageStats};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_api_key(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKey> {
    let user_id_str: String = row.get("user_id");
    let tier_str: String = row.get("tier");
    let rate_limit_requests: i64 = row.get("rate_limit_requests");
    let rate_limit_window: i64 = row.get("rate_limit_window_seconds");

    Ok(ApiKey {
        id: row.get("id"),
        user_id: Uuid::parse_str(&user_id_str)?,
        name: row.get("name"),
        key_prefix: row.get("key_prefix"),
        key_hash: row.get("key_hash"),
        description: row.get("description"),
        tier: ApiKeyTier::from_str_or_default(&tier_str),
        rate_limit_requests: u32::try_from(rate_limit_requests).unwrap_or(u32::MAX),
        rate_limit_window_seconds: u32::try_from(rate_limit_window).unwrap_or(u32::MAX),
        is_active: row.get("is_active"),
        last_used_at: row.get::<Option<DateTime<Utc>>, _>("last_used_at"),
        expires_at: row.get::<Option<DateTime<Utc>>, _>("expires_at"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

impl Database {
    /// Create API key tables
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails
    pub(super) async fn migrate_api_keys(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                key_prefix TEXT NOT NULL,
                key_hash TEXT UNIQUE NOT NULL,
                description TEXT,
                tier TEXT NOT NULL DEFAULT 'starter' CHECK (tier IN ('trial', 'starter', 'professional', 'enterprise')),
                rate_limit_requests INTEGER NOT NULL,
                rate_limit_window_seconds INTEGER NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                last_used_at DATETIME,
                expires_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS api_key_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                api_key_id TEXT NOT NULL REFERENCES api_keys(id) ON DELETE CASCADE,
                timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                endpoint TEXT NOT NULL,
                status_code INTEGER NOT NULL,
                response_time_ms INTEGER
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_user_id ON api_keys(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_keys_key_hash ON api_keys(key_hash)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_api_key_usage_key_time ON api_key_usage(api_key_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new API key record
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_api_key(&self, api_key: &ApiKey) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO api_keys (
                id, user_id, name, key_prefix, key_hash, description, tier,
                rate_limit_requests, rate_limit_window_seconds, is_active,
                last_used_at, expires_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(&api_key.id)
        .bind(api_key.user_id.to_string())
        .bind(&api_key.name)
        .bind(&api_key.key_prefix)
        .bind(&api_key.key_hash)
        .bind(&api_key.description)
        .bind(api_key.tier.as_str())
        .bind(i64::from(api_key.rate_limit_requests))
        .bind(i64::from(api_key.rate_limit_window_seconds))
        .bind(api_key.is_active)
        .bind(api_key.last_used_at)
        .bind(api_key.expires_at)
        .bind(api_key.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up an API key by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_api_key(&self, key_id: &str) -> Result<Option<ApiKey>> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE id = $1")
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    /// Look up an API key by the SHA-256 digest of the full key
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    /// List API keys owned by a user, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_api_keys_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query("SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_api_key).collect()
    }

    /// Deactivate an API key
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not exist or the update fails
    pub async fn deactivate_api_key(&self, key_id: &str, user_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = $1 AND user_id = $2")
            .bind(key_id)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("API key not found: {key_id}"));
        }

        Ok(())
    }

    /// Record that a key was used for authentication
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn update_api_key_last_used(&self, key_id: &str) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(key_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record a usage entry for an API key
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn record_api_key_usage(&self, usage: &ApiKeyUsage) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO api_key_usage (api_key_id, timestamp, endpoint, status_code, response_time_ms)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&usage.api_key_id)
        .bind(usage.timestamp)
        .bind(&usage.endpoint)
        .bind(i64::from(usage.status_code))
        .bind(usage.response_time_ms.map(i64::from))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Count requests for a key in the current calendar month
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_api_key_current_month_usage(&self, key_id: &str) -> Result<u32> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) as count FROM api_key_usage
            WHERE api_key_id = $1 AND timestamp >= datetime('now', 'start of month')
            ",
        )
        .bind(key_id)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Aggregate usage statistics for a key within a time window
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_api_key_usage_stats(
        &self,
        key_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ApiKeyUsageStats> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) as total,
                COALESCE(SUM(CASE WHEN status_code < 400 THEN 1 ELSE 0 END), 0) as ok,
                COALESCE(AVG(response_time_ms), 0.0) as avg_ms
            FROM api_key_usage
            WHERE api_key_id = $1 AND timestamp >= $2 AND timestamp <= $3
            ",
        )
        .bind(key_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.get("total");
        let ok: i64 = row.get("ok");
        let avg_ms: f64 = row.get("avg_ms");

        let total = u64::try_from(total).unwrap_or(0);
        let ok = u64::try_from(ok).unwrap_or(0);

        Ok(ApiKeyUsageStats {
            total_requests: total,
            successful_requests: ok,
            failed_requests: total.saturating_sub(ok),
            average_response_time_ms: avg_ms,
        })
    }
}
