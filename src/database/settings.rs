// ABOUTME: System settings database operations
// ABOUTME: Key-value store with JSON values and per-key update attribution

use super::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

/// One stored setting with its update attribution
#[derive(Debug, Clone, Serialize)]
pub struct StoredSetting {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    /// Create system settings table
    ///
    /// # Errors
    ///
    /// Returns an error if table creation fails
    pub(super) async fn migrate_settings(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS system_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_by TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read one setting, if present
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored value is not valid JSON
    pub async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT value FROM system_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Write a setting, recording who changed it
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the upsert fails
    pub async fn set_setting(
        &self,
        key: &str,
        value: &serde_json::Value,
        updated_by: Option<Uuid>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;

        sqlx::query(
            r"
            INSERT INTO system_settings (key, value, updated_by, updated_at)
            VALUES ($1, $2, $3, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_by = excluded.updated_by,
                updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(key)
        .bind(raw)
        .bind(updated_by.map(|u| u.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List all settings with attribution, ordered by key
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored value is not valid JSON
    pub async fn list_settings(&self) -> Result<Vec<StoredSetting>> {
        let rows = sqlx::query("SELECT * FROM system_settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.get("value");
                Ok(StoredSetting {
                    key: row.get("key"),
                    value: serde_json::from_str(&raw)?,
                    updated_by: row.get("updated_by"),
                    updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
                })
            })
            .collect()
    }

    /// Remove a setting, returning whether it existed
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn delete_setting(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM system_settings WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
