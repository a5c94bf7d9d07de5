// ABOUTME: Alert rule database operations
// ABOUTME: Rules matched against the live ingestion stream with trigger bookkeeping

use super::Database;
use crate::models::AlertRule;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_alert_rule(row: &sqlx::sqlite::SqliteRow) -> Result<AlertRule> {
    let id_str: String = row.get("id");
    let min_severity: i64 = row.get("min_severity");
    let trigger_count: i64 = row.get("trigger_count");

    Ok(AlertRule {
        id: Uuid::parse_str(&id_str)?,
        name: row.get("name"),
        min_severity: u8::try_from(min_severity).unwrap_or(7),
        match_substring: row.get("match_substring"),
        protocol: row.get("protocol"),
        enabled: row.get("enabled"),
        trigger_count: u64::try_from(trigger_count).unwrap_or(0),
        last_triggered_at: row.get::<Option<DateTime<Utc>>, _>("last_triggered_at"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

impl Database {
    /// Create alert rules table
    ///
    /// # Errors
    ///
    /// Returns an error if table creation fails
    pub(super) async fn migrate_alert_rules(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS alert_rules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                min_severity INTEGER NOT NULL DEFAULT 3,
                match_substring TEXT,
                protocol TEXT,
                enabled BOOLEAN NOT NULL DEFAULT 1,
                trigger_count INTEGER NOT NULL DEFAULT 0,
                last_triggered_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new alert rule
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_alert_rule(&self, rule: &AlertRule) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO alert_rules (
                id, name, min_severity, match_substring, protocol, enabled,
                trigger_count, last_triggered_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(rule.id.to_string())
        .bind(&rule.name)
        .bind(i64::from(rule.min_severity))
        .bind(&rule.match_substring)
        .bind(&rule.protocol)
        .bind(rule.enabled)
        .bind(i64::try_from(rule.trigger_count).unwrap_or(i64::MAX))
        .bind(rule.last_triggered_at)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up an alert rule by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_alert_rule(&self, rule_id: Uuid) -> Result<Option<AlertRule>> {
        let row = sqlx::query("SELECT * FROM alert_rules WHERE id = $1")
            .bind(rule_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_alert_rule).transpose()
    }

    /// List all alert rules
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_alert_rules(&self) -> Result<Vec<AlertRule>> {
        let rows = sqlx::query("SELECT * FROM alert_rules ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_alert_rule).collect()
    }

    /// List only enabled rules, for the ingestion pipeline
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_enabled_alert_rules(&self) -> Result<Vec<AlertRule>> {
        let rows = sqlx::query("SELECT * FROM alert_rules WHERE enabled = 1")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_alert_rule).collect()
    }

    /// Update a rule's definition
    ///
    /// # Errors
    ///
    /// Returns an error if the rule does not exist or the update fails
    pub async fn update_alert_rule(&self, rule: &AlertRule) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE alert_rules SET
                name = $2,
                min_severity = $3,
                match_substring = $4,
                protocol = $5,
                enabled = $6
            WHERE id = $1
            ",
        )
        .bind(rule.id.to_string())
        .bind(&rule.name)
        .bind(i64::from(rule.min_severity))
        .bind(&rule.match_substring)
        .bind(&rule.protocol)
        .bind(rule.enabled)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Alert rule not found: {}", rule.id));
        }

        Ok(())
    }

    /// Bump trigger bookkeeping after a rule matched an event
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn record_alert_trigger(&self, rule_id: Uuid) -> Result<()> {
        sqlx::query(
            r"
            UPDATE alert_rules SET
                trigger_count = trigger_count + 1,
                last_triggered_at = CURRENT_TIMESTAMP
            WHERE id = $1
            ",
        )
        .bind(rule_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete an alert rule
    ///
    /// # Errors
    ///
    /// Returns an error if the rule does not exist or the delete fails
    pub async fn delete_alert_rule(&self, rule_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = $1")
            .bind(rule_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Alert rule not found: {rule_id}"));
        }

        Ok(())
    }
}
