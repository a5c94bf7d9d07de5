// ABOUTME: Audit trail database operations
// ABOUTME: Append-only record of administrative actions with filtered queries

use super::Database;
use crate::models::AuditEvent;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

/// Filters for audit trail queries; all fields are optional
#[derive(Debug, Default, Clone)]
pub struct AuditQuery {
    pub user_id: Option<Uuid>,
    pub action_prefix: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

fn row_to_audit_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent> {
    let user_id_str: Option<String> = row.get("user_id");
    let detail_raw: String = row.get("detail");

    Ok(AuditEvent {
        id: Some(row.get("id")),
        user_id: user_id_str.map(|s| Uuid::parse_str(&s)).transpose()?,
        action: row.get("action"),
        target: row.get("target"),
        detail: serde_json::from_str(&detail_raw)?,
        ip_address: row.get("ip_address"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

impl Database {
    /// Create audit log table
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails
    pub(super) async fn migrate_audit(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                action TEXT NOT NULL,
                target TEXT,
                detail TEXT NOT NULL DEFAULT '{}',
                ip_address TEXT,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log(created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_log_user_id ON audit_log(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Append an event to the audit trail
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails
    pub async fn record_audit_event(&self, event: &AuditEvent) -> Result<i64> {
        let detail = serde_json::to_string(&event.detail)?;

        let result = sqlx::query(
            r"
            INSERT INTO audit_log (user_id, action, target, detail, ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(event.user_id.map(|u| u.to_string()))
        .bind(&event.action)
        .bind(&event.target)
        .bind(detail)
        .bind(&event.ip_address)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Query the audit trail, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn query_audit_events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let limit = if query.limit == 0 { 100 } else { query.limit.min(1_000) };

        let rows = sqlx::query(
            r"
            SELECT * FROM audit_log
            WHERE ($1 IS NULL OR user_id = $1)
              AND ($2 IS NULL OR action LIKE $2 || '%')
              AND ($3 IS NULL OR created_at >= $3)
              AND ($4 IS NULL OR created_at <= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            ",
        )
        .bind(query.user_id.map(|u| u.to_string()))
        .bind(&query.action_prefix)
        .bind(query.since)
        .bind(query.until)
        .bind(i64::from(limit))
        .bind(i64::from(query.offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit_event).collect()
    }

    /// Total number of audit entries
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn count_audit_events(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM audit_log")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    /// Delete audit entries older than the retention window
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn prune_audit_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM audit_log WHERE created_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
