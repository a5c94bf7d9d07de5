// ABOUTME: Session database operations backing JWT revocation
// ABOUTME: Records issued token identifiers so logout can invalidate them early

use super::Database;
use crate::models::Session;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    let user_id_str: String = row.get("user_id");

    Ok(Session {
        jti: row.get("jti"),
        user_id: Uuid::parse_str(&user_id_str)?,
        expires_at: row.get::<DateTime<Utc>, _>("expires_at"),
        revoked: row.get("revoked"),
        ip_address: row.get("ip_address"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        last_seen_at: row.get::<DateTime<Utc>, _>("last_seen_at"),
    })
}

impl Database {
    /// Create sessions table
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails
    pub(super) async fn migrate_sessions(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sessions (
                jti TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at DATETIME NOT NULL,
                revoked BOOLEAN NOT NULL DEFAULT 0,
                ip_address TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                last_seen_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record a newly issued session
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO sessions (jti, user_id, expires_at, revoked, ip_address, created_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(&session.jti)
        .bind(session.user_id.to_string())
        .bind(session.expires_at)
        .bind(session.revoked)
        .bind(&session.ip_address)
        .bind(session.created_at)
        .bind(session.last_seen_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Whether a token identifier belongs to a live (unrevoked, unexpired) session
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn is_session_valid(&self, jti: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM sessions WHERE jti = $1 AND revoked = 0 AND expires_at > CURRENT_TIMESTAMP",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// List active sessions for a user
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM sessions
            WHERE user_id = $1 AND revoked = 0 AND expires_at > CURRENT_TIMESTAMP
            ORDER BY created_at DESC
            ",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    /// Revoke a session (logout)
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_session(&self, jti: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET revoked = 1 WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Revoke every session for a user (suspension, deletion)
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_sessions_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("UPDATE sessions SET revoked = 1 WHERE user_id = $1 AND revoked = 0")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Touch a session's last-seen timestamp
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn touch_session(&self, jti: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET last_seen_at = CURRENT_TIMESTAMP WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Remove expired and revoked sessions
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub async fn prune_sessions(&self) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE revoked = 1 OR expires_at <= CURRENT_TIMESTAMP")
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
