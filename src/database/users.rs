// ABOUTME: User management database operations
// ABOUTME: Handles user registration, approval workflow, and profile lookups

use super::Database;
use crate::models::{User, UserRole, UserStatus};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let id_str: String = row.get("id");
    let role_str: String = row.get("role");
    let status_str: String = row.get("status");

    Ok(User {
        id: Uuid::parse_str(&id_str)?,
        email: row.get("email"),
        display_name: row.get("display_name"),
        password_hash: row.get("password_hash"),
        role: UserRole::from_str_or_default(&role_str),
        status: UserStatus::from_str_or_default(&status_str),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        last_active: row.get::<DateTime<Utc>, _>("last_active"),
    })
}

impl Database {
    /// Create users table
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails
    pub(super) async fn migrate_users(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                display_name TEXT,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('admin', 'user')),
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'active', 'suspended')),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                last_active DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_status ON users(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Create a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the email is already in use or the insert fails
    pub async fn create_user(&self, user: &User) -> Result<Uuid> {
        let existing = self.get_user_by_email(&user.email).await?;
        if existing.is_some() {
            return Err(anyhow!("Email already in use by another user"));
        }

        sqlx::query(
            r"
            INSERT INTO users (id, email, display_name, password_hash, role, status, created_at, last_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.created_at)
        .bind(user.last_active)
        .execute(&self.pool)
        .await?;

        Ok(user.id)
    }

    /// Look up a user by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    /// Look up a user by email
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    /// List all users, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_user).collect()
    }

    /// Count users with the given status
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn count_users_with_status(&self, status: UserStatus) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM users WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    /// Update a user's lifecycle status
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the update fails
    pub async fn update_user_status(&self, user_id: Uuid, status: UserStatus) -> Result<()> {
        let result = sqlx::query("UPDATE users SET status = $2 WHERE id = $1")
            .bind(user_id.to_string())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("User not found: {user_id}"));
        }

        Ok(())
    }

    /// Update a user's role
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the update fails
    pub async fn update_user_role(&self, user_id: Uuid, role: UserRole) -> Result<()> {
        let result = sqlx::query("UPDATE users SET role = $2 WHERE id = $1")
            .bind(user_id.to_string())
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("User not found: {user_id}"));
        }

        Ok(())
    }

    /// Record a successful authentication
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn update_last_active(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_active = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete a user and all dependent rows
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the delete fails
    pub async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        // Dependent rows first; SQLite foreign_keys pragma is off by default
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM api_keys WHERE user_id = $1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM dashboards WHERE user_id = $1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("User not found: {user_id}"));
        }

        Ok(())
    }
}
