// ABOUTME: Dashboard database operations
// ABOUTME: Stores validated widget layouts as JSON documents per user

use super::Database;
use crate::models::{Dashboard, DashboardLayout};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

fn row_to_dashboard(row: &sqlx::sqlite::SqliteRow) -> Result<Dashboard> {
    let id_str: String = row.get("id");
    let user_id_str: String = row.get("user_id");
    let layout_raw: String = row.get("layout");

    Ok(Dashboard {
        id: Uuid::parse_str(&id_str)?,
        user_id: Uuid::parse_str(&user_id_str)?,
        name: row.get("name"),
        description: row.get("description"),
        layout: serde_json::from_str::<DashboardLayout>(&layout_raw)?,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

impl Database {
    /// Create dashboards table
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails
    pub(super) async fn migrate_dashboards(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS dashboards (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                layout TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_dashboards_user_id ON dashboards(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Store a new dashboard
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails
    pub async fn create_dashboard(&self, dashboard: &Dashboard) -> Result<()> {
        let layout = serde_json::to_string(&dashboard.layout)?;

        sqlx::query(
            r"
            INSERT INTO dashboards (id, user_id, name, description, layout, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(dashboard.id.to_string())
        .bind(dashboard.user_id.to_string())
        .bind(&dashboard.name)
        .bind(&dashboard.description)
        .bind(layout)
        .bind(dashboard.created_at)
        .bind(dashboard.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a dashboard by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_dashboard(&self, dashboard_id: Uuid) -> Result<Option<Dashboard>> {
        let row = sqlx::query("SELECT * FROM dashboards WHERE id = $1")
            .bind(dashboard_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_dashboard).transpose()
    }

    /// List dashboards owned by a user
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_dashboards_for_user(&self, user_id: Uuid) -> Result<Vec<Dashboard>> {
        let rows =
            sqlx::query("SELECT * FROM dashboards WHERE user_id = $1 ORDER BY updated_at DESC")
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_dashboard).collect()
    }

    /// Update a dashboard's name, description, and layout
    ///
    /// # Errors
    ///
    /// Returns an error if the dashboard does not exist or the update fails
    pub async fn update_dashboard(&self, dashboard: &Dashboard) -> Result<()> {
        let layout = serde_json::to_string(&dashboard.layout)?;

        let result = sqlx::query(
            r"
            UPDATE dashboards SET
                name = $2,
                description = $3,
                layout = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
            ",
        )
        .bind(dashboard.id.to_string())
        .bind(&dashboard.name)
        .bind(&dashboard.description)
        .bind(layout)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Dashboard not found: {}", dashboard.id));
        }

        Ok(())
    }

    /// Delete a dashboard
    ///
    /// # Errors
    ///
    /// Returns an error if the dashboard does not exist or the delete fails
    pub async fn delete_dashboard(&self, dashboard_id: Uuid, user_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM dashboards WHERE id = $1 AND user_id = $2")
            .bind(dashboard_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Dashboard not found: {dashboard_id}"));
        }

        Ok(())
    }
}
