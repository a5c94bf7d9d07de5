// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Database Management
//!
//! SQLite persistence for the admin console: users, sessions, API keys,
//! settings, audit trail, dashboards, and alert rules. Schema migrations
//! are idempotent `CREATE TABLE IF NOT EXISTS` statements run at startup.

mod alert_rules;
mod api_keys;
mod audit;
mod dashboards;
mod sessions;
mod settings;
mod users;

pub use audit::AuditQuery;
pub use settings::StoredSetting;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

/// Database manager for console state
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or a
    /// migration statement fails
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") && !in_memory {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        // Each pooled connection to :memory: would get its own database,
        // so in-memory pools are pinned to one connection that never closes
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(&connection_options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&connection_options)
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any migration statement fails
    pub async fn migrate(&self) -> Result<()> {
        self.migrate_users().await?;
        self.migrate_sessions().await?;
        self.migrate_api_keys().await?;
        self.migrate_settings().await?;
        self.migrate_audit().await?;
        self.migrate_dashboards().await?;
        self.migrate_alert_rules().await?;

        Ok(())
    }
}
