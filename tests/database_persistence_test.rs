// ABOUTME: File-backed SQLite persistence tests
// ABOUTME: Verifies console state survives closing and reopening the database
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 LogHaven Project

mod common;

use anyhow::Result;
use loghaven::database::Database;
use loghaven::models::{User, UserRole, UserStatus};

#[tokio::test]
async fn test_file_backed_state_survives_reopen() -> Result<()> {
    common::init_test_logging();

    let dir = tempfile::tempdir()?;
    let url = format!("sqlite:{}", dir.path().join("loghaven.db").display());

    let user_id = {
        let database = Database::new(&url).await?;

        let password_hash = bcrypt::hash(common::TEST_PASSWORD, 4)?;
        let mut user = User::new("persist@example.com".into(), password_hash, None);
        user.role = UserRole::Admin;
        user.status = UserStatus::Active;
        let user_id = database.create_user(&user).await?;

        database
            .set_setting("retention_days", &serde_json::json!(30), Some(user_id))
            .await?;

        user_id
    };

    // A fresh pool against the same file sees the committed state
    let reopened = Database::new(&url).await?;

    let user = reopened
        .get_user(user_id)
        .await?
        .expect("user should survive reopen");
    assert_eq!(user.email, "persist@example.com");
    assert_eq!(user.role, UserRole::Admin);
    assert_eq!(user.status, UserStatus::Active);

    let retention = reopened.get_setting("retention_days").await?;
    assert_eq!(retention, Some(serde_json::json!(30)));

    Ok(())
}

#[tokio::test]
async fn test_migrations_are_idempotent_on_existing_file() -> Result<()> {
    common::init_test_logging();

    let dir = tempfile::tempdir()?;
    let url = format!("sqlite:{}", dir.path().join("loghaven.db").display());

    let database = Database::new(&url).await?;
    database.migrate().await?;
    database.migrate().await?;

    assert!(database.list_users().await?.is_empty());
    Ok(())
}
