//! Database initialization
//!
//! Creates the schema and seeds default settings on startup.

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::info;

/// Create tables if they do not exist yet
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS download_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            file_name TEXT NOT NULL,
            status TEXT NOT NULL,
            total_bytes INTEGER,
            downloaded_bytes INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS download_segments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            seg_index INTEGER NOT NULL,
            start_byte INTEGER NOT NULL,
            end_byte INTEGER NOT NULL,
            downloaded_bytes INTEGER NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY(task_id) REFERENCES download_tasks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed default settings that are missing
///
/// Directory defaults are derived from the data directory; existing values
/// are never overwritten.
pub async fn init_settings_defaults(pool: &Pool<Sqlite>, data_dir: &Path) -> Result<()> {
    let download_dir = data_dir.join("downloads");
    let incomplete_dir = download_dir.join("incomplete");

    let defaults = vec![
        ("download_dir", download_dir.to_string_lossy().to_string()),
        (
            "incomplete_dir",
            incomplete_dir.to_string_lossy().to_string(),
        ),
        // 0 = unlimited
        ("speed_limit_bytes_per_sec", "0".to_string()),
        ("segment_count", "4".to_string()),
    ];

    for (key, default_value) in defaults {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
                .bind(key)
                .fetch_one(pool)
                .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(&default_value)
                .execute(pool)
                .await?;

            info!(
                "Initialized setting '{}' with default value: {}",
                key, default_value
            );
        }
    }

    Ok(())
}
