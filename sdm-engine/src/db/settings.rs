//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).
//! All settings are global.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;

/// Read a setting and parse it into `T`
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("setting '{}' has invalid value: {}", key, raw))),
        None => Ok(None),
    }
}

/// Store a setting, replacing any previous value
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value.to_string())
        .execute(db)
        .await?;

    Ok(())
}

/// Directory completed downloads are moved into
pub async fn get_download_dir(db: &Pool<Sqlite>) -> Result<PathBuf> {
    get_setting::<String>(db, "download_dir")
        .await?
        .map(PathBuf::from)
        .ok_or_else(|| Error::Config("download_dir setting not initialized".to_string()))
}

pub async fn set_download_dir(db: &Pool<Sqlite>, dir: &str) -> Result<()> {
    set_setting(db, "download_dir", dir).await
}

/// Directory part-files live in while a download is in flight
pub async fn get_incomplete_dir(db: &Pool<Sqlite>) -> Result<PathBuf> {
    get_setting::<String>(db, "incomplete_dir")
        .await?
        .map(PathBuf::from)
        .ok_or_else(|| Error::Config("incomplete_dir setting not initialized".to_string()))
}

pub async fn set_incomplete_dir(db: &Pool<Sqlite>, dir: &str) -> Result<()> {
    set_setting(db, "incomplete_dir", dir).await
}

/// Global speed limit in bytes per second (0 = unlimited)
pub async fn get_speed_limit(db: &Pool<Sqlite>) -> Result<i64> {
    match get_setting::<i64>(db, "speed_limit_bytes_per_sec").await? {
        Some(limit) => Ok(limit),
        None => {
            set_setting(db, "speed_limit_bytes_per_sec", 0i64).await?;
            Ok(0)
        }
    }
}

pub async fn set_speed_limit(db: &Pool<Sqlite>, bytes_per_sec: i64) -> Result<()> {
    set_setting(db, "speed_limit_bytes_per_sec", bytes_per_sec).await
}

/// How many range segments a sized download is split into
pub async fn get_segment_count(db: &Pool<Sqlite>) -> Result<i64> {
    match get_setting::<i64>(db, "segment_count").await? {
        Some(count) if count >= 1 => Ok(count),
        Some(_) | None => {
            set_setting(db, "segment_count", 4i64).await?;
            Ok(4)
        }
    }
}
