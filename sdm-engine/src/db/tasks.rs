//! Download task queries

use crate::error::Result;
use sdm_common::model::{DownloadTask, TaskStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

fn task_from_row(row: &SqliteRow) -> Result<DownloadTask> {
    let status: TaskStatus = row.get::<String, _>("status").parse()?;
    Ok(DownloadTask {
        id: row.get("id"),
        url: row.get("url"),
        file_name: row.get("file_name"),
        status,
        total_bytes: row.get("total_bytes"),
        downloaded_bytes: row.get("downloaded_bytes"),
    })
}

/// Insert a new task in Created state and return it with its generated id
pub async fn create_task(db: &Pool<Sqlite>, url: &str, file_name: &str) -> Result<DownloadTask> {
    let result = sqlx::query(
        r#"
        INSERT INTO download_tasks (url, file_name, status, total_bytes, downloaded_bytes)
        VALUES (?, ?, ?, NULL, 0)
        "#,
    )
    .bind(url)
    .bind(file_name)
    .bind(TaskStatus::Created.as_str())
    .execute(db)
    .await?;

    Ok(DownloadTask::new(
        result.last_insert_rowid(),
        url.to_string(),
        file_name.to_string(),
    ))
}

/// Fetch one task by id
pub async fn get_task(db: &Pool<Sqlite>, task_id: i64) -> Result<Option<DownloadTask>> {
    let row = sqlx::query(
        r#"
        SELECT id, url, file_name, status, total_bytes, downloaded_bytes
        FROM download_tasks WHERE id = ?
        "#,
    )
    .bind(task_id)
    .fetch_optional(db)
    .await?;

    row.as_ref().map(task_from_row).transpose()
}

/// All tasks ordered by id
pub async fn list_tasks(db: &Pool<Sqlite>) -> Result<Vec<DownloadTask>> {
    let rows = sqlx::query(
        r#"
        SELECT id, url, file_name, status, total_bytes, downloaded_bytes
        FROM download_tasks ORDER BY id
        "#,
    )
    .fetch_all(db)
    .await?;

    rows.iter().map(task_from_row).collect()
}

/// Persist byte counters only
///
/// Used by the progress aggregator so a concurrent pause/stop status write
/// is never clobbered by a stale in-flight status.
pub async fn update_task_progress(db: &Pool<Sqlite>, task: &DownloadTask) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE download_tasks
        SET total_bytes = ?, downloaded_bytes = ?
        WHERE id = ?
        "#,
    )
    .bind(task.total_bytes)
    .bind(task.downloaded_bytes)
    .bind(task.id)
    .execute(db)
    .await?;

    Ok(())
}

/// Persist mutable task fields (status, total, downloaded)
pub async fn update_task(db: &Pool<Sqlite>, task: &DownloadTask) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE download_tasks
        SET status = ?, total_bytes = ?, downloaded_bytes = ?
        WHERE id = ?
        "#,
    )
    .bind(task.status.as_str())
    .bind(task.total_bytes)
    .bind(task.downloaded_bytes)
    .bind(task.id)
    .execute(db)
    .await?;

    Ok(())
}
