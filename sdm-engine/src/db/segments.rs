//! Download segment queries

use crate::error::Result;
use sdm_common::model::{DownloadSegment, SegmentStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

fn segment_from_row(task_id: i64, row: &SqliteRow) -> Result<DownloadSegment> {
    let status: SegmentStatus = row.get::<String, _>("status").parse()?;
    Ok(DownloadSegment {
        id: row.get("id"),
        task_id,
        index: row.get("seg_index"),
        start_byte: row.get("start_byte"),
        end_byte: row.get("end_byte"),
        downloaded_bytes: row.get("downloaded_bytes"),
        status,
    })
}

/// Replace all segments of a task in one transaction
pub async fn replace_segments(
    db: &Pool<Sqlite>,
    task_id: i64,
    segments: &[DownloadSegment],
) -> Result<()> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM download_segments WHERE task_id = ?")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    for segment in segments {
        sqlx::query(
            r#"
            INSERT INTO download_segments
            (task_id, seg_index, start_byte, end_byte, downloaded_bytes, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task_id)
        .bind(segment.index)
        .bind(segment.start_byte)
        .bind(segment.end_byte)
        .bind(segment.downloaded_bytes)
        .bind(segment.status.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Segments of a task ordered by index; empty when the task has none
pub async fn load_segments(db: &Pool<Sqlite>, task_id: i64) -> Result<Vec<DownloadSegment>> {
    let rows = sqlx::query(
        r#"
        SELECT id, seg_index, start_byte, end_byte, downloaded_bytes, status
        FROM download_segments
        WHERE task_id = ?
        ORDER BY seg_index
        "#,
    )
    .bind(task_id)
    .fetch_all(db)
    .await?;

    rows.iter()
        .map(|row| segment_from_row(task_id, row))
        .collect()
}

/// Persist a segment's progress and status by id
pub async fn update_segment(db: &Pool<Sqlite>, segment: &DownloadSegment) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE download_segments
        SET downloaded_bytes = ?, status = ?
        WHERE id = ?
        "#,
    )
    .bind(segment.downloaded_bytes)
    .bind(segment.status.as_str())
    .bind(segment.id)
    .execute(db)
    .await?;

    Ok(())
}
