//! Per-segment HTTP fetching
//!
//! Each segment issues a ranged GET against its assigned source, streams
//! the body, and writes chunks at the segment's offset into the shared
//! part-file. Progress and terminal outcomes are reported over the task's
//! update channel; the aggregator owns all database writes.

use crate::error::{Error, Result};
use crate::transfer::control::TaskControl;
use crate::transfer::governor::SpeedGovernor;
use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use sdm_common::model::DownloadSegment;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Messages from fetch tasks to the per-task aggregator
pub(crate) enum SegmentUpdate {
    /// Bytes downloaded so far within the segment
    Progress { index: i64, downloaded: i64 },
    /// Segment fully fetched and flushed
    Completed { index: i64 },
    /// Segment gave up (includes cancellation)
    Failed { index: i64, error: Error },
}

/// Fetch one segment, reporting the terminal outcome on `updates`
pub(crate) async fn fetch_segment(
    client: reqwest::Client,
    source: String,
    part_path: PathBuf,
    segment: DownloadSegment,
    governor: Arc<SpeedGovernor>,
    control: TaskControl,
    updates: mpsc::Sender<SegmentUpdate>,
) {
    let index = segment.index;
    let outcome = run_segment(
        client, source, part_path, segment, governor, control, &updates,
    )
    .await;

    let message = match outcome {
        Ok(()) => SegmentUpdate::Completed { index },
        Err(error) => SegmentUpdate::Failed { index, error },
    };
    let _ = updates.send(message).await;
}

async fn run_segment(
    client: reqwest::Client,
    source: String,
    part_path: PathBuf,
    segment: DownloadSegment,
    governor: Arc<SpeedGovernor>,
    control: TaskControl,
    updates: &mpsc::Sender<SegmentUpdate>,
) -> Result<()> {
    let total = segment.len();
    let mut downloaded = segment.downloaded_bytes;
    if downloaded >= total {
        return Ok(());
    }

    control.checkpoint().await?;

    let range = format!(
        "bytes={}-{}",
        segment.start_byte + downloaded,
        segment.end_byte
    );
    let resp = client.get(&source).header(RANGE, range).send().await?;

    // Bytes the stream delivers ahead of this segment's write offset. A 200
    // answer means the server ignored the range and is sending the whole
    // file from byte zero, so the segment restarts and skips up to its
    // start offset.
    let mut skip: i64 = match resp.status() {
        StatusCode::PARTIAL_CONTENT => 0,
        StatusCode::OK => {
            if downloaded > 0 || segment.start_byte > 0 {
                debug!(
                    "segment {} of task {}: source ignored range, restarting",
                    segment.index, segment.task_id
                );
            }
            downloaded = 0;
            segment.start_byte
        }
        status => return Err(Error::HttpStatus(status.as_u16())),
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(&part_path)
        .await?;
    file.seek(SeekFrom::Start((segment.start_byte + downloaded) as u64))
        .await?;

    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        control.checkpoint().await?;
        let chunk = chunk?;
        let mut data = &chunk[..];

        if skip > 0 {
            let dropped = skip.min(data.len() as i64) as usize;
            data = &data[dropped..];
            skip -= dropped as i64;
            if data.is_empty() {
                continue;
            }
        }

        let remaining = (total - downloaded) as usize;
        let take = data.len().min(remaining);
        file.write_all(&data[..take]).await?;
        downloaded += take as i64;

        governor.throttle(take).await;
        let _ = updates
            .send(SegmentUpdate::Progress {
                index: segment.index,
                downloaded,
            })
            .await;

        if downloaded >= total {
            break;
        }
    }

    file.flush().await?;

    if downloaded < total {
        return Err(Error::Internal(format!(
            "source ended early: got {} of {} bytes",
            downloaded, total
        )));
    }

    Ok(())
}

/// Fetch a task as a single unranged stream (size or range support unknown)
///
/// Reports progress with segment index 0; the aggregator knows such tasks
/// have no segment rows.
pub(crate) async fn fetch_whole(
    client: reqwest::Client,
    source: String,
    part_path: PathBuf,
    governor: Arc<SpeedGovernor>,
    control: TaskControl,
    updates: mpsc::Sender<SegmentUpdate>,
) {
    let outcome = run_whole(client, source, part_path, governor, control, &updates).await;

    let message = match outcome {
        Ok(()) => SegmentUpdate::Completed { index: 0 },
        Err(error) => SegmentUpdate::Failed { index: 0, error },
    };
    let _ = updates.send(message).await;
}

async fn run_whole(
    client: reqwest::Client,
    source: String,
    part_path: PathBuf,
    governor: Arc<SpeedGovernor>,
    control: TaskControl,
    updates: &mpsc::Sender<SegmentUpdate>,
) -> Result<()> {
    control.checkpoint().await?;

    let resp = client.get(&source).send().await?;
    if !resp.status().is_success() {
        return Err(Error::HttpStatus(resp.status().as_u16()));
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&part_path)
        .await?;

    let mut downloaded: i64 = 0;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        control.checkpoint().await?;
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as i64;

        governor.throttle(chunk.len()).await;
        let _ = updates
            .send(SegmentUpdate::Progress {
                index: 0,
                downloaded,
            })
            .await;
    }

    file.flush().await?;
    Ok(())
}
