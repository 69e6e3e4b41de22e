//! Data model for download tasks and segments
//!
//! Tasks and segments are persisted in SQLite; status enums are stored as
//! their uppercase text form.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Text form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "CREATED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Paused => "PAUSED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(TaskStatus::Created),
            "RUNNING" => Ok(TaskStatus::Running),
            "PAUSED" => Ok(TaskStatus::Paused),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single byte-range segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl SegmentStatus {
    /// Text form used in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Created => "CREATED",
            SegmentStatus::Running => "RUNNING",
            SegmentStatus::Completed => "COMPLETED",
            SegmentStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for SegmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(SegmentStatus::Created),
            "RUNNING" => Ok(SegmentStatus::Running),
            "COMPLETED" => Ok(SegmentStatus::Completed),
            "FAILED" => Ok(SegmentStatus::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown segment status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A download task: one source URL resolving to one target file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: i64,
    pub url: String,
    pub file_name: String,
    pub status: TaskStatus,
    /// Total size in bytes; None until discovered
    pub total_bytes: Option<i64>,
    pub downloaded_bytes: i64,
}

impl DownloadTask {
    pub fn new(id: i64, url: String, file_name: String) -> Self {
        Self {
            id,
            url,
            file_name,
            status: TaskStatus::Created,
            total_bytes: None,
            downloaded_bytes: 0,
        }
    }

    /// Overall progress in [0.0, 1.0]; 0.0 while the total size is unknown
    pub fn progress(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => {
                (self.downloaded_bytes as f64 / total as f64).min(1.0)
            }
            _ => 0.0,
        }
    }
}

/// A contiguous byte range of a task, fetched independently
///
/// `end_byte` is inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSegment {
    pub id: i64,
    pub task_id: i64,
    pub index: i64,
    pub start_byte: i64,
    pub end_byte: i64,
    pub downloaded_bytes: i64,
    pub status: SegmentStatus,
}

impl DownloadSegment {
    pub fn new(id: i64, task_id: i64, index: i64, start_byte: i64, end_byte: i64) -> Self {
        Self {
            id,
            task_id,
            index,
            start_byte,
            end_byte,
            downloaded_bytes: 0,
            status: SegmentStatus::Created,
        }
    }

    /// Segment length in bytes (inclusive range)
    pub fn len(&self) -> i64 {
        self.end_byte - self.start_byte + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }

    /// Segment progress in [0.0, 1.0]
    pub fn progress(&self) -> f64 {
        let len = self.len();
        if len <= 0 {
            return 0.0;
        }
        (self.downloaded_bytes as f64 / len as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_round_trip() {
        for status in [
            TaskStatus::Created,
            TaskStatus::Running,
            TaskStatus::Paused,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_task_status_unknown_text() {
        assert!("DOWNLOADING".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_segment_status_round_trip() {
        for status in [
            SegmentStatus::Created,
            SegmentStatus::Running,
            SegmentStatus::Completed,
            SegmentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SegmentStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_task_progress_unknown_total() {
        let mut task = DownloadTask::new(1, "http://example.com/f".into(), "f".into());
        task.downloaded_bytes = 1024;
        assert_eq!(task.progress(), 0.0);
    }

    #[test]
    fn test_task_progress_clamped() {
        let mut task = DownloadTask::new(1, "http://example.com/f".into(), "f".into());
        task.total_bytes = Some(1000);
        task.downloaded_bytes = 500;
        assert!((task.progress() - 0.5).abs() < f64::EPSILON);

        task.downloaded_bytes = 1500;
        assert_eq!(task.progress(), 1.0);
    }

    #[test]
    fn test_segment_len_inclusive() {
        let seg = DownloadSegment::new(0, 1, 0, 0, 1023);
        assert_eq!(seg.len(), 1024);
    }

    #[test]
    fn test_segment_progress() {
        let mut seg = DownloadSegment::new(0, 1, 0, 1024, 2047);
        assert_eq!(seg.progress(), 0.0);

        seg.downloaded_bytes = 512;
        assert!((seg.progress() - 0.5).abs() < f64::EPSILON);

        seg.downloaded_bytes = 4096;
        assert_eq!(seg.progress(), 1.0);
    }
}
