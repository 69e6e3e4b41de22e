//! API request/response types
//!
//! Shared between the engine's HTTP handlers and the sdm-ctl client so both
//! sides serialize the same shapes.

use crate::model::{DownloadSegment, DownloadTask};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// Generic status/error payload
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub url: String,
    pub file_name: String,
    /// Additional source URLs serving the same content
    #[serde(default)]
    pub mirrors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<DownloadTask>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentListResponse {
    pub segments: Vec<DownloadSegment>,
}

/// Global speed limit in bytes per second; 0 means unlimited
#[derive(Debug, Serialize, Deserialize)]
pub struct SpeedLimit {
    pub bytes_per_sec: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsInfo {
    pub download_dir: String,
    pub incomplete_dir: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub download_dir: Option<String>,
    pub incomplete_dir: Option<String>,
}

/// Terminal-task counters since daemon start
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub completed: u64,
    pub failed: u64,
}
