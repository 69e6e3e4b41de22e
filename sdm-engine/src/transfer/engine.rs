//! Download engine
//!
//! Owns active downloads and their lifecycle: add, start, pause, resume,
//! stop. Each started task gets a supervisor tokio task that spawns one
//! fetch task per unfinished segment and aggregates their progress into
//! database updates and bus events.

use crate::db;
use crate::error::{Error, Result};
use crate::state::SharedState;
use crate::transfer::control::TaskControl;
use crate::transfer::fetch::{self, SegmentUpdate};
use crate::transfer::governor::SpeedGovernor;
use crate::transfer::{planner, probe};
use chrono::Utc;
use sdm_common::api::{SettingsInfo, SettingsUpdate};
use sdm_common::events::DlEvent;
use sdm_common::model::{DownloadSegment, DownloadTask, SegmentStatus, TaskStatus};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

const USER_AGENT: &str = concat!("sdm/", env!("CARGO_PKG_VERSION"));

/// How often in-flight progress is persisted and broadcast
const FLUSH_INTERVAL: Duration = Duration::from_millis(300);

/// Window for the transfer-rate estimate
const RATE_WINDOW: Duration = Duration::from_millis(500);

struct ActiveTask {
    control: TaskControl,
}

/// The download manager core
pub struct DownloadEngine {
    db: Pool<Sqlite>,
    client: reqwest::Client,
    state: Arc<SharedState>,
    governor: Arc<SpeedGovernor>,
    active: Mutex<HashMap<i64, ActiveTask>>,
    /// Extra source URLs per task, registered at add time (not persisted)
    mirrors: Mutex<HashMap<i64, Vec<String>>>,
}

impl DownloadEngine {
    /// Create the engine; restores the persisted speed limit
    pub async fn new(db: Pool<Sqlite>, state: Arc<SharedState>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        let limit = db::settings::get_speed_limit(&db).await?;

        Ok(Self {
            db,
            client,
            state,
            governor: Arc::new(SpeedGovernor::new(limit)),
            active: Mutex::new(HashMap::new()),
            mirrors: Mutex::new(HashMap::new()),
        })
    }

    pub fn speed_limit(&self) -> i64 {
        self.governor.limit()
    }

    /// Set the global speed limit (0 = unlimited); persisted and broadcast
    pub async fn set_speed_limit(&self, bytes_per_sec: i64) -> Result<()> {
        let limit = bytes_per_sec.max(0);
        self.governor.set_limit(limit);
        db::settings::set_speed_limit(&self.db, limit).await?;
        self.state.broadcast(DlEvent::SpeedLimitChanged {
            bytes_per_sec: limit,
            timestamp: Utc::now(),
        });
        info!("speed limit set to {} B/s", limit);
        Ok(())
    }

    /// Register a new task; it stays Created until started
    pub async fn add(
        &self,
        url: &str,
        file_name: &str,
        mirrors: Vec<String>,
    ) -> Result<DownloadTask> {
        if url.trim().is_empty() {
            return Err(Error::BadRequest("url must not be empty".to_string()));
        }
        if file_name.trim().is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
        {
            return Err(Error::BadRequest(
                "file name must be a plain name without path separators".to_string(),
            ));
        }

        let task = db::tasks::create_task(&self.db, url, file_name).await?;

        if !mirrors.is_empty() {
            self.mirrors.lock().await.insert(task.id, mirrors);
        }

        self.state.broadcast(DlEvent::TaskAdded {
            task_id: task.id,
            url: task.url.clone(),
            file_name: task.file_name.clone(),
            timestamp: Utc::now(),
        });
        info!("added task {} for {}", task.id, task.url);

        Ok(task)
    }

    pub async fn get(&self, task_id: i64) -> Result<DownloadTask> {
        db::tasks::get_task(&self.db, task_id)
            .await?
            .ok_or(Error::TaskNotFound(task_id))
    }

    pub async fn list(&self) -> Result<Vec<DownloadTask>> {
        db::tasks::list_tasks(&self.db).await
    }

    pub async fn segments(&self, task_id: i64) -> Result<Vec<DownloadSegment>> {
        self.get(task_id).await?;
        db::segments::load_segments(&self.db, task_id).await
    }

    /// Begin (or restart after a crash) the transfer for a task
    ///
    /// A task that is already active is left alone. Completed tasks are
    /// refused; their file has already been moved out of the incomplete
    /// directory.
    pub async fn start(self: Arc<Self>, task_id: i64) -> Result<()> {
        let mut task = self.get(task_id).await?;

        if task.status == TaskStatus::Completed {
            return Err(Error::InvalidState(format!(
                "task {} is already completed",
                task_id
            )));
        }
        if self.active.lock().await.contains_key(&task_id) {
            debug!("task {} already active; start ignored", task_id);
            return Ok(());
        }

        // discover the total size on first start
        let mut accept_ranges = true;
        if task.total_bytes.is_none() {
            let probed = probe::probe(&self.client, &task.url).await;
            accept_ranges = probed.accept_ranges;
            task.total_bytes = probed.total_bytes;
        }

        // reuse persisted segments so resumed tasks keep their offsets
        let mut segments = db::segments::load_segments(&self.db, task_id).await?;
        if segments.is_empty() {
            if let Some(total) = task.total_bytes {
                let count = if accept_ranges {
                    db::settings::get_segment_count(&self.db).await?
                } else {
                    1
                };
                let planned = planner::plan_segments(task_id, total, count);
                db::segments::replace_segments(&self.db, task_id, &planned).await?;
                segments = db::segments::load_segments(&self.db, task_id).await?;
            }
        }

        task.status = TaskStatus::Running;
        db::tasks::update_task(&self.db, &task).await?;
        self.state.broadcast(DlEvent::TaskStateChanged {
            task_id,
            status: TaskStatus::Running,
            error: None,
            timestamp: Utc::now(),
        });

        let sources = self.sources_for(&task).await;
        let control = TaskControl::new();
        {
            let mut active = self.active.lock().await;
            if active.contains_key(&task_id) {
                return Ok(());
            }
            active.insert(
                task_id,
                ActiveTask {
                    control: control.clone(),
                },
            );
        }

        info!(
            "starting task {}: {} segment(s), {} source(s)",
            task_id,
            segments.len(),
            sources.len()
        );
        self.state.broadcast(DlEvent::Log {
            message: format!(
                "start download task={} segments={}",
                task_id,
                segments.len()
            ),
            timestamp: Utc::now(),
        });

        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            engine.run_task(task, segments, sources, control).await;
        });

        Ok(())
    }

    /// Pause an active task; segment offsets stay persisted
    pub async fn pause(&self, task_id: i64) -> Result<()> {
        let mut task = self.get(task_id).await?;

        {
            let active = self.active.lock().await;
            let entry = active.get(&task_id).ok_or_else(|| {
                Error::InvalidState(format!("task {} is not running", task_id))
            })?;
            entry.control.pause();
        }

        task.status = TaskStatus::Paused;
        db::tasks::update_task(&self.db, &task).await?;
        self.state.broadcast(DlEvent::TaskStateChanged {
            task_id,
            status: TaskStatus::Paused,
            error: None,
            timestamp: Utc::now(),
        });
        info!("paused task {}", task_id);
        Ok(())
    }

    /// Resume a paused task
    ///
    /// Resumes in place when the supervisor is still alive; otherwise (e.g.
    /// after a daemon restart) the task is restarted from its persisted
    /// segment offsets.
    pub async fn resume(self: Arc<Self>, task_id: i64) -> Result<()> {
        let mut task = self.get(task_id).await?;

        let resumed_in_place = {
            let active = self.active.lock().await;
            match active.get(&task_id) {
                Some(entry) if entry.control.is_paused() => {
                    entry.control.resume();
                    true
                }
                Some(_) => {
                    return Err(Error::InvalidState(format!(
                        "task {} is not paused",
                        task_id
                    )))
                }
                None => false,
            }
        };

        if resumed_in_place {
            task.status = TaskStatus::Running;
            db::tasks::update_task(&self.db, &task).await?;
            self.state.broadcast(DlEvent::TaskStateChanged {
                task_id,
                status: TaskStatus::Running,
                error: None,
                timestamp: Utc::now(),
            });
            info!("resumed task {}", task_id);
            return Ok(());
        }

        if task.status != TaskStatus::Paused {
            return Err(Error::InvalidState(format!(
                "task {} is not paused",
                task_id
            )));
        }
        self.start(task_id).await
    }

    /// Stop a task; stopped tasks are recorded as failed
    pub async fn stop(&self, task_id: i64) -> Result<()> {
        let mut task = self.get(task_id).await?;

        if let Some(entry) = self.active.lock().await.get(&task_id) {
            entry.control.cancel();
        }

        task.status = TaskStatus::Failed;
        db::tasks::update_task(&self.db, &task).await?;
        self.state.broadcast(DlEvent::TaskStateChanged {
            task_id,
            status: TaskStatus::Failed,
            error: Some("stopped by user".to_string()),
            timestamp: Utc::now(),
        });
        info!("stopped task {}", task_id);
        Ok(())
    }

    pub async fn settings(&self) -> Result<SettingsInfo> {
        Ok(SettingsInfo {
            download_dir: db::settings::get_download_dir(&self.db)
                .await?
                .to_string_lossy()
                .to_string(),
            incomplete_dir: db::settings::get_incomplete_dir(&self.db)
                .await?
                .to_string_lossy()
                .to_string(),
        })
    }

    /// Update directories; each directory is created when changed
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<SettingsInfo> {
        if let Some(dir) = update.download_dir {
            tokio::fs::create_dir_all(&dir).await?;
            db::settings::set_download_dir(&self.db, &dir).await?;
        }
        if let Some(dir) = update.incomplete_dir {
            tokio::fs::create_dir_all(&dir).await?;
            db::settings::set_incomplete_dir(&self.db, &dir).await?;
        }
        self.settings().await
    }

    async fn sources_for(&self, task: &DownloadTask) -> Vec<String> {
        let mut sources = vec![task.url.clone()];
        if let Some(extra) = self.mirrors.lock().await.get(&task.id) {
            sources.extend(extra.iter().cloned());
        }
        sources
    }

    /// Supervisor wrapper: runs the transfer, clears the active entry, and
    /// records the terminal state for non-cancelled failures
    async fn run_task(
        self: Arc<Self>,
        task: DownloadTask,
        segments: Vec<DownloadSegment>,
        sources: Vec<String>,
        control: TaskControl,
    ) {
        let task_id = task.id;
        let result = self
            .transfer_task(task, segments, sources, control.clone())
            .await;

        self.active.lock().await.remove(&task_id);

        match result {
            Ok(()) => {}
            Err(Error::Cancelled) => {
                // stop() already recorded the terminal state
                debug!("task {} cancelled", task_id);
            }
            Err(e) => {
                control.cancel();
                warn!("task {} failed: {}", task_id, e);
                self.mark_failed(task_id, &e.to_string()).await;
            }
        }
    }

    async fn mark_failed(&self, task_id: i64, message: &str) {
        match db::tasks::get_task(&self.db, task_id).await {
            Ok(Some(mut task)) => {
                task.status = TaskStatus::Failed;
                if let Err(e) = db::tasks::update_task(&self.db, &task).await {
                    error!("failed to persist failure of task {}: {}", task_id, e);
                }
                self.state.broadcast(DlEvent::TaskStateChanged {
                    task_id,
                    status: TaskStatus::Failed,
                    error: Some(message.to_string()),
                    timestamp: Utc::now(),
                });
            }
            Ok(None) => error!("task {} vanished while failing", task_id),
            Err(e) => error!("failed to load task {}: {}", task_id, e),
        }
    }

    /// Run the fetch tasks and aggregate their updates until all finish
    async fn transfer_task(
        &self,
        mut task: DownloadTask,
        mut segments: Vec<DownloadSegment>,
        sources: Vec<String>,
        control: TaskControl,
    ) -> Result<()> {
        let incomplete_dir = db::settings::get_incomplete_dir(&self.db).await?;
        tokio::fs::create_dir_all(&incomplete_dir).await?;
        let part_path = incomplete_dir.join(format!("{}.part", task.file_name));

        // preallocate when the size is known, so positioned writes cannot
        // race past the end of the file
        if let Some(total) = task.total_bytes {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&part_path)
                .await?;
            file.set_len(total as u64).await?;
        }

        let segmented = !segments.is_empty();
        let (tx, mut rx) = mpsc::channel::<SegmentUpdate>(64);

        if segmented {
            for segment in &segments {
                if segment.status == SegmentStatus::Completed
                    || segment.downloaded_bytes >= segment.len()
                {
                    continue;
                }
                let source = sources[segment.index as usize % sources.len()].clone();
                tokio::spawn(fetch::fetch_segment(
                    self.client.clone(),
                    source,
                    part_path.clone(),
                    segment.clone(),
                    Arc::clone(&self.governor),
                    control.clone(),
                    tx.clone(),
                ));
            }
        } else {
            tokio::spawn(fetch::fetch_whole(
                self.client.clone(),
                sources[0].clone(),
                part_path.clone(),
                Arc::clone(&self.governor),
                control.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut failure: Option<Error> = None;
        let mut last_flush = Instant::now();
        let mut last_rate_at = Instant::now();
        let mut rate_anchor_bytes = task.downloaded_bytes;
        let mut rate_bps: u64 = 0;

        while let Some(update) = rx.recv().await {
            match update {
                SegmentUpdate::Progress { index, downloaded } => {
                    if segmented {
                        if let Some(seg) =
                            segments.iter_mut().find(|s| s.index == index)
                        {
                            seg.downloaded_bytes = downloaded;
                            if seg.status != SegmentStatus::Completed {
                                seg.status = SegmentStatus::Running;
                            }
                        }
                        task.downloaded_bytes =
                            segments.iter().map(|s| s.downloaded_bytes).sum();
                    } else {
                        task.downloaded_bytes = downloaded;
                    }

                    // transfer rate over a sliding window
                    let elapsed = last_rate_at.elapsed();
                    if elapsed >= RATE_WINDOW {
                        let delta = task.downloaded_bytes - rate_anchor_bytes;
                        rate_bps = if delta > 0 {
                            (delta as f64 / elapsed.as_secs_f64()) as u64
                        } else {
                            0
                        };
                        rate_anchor_bytes = task.downloaded_bytes;
                        last_rate_at = Instant::now();
                    }

                    if last_flush.elapsed() >= FLUSH_INTERVAL {
                        last_flush = Instant::now();

                        if segmented {
                            if let Some(seg) =
                                segments.iter().find(|s| s.index == index)
                            {
                                db::segments::update_segment(&self.db, seg).await?;
                                self.state.broadcast(DlEvent::SegmentProgress {
                                    task_id: task.id,
                                    seg_index: seg.index,
                                    downloaded_bytes: seg.downloaded_bytes,
                                    len: seg.len(),
                                    timestamp: Utc::now(),
                                });
                            }
                        }
                        db::tasks::update_task_progress(&self.db, &task).await?;
                        self.state.broadcast(DlEvent::TaskProgress {
                            task_id: task.id,
                            downloaded_bytes: task.downloaded_bytes,
                            total_bytes: task.total_bytes,
                            progress: task.progress(),
                            rate_bytes_per_sec: rate_bps,
                            timestamp: Utc::now(),
                        });
                    }
                }

                SegmentUpdate::Completed { index } => {
                    if segmented {
                        if let Some(seg) =
                            segments.iter_mut().find(|s| s.index == index)
                        {
                            seg.downloaded_bytes = seg.len();
                            seg.status = SegmentStatus::Completed;
                            db::segments::update_segment(&self.db, seg).await?;
                            self.state.broadcast(DlEvent::SegmentProgress {
                                task_id: task.id,
                                seg_index: seg.index,
                                downloaded_bytes: seg.downloaded_bytes,
                                len: seg.len(),
                                timestamp: Utc::now(),
                            });
                        }
                        task.downloaded_bytes =
                            segments.iter().map(|s| s.downloaded_bytes).sum();
                    }
                    db::tasks::update_task_progress(&self.db, &task).await?;
                }

                SegmentUpdate::Failed { index, error } => {
                    if matches!(error, Error::Cancelled) {
                        continue;
                    }
                    warn!("task {} segment {} failed: {}", task.id, index, error);
                    if segmented {
                        if let Some(seg) =
                            segments.iter_mut().find(|s| s.index == index)
                        {
                            seg.status = SegmentStatus::Failed;
                            db::segments::update_segment(&self.db, seg).await?;
                        }
                    }
                    if failure.is_none() {
                        failure = Some(error);
                        // abort the remaining segments
                        control.cancel();
                    }
                }
            }
        }

        if let Some(error) = failure {
            return Err(error);
        }
        if control.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.finalize(&mut task, &part_path).await
    }

    /// Move the finished part-file into the download directory and record
    /// the terminal state
    async fn finalize(&self, task: &mut DownloadTask, part_path: &Path) -> Result<()> {
        let download_dir = db::settings::get_download_dir(&self.db).await?;
        tokio::fs::create_dir_all(&download_dir).await?;
        let final_path: PathBuf = download_dir.join(&task.file_name);
        tokio::fs::rename(part_path, &final_path).await?;

        if task.total_bytes.is_none() {
            // unsegmented download of unknown size: the total is whatever
            // the stream delivered
            task.total_bytes = Some(task.downloaded_bytes);
        }
        task.status = TaskStatus::Completed;
        db::tasks::update_task(&self.db, task).await?;

        self.state.broadcast(DlEvent::TaskProgress {
            task_id: task.id,
            downloaded_bytes: task.downloaded_bytes,
            total_bytes: task.total_bytes,
            progress: task.progress(),
            rate_bytes_per_sec: 0,
            timestamp: Utc::now(),
        });
        self.state.broadcast(DlEvent::TaskStateChanged {
            task_id: task.id,
            status: TaskStatus::Completed,
            error: None,
            timestamp: Utc::now(),
        });
        info!("task {} completed: {}", task.id, final_path.display());
        Ok(())
    }
}
