//! HTTP request handlers
//!
//! Implements the REST endpoints for task lifecycle control, settings, and
//! statistics.

use crate::api::AppState;
use crate::error::Error;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sdm_common::api::{
    CreateTaskRequest, HealthResponse, SegmentListResponse, SettingsInfo, SettingsUpdate,
    SpeedLimit, StatsResponse, StatusResponse, TaskListResponse,
};
use sdm_common::model::DownloadTask;
use tracing::error;

type ApiError = (StatusCode, Json<StatusResponse>);

/// Map engine errors onto HTTP status codes
fn error_response(err: Error) -> ApiError {
    let code = match &err {
        Error::TaskNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::Common(sdm_common::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", err),
        }),
    )
}

/// GET /health - Health check endpoint
pub async fn health(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "download_manager".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/tasks - Register a new download task
pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<DownloadTask>), ApiError> {
    match state
        .engine
        .add(&req.url, &req.file_name, req.mirrors)
        .await
    {
        Ok(task) => Ok((StatusCode::CREATED, Json(task))),
        Err(e) => {
            error!("failed to create task: {}", e);
            Err(error_response(e))
        }
    }
}

/// GET /api/tasks - All tasks
pub async fn list_tasks(
    State(state): State<AppState>,
) -> Result<Json<TaskListResponse>, ApiError> {
    match state.engine.list().await {
        Ok(tasks) => Ok(Json(TaskListResponse { tasks })),
        Err(e) => {
            error!("failed to list tasks: {}", e);
            Err(error_response(e))
        }
    }
}

/// GET /api/tasks/:id - One task
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<DownloadTask>, ApiError> {
    state
        .engine
        .get(task_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/tasks/:id/segments - Segments of a task
pub async fn get_segments(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<SegmentListResponse>, ApiError> {
    match state.engine.segments(task_id).await {
        Ok(segments) => Ok(Json(SegmentListResponse { segments })),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/tasks/:id/start
pub async fn start_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    match state.engine.clone().start(task_id).await {
        Ok(()) => Ok(Json(StatusResponse {
            status: "started".to_string(),
        })),
        Err(e) => {
            error!("failed to start task {}: {}", task_id, e);
            Err(error_response(e))
        }
    }
}

/// POST /api/tasks/:id/pause
pub async fn pause_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    match state.engine.pause(task_id).await {
        Ok(()) => Ok(Json(StatusResponse {
            status: "paused".to_string(),
        })),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/tasks/:id/resume
pub async fn resume_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    match state.engine.clone().resume(task_id).await {
        Ok(()) => Ok(Json(StatusResponse {
            status: "resumed".to_string(),
        })),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /api/tasks/:id/stop
pub async fn stop_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    match state.engine.stop(task_id).await {
        Ok(()) => Ok(Json(StatusResponse {
            status: "stopped".to_string(),
        })),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /api/speed - Current global speed limit
pub async fn get_speed_limit(State(state): State<AppState>) -> Json<SpeedLimit> {
    Json(SpeedLimit {
        bytes_per_sec: state.engine.speed_limit(),
    })
}

/// PUT /api/speed - Set the global speed limit (0 = unlimited)
pub async fn set_speed_limit(
    State(state): State<AppState>,
    Json(req): Json<SpeedLimit>,
) -> Result<Json<SpeedLimit>, ApiError> {
    match state.engine.set_speed_limit(req.bytes_per_sec).await {
        Ok(()) => Ok(Json(SpeedLimit {
            bytes_per_sec: state.engine.speed_limit(),
        })),
        Err(e) => {
            error!("failed to set speed limit: {}", e);
            Err(error_response(e))
        }
    }
}

/// GET /api/settings - Download directories
pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<SettingsInfo>, ApiError> {
    state
        .engine
        .settings()
        .await
        .map(Json)
        .map_err(error_response)
}

/// PUT /api/settings - Change download directories
pub async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<SettingsUpdate>,
) -> Result<Json<SettingsInfo>, ApiError> {
    match state.engine.update_settings(req).await {
        Ok(settings) => Ok(Json(settings)),
        Err(e) => {
            error!("failed to update settings: {}", e);
            Err(error_response(e))
        }
    }
}

/// GET /api/stats - Terminal-task counters since daemon start
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let (completed, failed) = state.state.stats();
    Json(StatsResponse { completed, failed })
}
