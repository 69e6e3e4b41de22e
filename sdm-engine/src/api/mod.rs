//! REST API implementation for the download manager
//!
//! Exposes task lifecycle control, settings, statistics, and the SSE event
//! stream.

pub mod handlers;
pub mod sse;

use crate::state::SharedState;
use crate::transfer::DownloadEngine;
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DownloadEngine>,
    pub db: Pool<Sqlite>,
    pub state: Arc<SharedState>,
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest(
            "/api",
            Router::new()
                // task management
                .route("/tasks", post(handlers::create_task))
                .route("/tasks", get(handlers::list_tasks))
                .route("/tasks/:id", get(handlers::get_task))
                .route("/tasks/:id/segments", get(handlers::get_segments))
                // lifecycle control
                .route("/tasks/:id/start", post(handlers::start_task))
                .route("/tasks/:id/pause", post(handlers::pause_task))
                .route("/tasks/:id/resume", post(handlers::resume_task))
                .route("/tasks/:id/stop", post(handlers::stop_task))
                // global knobs
                .route("/speed", get(handlers::get_speed_limit))
                .route("/speed", put(handlers::set_speed_limit))
                .route("/settings", get(handlers::get_settings))
                .route("/settings", put(handlers::update_settings))
                .route("/stats", get(handlers::get_stats))
                // SSE events
                .route("/events", get(sse::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
