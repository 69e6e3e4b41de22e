//! Test server wrapper for integration tests
//!
//! Provides a programmatically controllable sdm-engine instance with an
//! in-memory database, a temporary data directory, and event monitoring.

use axum::body::Body;
use http::{Method, Request, StatusCode};
use sdm_common::events::DlEvent;
use sdm_engine::api::{self, AppState};
use sdm_engine::db;
use sdm_engine::state::{spawn_stats_collector, SharedState};
use sdm_engine::transfer::DownloadEngine;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

/// Test server instance with full API and transfer engine
pub struct TestServer {
    pub router: axum::Router,
    pub db_pool: Pool<Sqlite>,
    pub state: Arc<SharedState>,
    pub engine: Arc<DownloadEngine>,
    /// Holds the downloads/incomplete directories; removed on drop
    pub data_dir: TempDir,
}

impl TestServer {
    /// Start a new test server with in-memory database
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let data_dir = tempfile::tempdir()?;

        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        db::init::init_schema(&db_pool).await?;
        db::init::init_settings_defaults(&db_pool, data_dir.path()).await?;

        let state = Arc::new(SharedState::new());
        spawn_stats_collector(Arc::clone(&state));

        let engine = Arc::new(DownloadEngine::new(db_pool.clone(), Arc::clone(&state)).await?);

        let router = api::create_router(AppState {
            engine: Arc::clone(&engine),
            db: db_pool.clone(),
            state: Arc::clone(&state),
            port: 0,
        });

        Ok(TestServer {
            router,
            db_pool,
            state,
            engine,
            data_dir,
        })
    }

    /// Subscribe to engine events; call before triggering the action under
    /// test so no event is missed
    pub fn subscribe(&self) -> broadcast::Receiver<DlEvent> {
        self.state.subscribe()
    }

    /// Make an HTTP request against the router
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Option<Value>), Box<dyn std::error::Error>> {
        let method: Method = method.parse()?;
        let mut builder = Request::builder().method(method).uri(path);

        let request = if let Some(body) = body {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(serde_json::to_vec(&body)?))?
        } else {
            builder.body(Body::empty())?
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await?
            .to_bytes();
        let json = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };

        Ok((status, json))
    }
}
