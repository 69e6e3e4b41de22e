//! Shared engine state
//!
//! Thread-safe state shared between the transfer engine, the API handlers,
//! and the SSE broadcaster: the event bus plus the statistics counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sdm_common::events::{DlEvent, EventBus};
use sdm_common::model::TaskStatus;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shared state accessible by all components
pub struct SharedState {
    /// Event broadcaster for SSE and internal listeners
    pub events: EventBus,

    /// Tasks that reached Completed since daemon start
    pub completed_tasks: AtomicU64,

    /// Tasks that reached Failed since daemon start
    pub failed_tasks: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            events: EventBus::new(1000),
            completed_tasks: AtomicU64::new(0),
            failed_tasks: AtomicU64::new(0),
        }
    }

    /// Broadcast an event; missing subscribers are not an error
    pub fn broadcast(&self, event: DlEvent) {
        self.events.emit_lossy(event);
    }

    /// Subscribe to the event stream (SSE, statistics)
    pub fn subscribe(&self) -> broadcast::Receiver<DlEvent> {
        self.events.subscribe()
    }

    /// Snapshot of (completed, failed) counters
    pub fn stats(&self) -> (u64, u64) {
        (
            self.completed_tasks.load(Ordering::Relaxed),
            self.failed_tasks.load(Ordering::Relaxed),
        )
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Count terminal task transitions from the event stream
///
/// Runs until the bus closes. Subscribes before returning, so events
/// emitted after this call are always counted.
pub fn spawn_stats_collector(state: Arc<SharedState>) -> JoinHandle<()> {
    let mut rx = state.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(DlEvent::TaskStateChanged { task_id, status, .. }) => match status {
                    TaskStatus::Completed => {
                        state.completed_tasks.fetch_add(1, Ordering::Relaxed);
                        debug!("stats: task {} completed", task_id);
                    }
                    TaskStatus::Failed => {
                        state.failed_tasks.fetch_add(1, Ordering::Relaxed);
                        debug!("stats: task {} failed", task_id);
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!("stats collector lagged, missed {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stats_collector_counts_terminal_states() {
        let state = Arc::new(SharedState::new());
        let _collector = spawn_stats_collector(Arc::clone(&state));

        for (task_id, status) in [
            (1, TaskStatus::Running),
            (1, TaskStatus::Completed),
            (2, TaskStatus::Failed),
            (3, TaskStatus::Paused),
        ] {
            state.broadcast(DlEvent::TaskStateChanged {
                task_id,
                status,
                error: None,
                timestamp: Utc::now(),
            });
        }

        // collector runs on its own task; give it a moment to drain
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(state.stats(), (1, 1));
    }
}
