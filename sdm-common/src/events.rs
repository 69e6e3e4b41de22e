//! Event types for the SDM event system
//!
//! SDM uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many event broadcasting,
//!   consumed by the SSE endpoint and the statistics counters
//! - **Command channels** (tokio::mpsc): segment progress -> aggregator
//! - **Shared state** (Arc): read-heavy access

use crate::model::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// SDM event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DlEvent {
    /// A new task was registered
    TaskAdded {
        task_id: i64,
        url: String,
        file_name: String,
        timestamp: DateTime<Utc>,
    },

    /// Task status changed (started, paused, completed, failed, ...)
    TaskStateChanged {
        task_id: i64,
        status: TaskStatus,
        /// Failure message when status is Failed
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Aggregate task progress update
    TaskProgress {
        task_id: i64,
        downloaded_bytes: i64,
        total_bytes: Option<i64>,
        /// Progress in [0.0, 1.0]; 0.0 while the total size is unknown
        progress: f64,
        /// Current transfer rate, measured since the previous progress event
        rate_bytes_per_sec: u64,
        timestamp: DateTime<Utc>,
    },

    /// Per-segment progress update
    SegmentProgress {
        task_id: i64,
        seg_index: i64,
        downloaded_bytes: i64,
        len: i64,
        timestamp: DateTime<Utc>,
    },

    /// Global speed limit changed (0 = unlimited)
    SpeedLimitChanged {
        bytes_per_sec: i64,
        timestamp: DateTime<Utc>,
    },

    /// Free-form log line for connected clients
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DlEvent {
    /// Event type string, used as the SSE event name
    pub fn type_str(&self) -> &'static str {
        match self {
            DlEvent::TaskAdded { .. } => "TaskAdded",
            DlEvent::TaskStateChanged { .. } => "TaskStateChanged",
            DlEvent::TaskProgress { .. } => "TaskProgress",
            DlEvent::SegmentProgress { .. } => "SegmentProgress",
            DlEvent::SpeedLimitChanged { .. } => "SpeedLimitChanged",
            DlEvent::Log { .. } => "Log",
        }
    }
}

/// Broadcast bus for [`DlEvent`]
///
/// Thin wrapper over `tokio::sync::broadcast`. Subscribers receive events
/// emitted after they subscribe; slow subscribers may lag and drop events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DlEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DlEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count, or an error when nobody is listening.
    pub fn emit(
        &self,
        event: DlEvent,
    ) -> Result<usize, broadcast::error::SendError<DlEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    ///
    /// Used for progress chatter where a missing listener is normal.
    pub fn emit_lossy(&self, event: DlEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event emitted with no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_event(message: &str) -> DlEvent {
        DlEvent::Log {
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        assert!(bus.emit(log_event("nobody home")).is_err());
        // lossy variant swallows the error
        bus.emit_lossy(log_event("still nobody"));
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        bus.emit(DlEvent::SpeedLimitChanged {
            bytes_per_sec: 4096,
            timestamp: Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            DlEvent::SpeedLimitChanged { bytes_per_sec, .. } => {
                assert_eq!(bytes_per_sec, 4096)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serialization_tag() {
        let json = serde_json::to_value(log_event("hello")).unwrap();
        assert_eq!(json["type"], "Log");
        assert_eq!(json["message"], "hello");
    }
}
