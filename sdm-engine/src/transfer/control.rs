//! Per-task pause/cancel control
//!
//! A `TaskControl` is shared between the engine (which flips the state) and
//! the segment fetch loops (which call [`TaskControl::checkpoint`] between
//! chunks). Cancel is sticky and wins over pause.

use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Run,
    Pause,
    Cancel,
}

#[derive(Clone)]
pub struct TaskControl {
    tx: Arc<watch::Sender<ControlState>>,
}

impl TaskControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ControlState::Run);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ControlState::Pause
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ControlState::Cancel
    }

    /// No effect once cancelled
    pub fn pause(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Run {
                *state = ControlState::Pause;
                true
            } else {
                false
            }
        });
    }

    /// No effect once cancelled
    pub fn resume(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Pause {
                *state = ControlState::Run;
                true
            } else {
                false
            }
        });
    }

    pub fn cancel(&self) {
        self.tx.send_replace(ControlState::Cancel);
    }

    /// Returns immediately while running, waits while paused, and errors
    /// with [`Error::Cancelled`] once cancelled.
    pub async fn checkpoint(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ControlState::Run => return Ok(()),
                ControlState::Cancel => return Err(Error::Cancelled),
                ControlState::Pause => {
                    if rx.changed().await.is_err() {
                        // controller dropped; treat as cancelled
                        return Err(Error::Cancelled);
                    }
                }
            }
        }
    }
}

impl Default for TaskControl {
    fn default() -> Self {
        Self::new()
    }
}
