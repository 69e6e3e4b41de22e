//! Segmented HTTP transfer engine
//!
//! A task's byte range is split into segments which are fetched
//! concurrently with HTTP Range requests and written at their offset into a
//! shared part-file. Progress funnels over an mpsc channel into a single
//! aggregator that owns database writes and event emission.

pub mod control;
pub mod engine;
pub mod fetch;
pub mod governor;
pub mod planner;
pub mod probe;

pub use control::{ControlState, TaskControl};
pub use engine::DownloadEngine;
pub use governor::SpeedGovernor;
