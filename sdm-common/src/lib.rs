//! # SDM Common Library
//!
//! Shared code for the SDM download manager:
//! - Data model (tasks, segments, status enums)
//! - Event types (DlEvent enum) and the event bus
//! - API request/response types
//! - Configuration resolution
//! - Common error type

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod model;

pub use error::{Error, Result};
pub use model::{DownloadSegment, DownloadTask, SegmentStatus, TaskStatus};
