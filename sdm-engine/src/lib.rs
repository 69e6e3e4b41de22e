//! # SDM Engine
//!
//! Download-manager service: SQLite persistence, segmented HTTP transfer
//! engine, speed governor, and the REST/SSE control API.
//!
//! Exposed as a library so integration tests can drive the full stack
//! in-process.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod state;
pub mod transfer;

pub use error::{Error, Result};
