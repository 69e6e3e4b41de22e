//! Error types for sdm-engine
//!
//! Module-specific error type using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the sdm-engine module
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] reqwest::Error),

    /// Unexpected HTTP status from a download source
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// Errors bubbled up from sdm-common helpers
    #[error("{0}")]
    Common(#[from] sdm_common::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown task id
    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    /// Operation not valid in the task's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Download was cancelled by user request
    #[error("Download cancelled")]
    Cancelled,

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the sdm-engine Error
pub type Result<T> = std::result::Result<T, Error>;
