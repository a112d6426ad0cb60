//! Capstan - a per-project issue tracker served over HTTP.
//!
//! This library provides the core functionality for the `cpn` binary:
//! the issue data model, the document store backing it, and the axum
//! request handlers that expose it under `/api/issues/{project}`.

pub mod cli;
pub mod models;
pub mod server;
pub mod storage;

/// Library-level error type for Capstan operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Issue not found: {0}")]
    NotFound(String),

    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Capstan operations.
pub type Result<T> = std::result::Result<T, Error>;
