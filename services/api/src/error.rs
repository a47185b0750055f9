//! services/api/src/error.rs
//!
//! Defines the startup error type for the `api` service. Request-level
//! failures are mapped to HTTP status codes in the web layer instead.

use crate::config::ConfigError;

/// Errors that can abort server startup.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Opening or migrating the session database failed.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// A standard Input/Output error (e.g., binding the network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
