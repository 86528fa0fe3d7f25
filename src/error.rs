// src/error.rs
use std::io;
use thiserror::Error;

/// Result type used throughout execlog
pub type Result<T> = std::result::Result<T, LogError>;

/// Error type for the execlog library
#[derive(Error, Debug)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("A diagnostic sink is required to build a collector")]
    MissingDiagnosticSink,

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{context} failed after {attempts} attempt(s): {message}")]
    Retry {
        context: String,
        attempts: usize,
        message: String,
    },

    #[error("Log writer is closed")]
    WriterClosed,

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl LogError {
    /// Build the error reported when an operation exhausted its retries
    pub fn retry(context: &str, attempts: usize, err: impl std::fmt::Display) -> Self {
        LogError::Retry {
            context: context.to_string(),
            attempts,
            message: err.to_string(),
        }
    }
}

impl From<tokio_postgres::Error> for LogError {
    fn from(err: tokio_postgres::Error) -> Self {
        LogError::Database(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for LogError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        LogError::Connection(err.to_string())
    }
}
